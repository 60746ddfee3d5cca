//! [`ShutdownSignal`] – single-flight SIGINT/SIGTERM latch.
//!
//! Operators tend to hit Ctrl-C more than once while services are stopping.
//! Only the first delivery counts; later ones are acknowledged and dropped,
//! so shutdown runs exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    triggered: AtomicBool,
    notify: Notify,
}

/// Cloneable handle; every clone observes the same latch.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGINT/SIGTERM into this latch.
    ///
    /// # Errors
    ///
    /// Fails when a handler is already installed for the process.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let signal = self.clone();
        ctrlc::set_handler(move || {
            println!();
            if signal.trigger() {
                println!("{}", "⚠  Shutdown requested – cleaning up …".yellow().bold());
            } else {
                println!("{}", "  (shutdown already in progress)".dimmed());
            }
        })
    }

    /// Latch the signal. Returns `true` only for the first call.
    pub fn trigger(&self) -> bool {
        let first = !self.inner.triggered.swap(true, Ordering::SeqCst);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Resolve once the signal has been triggered (immediately if it already
    /// was).
    pub async fn wait(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }

    /// A [`Notify`] that fires once this signal triggers, for components
    /// that take a plain `Arc<Notify>` cancel handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn forward_to(&self, target: Arc<Notify>) {
        let signal = self.clone();
        tokio::spawn(async move {
            signal.wait().await;
            target.notify_one();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn only_the_first_trigger_counts() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());
        assert!(signal.trigger());
        assert!(!signal.trigger());
        assert!(!signal.clone().trigger());
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn wait_returns_when_already_triggered() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("wait should not block");
    }

    #[tokio::test]
    async fn waiters_are_woken_by_a_later_trigger() {
        let signal = ShutdownSignal::new();
        let waiter = {
            let s = signal.clone();
            tokio::spawn(async move { s.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
    }

    #[tokio::test]
    async fn forwards_to_a_notify() {
        let signal = ShutdownSignal::new();
        let target = Arc::new(Notify::new());
        signal.forward_to(target.clone());
        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), target.notified())
            .await
            .expect("forwarded notification missing");
    }
}
