//! `spot-cli` – front-ends for the MicroSpot tooling.
//!
//! Three binaries share this library:
//!
//! - `spot-launch` – starts backend, watchdog and controller listener under
//!   the [`Supervisor`][spot_supervisor::Supervisor], then runs the UI in the
//!   foreground until it exits or a signal arrives.
//! - `spot-pair` – one-shot controller pairing with the
//!   [`PairingAutomaton`][spot_pairing::PairingAutomaton].
//! - `spot-watchdog` – keeps a paired controller connected.

pub mod config;
pub mod console;
pub mod launch;
pub mod signal;
pub mod telemetry;
pub mod topology;

pub use config::{Config, ConfigError, UiKind};
pub use launch::{LaunchOutcome, supervise};
pub use signal::ShutdownSignal;

/// The single-threaded runtime every tool runs on.
pub fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

/// Serialises tests that mutate process environment variables.
#[cfg(test)]
pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
