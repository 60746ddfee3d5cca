//! Pluggable readiness predicates.
//!
//! The supervisor polls a service's [`HealthCheck`] repeatedly after launch
//! until it reports healthy or the startup deadline passes. A check is only
//! consulted while the process is still alive, so implementations never need
//! to detect a crashed child themselves.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Readiness predicate for one service.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Return `true` once the service is ready for dependents.
    ///
    /// `uptime` is the time elapsed since the process was launched.
    async fn is_healthy(&self, uptime: Duration) -> bool;

    /// Short human-readable description used in logs.
    fn describe(&self) -> String;
}

/// Healthy as soon as the process is alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateHealthCheck;

#[async_trait]
impl HealthCheck for ImmediateHealthCheck {
    async fn is_healthy(&self, _uptime: Duration) -> bool {
        true
    }

    fn describe(&self) -> String {
        "process alive".to_string()
    }
}

/// Healthy once the process has stayed up for `min_uptime`.
///
/// Suited to best-effort services with no status endpoint, such as the
/// controller listener.
#[derive(Debug, Clone, Copy)]
pub struct StaysUpHealthCheck {
    min_uptime: Duration,
}

impl StaysUpHealthCheck {
    pub fn new(min_uptime: Duration) -> Self {
        Self { min_uptime }
    }
}

#[async_trait]
impl HealthCheck for StaysUpHealthCheck {
    async fn is_healthy(&self, uptime: Duration) -> bool {
        uptime >= self.min_uptime
    }

    fn describe(&self) -> String {
        format!("stays up for {:?}", self.min_uptime)
    }
}

/// Healthy when `GET url` answers with a 2xx status.
///
/// Each probe is bounded by `request_timeout`, so a backend that accepts the
/// connection but never answers cannot stall the poll loop.
#[derive(Debug, Clone)]
pub struct HttpHealthCheck {
    url: String,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpHealthCheck {
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    async fn is_healthy(&self, _uptime: Duration) -> bool {
        match self
            .client
            .get(&self.url)
            .timeout(self.request_timeout)
            .send()
            .await
        {
            Ok(resp) => {
                let ok = resp.status().is_success();
                if !ok {
                    debug!(url = %self.url, status = %resp.status(), "health probe answered non-2xx");
                }
                ok
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "health probe failed");
                false
            }
        }
    }

    fn describe(&self) -> String {
        format!("GET {}", self.url)
    }
}

/// Adapts a plain closure into a [`HealthCheck`].
pub struct FnHealthCheck<F> {
    label: String,
    predicate: F,
}

impl<F> FnHealthCheck<F>
where
    F: Fn(Duration) -> bool + Send + Sync,
{
    pub fn new(label: impl Into<String>, predicate: F) -> Self {
        Self {
            label: label.into(),
            predicate,
        }
    }
}

#[async_trait]
impl<F> HealthCheck for FnHealthCheck<F>
where
    F: Fn(Duration) -> bool + Send + Sync,
{
    async fn is_healthy(&self, uptime: Duration) -> bool {
        (self.predicate)(uptime)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
