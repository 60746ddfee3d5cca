//! [`ControllerWatchdog`] – keeps an already-paired controller connected.
//!
//! The watchdog looks up the first bonded device that satisfies the
//! [`DeviceMatcher`] and then checks its link every `check_interval`. A
//! dropped link is reconnected; when the reconnect itself is refused the
//! cached address is forgotten and the bonded list is queried again after
//! `rediscover_backoff`, since the controller may have been unpaired.

use std::sync::Arc;
use std::time::Duration;

use spot_types::DeviceRecord;
use tokio::sync::Notify;
use tracing::{info, instrument, warn};

use crate::adapter::{BluetoothAdapter, bounded};
use crate::error::AdapterError;
use crate::matcher::{DeviceMatcher, match_first};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Delay between link checks while the controller is connected.
    pub check_interval: Duration,
    /// Time given to a fresh connection before it is verified.
    pub settle_time: Duration,
    /// Wait after a reconnect that did not come up.
    pub reconnect_backoff: Duration,
    /// Wait before querying the bonded device list again.
    pub rediscover_backoff: Duration,
    /// Upper bound on any single adapter call.
    pub step_timeout: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(2),
            settle_time: Duration::from_secs(2),
            reconnect_backoff: Duration::from_secs(3),
            rediscover_backoff: Duration::from_secs(5),
            step_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of one [`ControllerWatchdog::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogEvent {
    /// No bonded device matches the controller patterns.
    NoController,
    ControllerFound(DeviceRecord),
    /// The link was up; nothing to do.
    Connected,
    Reconnected,
    /// `connect` succeeded but the link was still down afterwards.
    ReconnectFailed,
    /// `connect` was refused; the cached controller was forgotten.
    ConnectFailed { address: String, reason: String },
    /// The bonded device list could not be read.
    AdapterUnavailable(String),
}

pub struct ControllerWatchdog<A> {
    adapter: A,
    matcher: DeviceMatcher,
    config: WatchdogConfig,
    controller: Option<DeviceRecord>,
}

impl<A: BluetoothAdapter> ControllerWatchdog<A> {
    pub fn new(adapter: A, matcher: DeviceMatcher, config: WatchdogConfig) -> Self {
        Self {
            adapter,
            matcher,
            config,
            controller: None,
        }
    }

    /// The controller currently being watched, if any.
    pub fn controller(&self) -> Option<&DeviceRecord> {
        self.controller.as_ref()
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Unblock and power the adapter.
    ///
    /// # Errors
    ///
    /// Returns the first adapter error.
    pub async fn power_up(&self) -> Result<(), AdapterError> {
        bounded(self.config.step_timeout, self.adapter.unblock()).await?;
        bounded(self.config.step_timeout, self.adapter.power_on()).await
    }

    /// Perform one check and return what happened together with the delay
    /// before the next check.
    pub async fn tick(&mut self) -> (WatchdogEvent, Duration) {
        let limit = self.config.step_timeout;

        let Some(controller) = self.controller.clone() else {
            return match bounded(limit, self.adapter.paired_devices()).await {
                Ok(paired) => match match_first(&paired, &self.matcher) {
                    Some(device) => {
                        info!(address = %device.address, name = %device.display_name, "controller found");
                        self.controller = Some(device.clone());
                        (WatchdogEvent::ControllerFound(device.clone()), Duration::ZERO)
                    }
                    None => (WatchdogEvent::NoController, self.config.rediscover_backoff),
                },
                Err(e) => (
                    WatchdogEvent::AdapterUnavailable(e.to_string()),
                    self.config.rediscover_backoff,
                ),
            };
        };
        let address = controller.address.as_str();

        if self.link_up(address).await {
            return (WatchdogEvent::Connected, self.config.check_interval);
        }

        info!(%address, "controller disconnected, reconnecting");
        if let Err(e) = bounded(limit, self.adapter.connect(address)).await {
            warn!(%address, error = %e, "reconnect refused; looking up paired devices again");
            self.controller = None;
            return (
                WatchdogEvent::ConnectFailed {
                    address: address.to_string(),
                    reason: e.to_string(),
                },
                self.config.rediscover_backoff,
            );
        }

        tokio::time::sleep(self.config.settle_time).await;
        if self.link_up(address).await {
            info!(%address, "controller reconnected");
            (WatchdogEvent::Reconnected, self.config.check_interval)
        } else {
            warn!(%address, "reconnect did not come up");
            (WatchdogEvent::ReconnectFailed, self.config.reconnect_backoff)
        }
    }

    /// Power up once, then tick until `shutdown` is notified.
    #[instrument(skip_all)]
    pub async fn run(&mut self, shutdown: Arc<Notify>) {
        info!("controller watchdog started");
        if let Err(e) = self.power_up().await {
            warn!(error = %e, "could not power up the adapter");
        }
        loop {
            let delay = tokio::select! {
                (_, delay) = self.tick() => delay,
                _ = shutdown.notified() => break,
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.notified() => break,
            }
        }
        info!("controller watchdog stopped");
    }

    async fn link_up(&self, address: &str) -> bool {
        match bounded(self.config.step_timeout, self.adapter.is_connected(address)).await {
            Ok(up) => up,
            Err(e) => {
                warn!(%address, error = %e, "link check failed");
                false
            }
        }
    }
}
