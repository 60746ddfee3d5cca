//! Generic `BluetoothAdapter` trait.
//!
//! The pairing automaton and the controller watchdog only ever talk to this
//! trait. [`BluezCtl`][crate::bluez::BluezCtl] drives a real BlueZ stack;
//! tests use [`MockAdapter`][crate::testing::MockAdapter] with canned device
//! lists.
//!
//! Every method reports an explicit result. A method returning `Ok(())` means
//! the adapter confirmed the operation, not merely that a command was sent.

use std::time::Duration;

use async_trait::async_trait;
use spot_types::DeviceRecord;

use crate::error::AdapterError;

/// Adapter control, agent registration and device discovery.
#[async_trait]
pub trait BluetoothAdapter: Send + Sync {
    /// Lift any soft/hard radio block.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::NoAdapter`] when the system has no adapter.
    async fn unblock(&self) -> Result<(), AdapterError>;

    /// Power the adapter on.
    async fn power_on(&self) -> Result<(), AdapterError>;

    /// Register a pairing agent and make it the default agent.
    async fn register_agent(&self) -> Result<(), AdapterError>;

    /// Begin discovery. Returns once discovery is running; the adapter stops
    /// on its own after `window` at the latest.
    async fn start_scan(&self, window: Duration) -> Result<(), AdapterError>;

    /// End discovery early. A no-op when no scan is running.
    async fn stop_scan(&self) -> Result<(), AdapterError>;

    /// Devices seen so far, in the order the adapter reported them.
    async fn discovered_devices(&self) -> Result<Vec<DeviceRecord>, AdapterError>;

    /// Devices the adapter already holds a bond with.
    async fn paired_devices(&self) -> Result<Vec<DeviceRecord>, AdapterError>;

    async fn pair(&self, address: &str) -> Result<(), AdapterError>;

    async fn trust(&self, address: &str) -> Result<(), AdapterError>;

    async fn connect(&self, address: &str) -> Result<(), AdapterError>;

    async fn is_connected(&self, address: &str) -> Result<bool, AdapterError>;
}

/// Run an adapter call, failing with [`AdapterError::Timeout`] after `limit`.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, AdapterError>
where
    F: std::future::Future<Output = Result<T, AdapterError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(AdapterError::Timeout(limit)))
}
