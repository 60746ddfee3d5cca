//! Scriptable in-memory [`BluetoothAdapter`] for tests.
//!
//! Enabled for downstream crates with the `test-util` feature.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use spot_types::DeviceRecord;

use crate::adapter::BluetoothAdapter;
use crate::error::AdapterError;

/// Adapter operations that can be scripted to fail or hang.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Unblock,
    PowerOn,
    RegisterAgent,
    StartScan,
    Discovered,
    Paired,
    Pair,
    Trust,
    Connect,
    IsConnected,
}

#[derive(Default)]
struct MockState {
    no_adapter: bool,
    discovered: Vec<DeviceRecord>,
    paired: Vec<DeviceRecord>,
    connected: HashSet<String>,
    /// Remaining injected failures per operation.
    failures: HashMap<MockOp, (u32, AdapterError)>,
    hanging: HashSet<MockOp>,
    calls: Vec<String>,
}

/// A [`BluetoothAdapter`] that replays canned answers and records calls.
#[derive(Default)]
pub struct MockAdapter {
    state: Mutex<MockState>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Behave like a host with no Bluetooth hardware.
    pub fn without_adapter(self) -> Self {
        self.lock().no_adapter = true;
        self
    }

    /// Devices returned by the discovery snapshot.
    pub fn with_discovered(self, devices: Vec<DeviceRecord>) -> Self {
        self.lock().discovered = devices;
        self
    }

    /// Devices already bonded with the adapter.
    pub fn with_paired(self, devices: Vec<DeviceRecord>) -> Self {
        self.lock().paired = devices;
        self
    }

    /// Fail the next `times` calls of `op` with `error`.
    pub fn fail_times(self, op: MockOp, times: u32, error: AdapterError) -> Self {
        self.lock().failures.insert(op, (times, error));
        self
    }

    /// Make every call of `op` hang forever.
    pub fn hanging(self, op: MockOp) -> Self {
        self.lock().hanging.insert(op);
        self
    }

    /// Simulate the device dropping its link.
    pub fn disconnect(&self, address: &str) {
        self.lock().connected.remove(address);
    }

    /// Recorded calls, e.g. `"pair AA:BB:CC:DD:EE:FF"`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call and decide whether it hangs or fails.
    async fn enter(&self, op: MockOp, call: String) -> Result<(), AdapterError> {
        let hang = {
            let mut state = self.lock();
            state.calls.push(call);
            if state.no_adapter {
                return Err(AdapterError::NoAdapter);
            }
            if let Some((remaining, error)) = state.failures.get_mut(&op) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(error.clone());
                }
            }
            state.hanging.contains(&op)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

#[async_trait]
impl BluetoothAdapter for MockAdapter {
    async fn unblock(&self) -> Result<(), AdapterError> {
        self.enter(MockOp::Unblock, "unblock".into()).await
    }

    async fn power_on(&self) -> Result<(), AdapterError> {
        self.enter(MockOp::PowerOn, "power_on".into()).await
    }

    async fn register_agent(&self) -> Result<(), AdapterError> {
        self.enter(MockOp::RegisterAgent, "register_agent".into()).await
    }

    async fn start_scan(&self, window: Duration) -> Result<(), AdapterError> {
        self.enter(MockOp::StartScan, format!("start_scan {}ms", window.as_millis()))
            .await
    }

    async fn stop_scan(&self) -> Result<(), AdapterError> {
        self.lock().calls.push("stop_scan".into());
        Ok(())
    }

    async fn discovered_devices(&self) -> Result<Vec<DeviceRecord>, AdapterError> {
        self.enter(MockOp::Discovered, "discovered".into()).await?;
        Ok(self.lock().discovered.clone())
    }

    async fn paired_devices(&self) -> Result<Vec<DeviceRecord>, AdapterError> {
        self.enter(MockOp::Paired, "paired".into()).await?;
        Ok(self.lock().paired.clone())
    }

    async fn pair(&self, address: &str) -> Result<(), AdapterError> {
        self.enter(MockOp::Pair, format!("pair {address}")).await
    }

    async fn trust(&self, address: &str) -> Result<(), AdapterError> {
        self.enter(MockOp::Trust, format!("trust {address}")).await
    }

    async fn connect(&self, address: &str) -> Result<(), AdapterError> {
        self.enter(MockOp::Connect, format!("connect {address}")).await?;
        self.lock().connected.insert(address.to_string());
        Ok(())
    }

    async fn is_connected(&self, address: &str) -> Result<bool, AdapterError> {
        self.enter(MockOp::IsConnected, format!("is_connected {address}"))
            .await?;
        Ok(self.lock().connected.contains(address))
    }
}
