//! Pairing sessions driven through the public API with a hand-written
//! adapter, the way a downstream crate would plug in its own backend.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use spot_pairing::{
    AdapterError, BluetoothAdapter, DeviceMatcher, PairingAutomaton, PairingConfig, PairingError,
    PairingStage, RetryPolicy,
};
use spot_types::DeviceRecord;

/// Adapter whose `connect` is refused a fixed number of times.
struct FlakyLink {
    devices: Vec<DeviceRecord>,
    connect_refusals: Mutex<u32>,
}

impl FlakyLink {
    fn new(devices: Vec<DeviceRecord>, connect_refusals: u32) -> Self {
        Self {
            devices,
            connect_refusals: Mutex::new(connect_refusals),
        }
    }
}

#[async_trait]
impl BluetoothAdapter for FlakyLink {
    async fn unblock(&self) -> Result<(), AdapterError> {
        Ok(())
    }
    async fn power_on(&self) -> Result<(), AdapterError> {
        Ok(())
    }
    async fn register_agent(&self) -> Result<(), AdapterError> {
        Ok(())
    }
    async fn start_scan(&self, _window: Duration) -> Result<(), AdapterError> {
        Ok(())
    }
    async fn stop_scan(&self) -> Result<(), AdapterError> {
        Ok(())
    }
    async fn discovered_devices(&self) -> Result<Vec<DeviceRecord>, AdapterError> {
        Ok(self.devices.clone())
    }
    async fn paired_devices(&self) -> Result<Vec<DeviceRecord>, AdapterError> {
        Ok(Vec::new())
    }
    async fn pair(&self, _address: &str) -> Result<(), AdapterError> {
        Ok(())
    }
    async fn trust(&self, _address: &str) -> Result<(), AdapterError> {
        Ok(())
    }
    async fn connect(&self, _address: &str) -> Result<(), AdapterError> {
        let mut left = self.connect_refusals.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            return Err(AdapterError::Rejected("page timeout".into()));
        }
        Ok(())
    }
    async fn is_connected(&self, _address: &str) -> Result<bool, AdapterError> {
        Ok(true)
    }
}

fn config(scan_ms: u64) -> PairingConfig {
    PairingConfig {
        scan_window: Duration::from_millis(scan_ms),
        step_timeout: Duration::from_millis(500),
        retry: RetryPolicy::new(2, Duration::from_millis(10)),
    }
}

#[tokio::test]
async fn controller_is_paired_despite_one_refused_connect() {
    let adapter = FlakyLink::new(
        vec![
            DeviceRecord::new("11:22:33:44:55:66", "Bravia TV", 0),
            DeviceRecord::new("AA:BB:CC:DD:EE:FF", "Wireless Controller", 1),
        ],
        1,
    );
    let mut automaton = PairingAutomaton::new(adapter, DeviceMatcher::controllers(), config(30));

    let report = automaton.run().await.unwrap();

    assert_eq!(report.address, "AA:BB:CC:DD:EE:FF");
    assert_eq!(automaton.stage(), PairingStage::Complete);
    let tail = &automaton.history()[automaton.history().len() - 4..];
    assert_eq!(
        tail,
        [
            PairingStage::Pairing,
            PairingStage::Trusting,
            PairingStage::Connecting,
            PairingStage::Complete
        ]
    );
}

#[tokio::test]
async fn empty_scan_is_not_found_within_the_window() {
    let mut automaton = PairingAutomaton::new(FlakyLink::new(Vec::new(), 0), DeviceMatcher::controllers(), config(100));

    let started = Instant::now();
    let err = automaton.run().await.unwrap_err();

    assert_eq!(err, PairingError::DeviceNotFound { scanned: 0 });
    assert_eq!(automaton.stage(), PairingStage::NotFound);
    assert!(started.elapsed() < Duration::from_millis(100 + 400));
}

#[tokio::test]
async fn custom_patterns_select_other_controllers() {
    let adapter = FlakyLink::new(
        vec![
            DeviceRecord::new("AA:BB:CC:DD:EE:FF", "Wireless Controller", 0),
            DeviceRecord::new("22:22:22:22:22:22", "Xbox Wireless Controller", 1),
        ],
        0,
    );
    let matcher = DeviceMatcher::new(["^xbox"]).unwrap();
    let mut automaton = PairingAutomaton::new(adapter, matcher, config(10));

    assert_eq!(automaton.run().await.unwrap().address, "22:22:22:22:22:22");
}
