//! `spot-pairing` – Bluetooth controller pairing for MicroSpot.
//!
//! # Modules
//!
//! - [`automaton`] – [`PairingAutomaton`][automaton::PairingAutomaton]: the
//!   one-shot unblock → power → agent → scan → match → pair → trust →
//!   connect workflow.
//! - [`matcher`] – [`DeviceMatcher`][matcher::DeviceMatcher] and
//!   [`match_first`][matcher::match_first]: pure candidate selection.
//! - [`watchdog`] – [`ControllerWatchdog`][watchdog::ControllerWatchdog]:
//!   keeps a bonded controller connected.
//! - [`adapter`] – the [`BluetoothAdapter`][adapter::BluetoothAdapter] seam.
//! - [`bluez`] – [`BluezCtl`][bluez::BluezCtl], the `bluetoothctl` backend.
//! - [`retry`] – [`RetryPolicy`][retry::RetryPolicy] for pair/trust/connect.
//! - `testing` (feature `test-util`) – a scriptable in-memory adapter.

pub mod adapter;
pub mod automaton;
pub mod bluez;
pub mod error;
pub mod matcher;
pub mod retry;
pub mod watchdog;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use adapter::BluetoothAdapter;
pub use automaton::{AdapterState, PairState, PairingAutomaton, PairingConfig, PairingSession, PairingStage};
pub use bluez::{BluezCtl, parse_device_listing};
pub use error::{AdapterError, PairingError};
pub use matcher::{DEFAULT_CONTROLLER_NAMES, DeviceMatcher, match_first};
pub use retry::RetryPolicy;
pub use watchdog::{ControllerWatchdog, WatchdogConfig, WatchdogEvent};
