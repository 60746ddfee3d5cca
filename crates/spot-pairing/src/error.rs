//! Error types for adapter calls and pairing sessions.

use std::time::Duration;

use spot_types::Remediation;
use thiserror::Error;

/// Failure reported by a [`BluetoothAdapter`][crate::adapter::BluetoothAdapter]
/// operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("No Bluetooth adapter present")]
    NoAdapter,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Device rejected the request: {0}")]
    Rejected(String),

    #[error("'{command}' failed: {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("I/O error: {0}")]
    Io(String),
}

/// Terminal outcome of a failed pairing session.
///
/// Precondition errors (adapter, agent, scan) end the session at once.
/// `PairingRejected`, `TrustFailed` and `ConnectionFailed` are only returned
/// after the step's retry budget is spent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("Could not power on the Bluetooth adapter: {0}")]
    AdapterPowerFailure(String),

    #[error("Could not register the pairing agent: {0}")]
    AgentRegistrationFailed(String),

    #[error("Device discovery failed: {0}")]
    ScanFailed(String),

    #[error("No controller found among {scanned} discovered device(s)")]
    DeviceNotFound { scanned: usize },

    #[error("Pairing with {address} rejected after {attempts} attempt(s): {reason}")]
    PairingRejected {
        address: String,
        attempts: u32,
        reason: String,
    },

    #[error("Trusting {address} failed after {attempts} attempt(s): {reason}")]
    TrustFailed {
        address: String,
        attempts: u32,
        reason: String,
    },

    #[error("Connecting to {address} failed after {attempts} attempt(s): {reason}")]
    ConnectionFailed {
        address: String,
        attempts: u32,
        reason: String,
    },

    #[error("Pairing cancelled")]
    Cancelled,
}

impl Remediation for PairingError {
    fn remediation(&self) -> &'static str {
        match self {
            PairingError::AdapterUnavailable(_) => {
                "Check that a Bluetooth adapter is attached and that `rfkill list` shows it unblocked."
            }
            PairingError::AdapterPowerFailure(_) => {
                "Restart the Bluetooth service (`sudo systemctl restart bluetooth`) and try again."
            }
            PairingError::AgentRegistrationFailed(_) => {
                "Another pairing agent may be active; close other bluetoothctl sessions and retry."
            }
            PairingError::ScanFailed(_) => {
                "Make sure bluetoothd is running and no other tool holds the adapter in discovery."
            }
            PairingError::DeviceNotFound { .. } => {
                "Put the controller back in pairing mode (hold SHARE + PS until the light bar \
                 flashes rapidly), keep it close to the robot, and run the tool again."
            }
            PairingError::PairingRejected { .. } => {
                "Remove the controller with `bluetoothctl remove <address>`, re-enter pairing \
                 mode, and retry."
            }
            PairingError::TrustFailed { .. } | PairingError::ConnectionFailed { .. } => {
                "The controller may have left pairing mode; press PS to wake it and retry."
            }
            PairingError::Cancelled => "Run the tool again when the controller is ready.",
        }
    }
}
