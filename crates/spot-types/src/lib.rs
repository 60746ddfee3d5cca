//! Shared vocabulary for the MicroSpot tooling.
//!
//! Both the service supervisor and the pairing automaton report their state
//! through these types so the CLI front-ends can print them uniformly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Services
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle status of a supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Registered but not launched yet.
    Pending,
    /// Process launched, waiting for the health predicate.
    Starting,
    /// Health predicate passed; dependents may rely on it.
    Running,
    /// Failed to launch or to become healthy in time.
    Failed,
    /// Terminated by the supervisor or exited on its own.
    Stopped,
}

impl ServiceStatus {
    /// `true` while a live process may still be attached to the service.
    pub fn is_active(self) -> bool {
        matches!(self, ServiceStatus::Starting | ServiceStatus::Running)
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ServiceStatus::Pending => "pending",
            ServiceStatus::Starting => "starting",
            ServiceStatus::Running => "running",
            ServiceStatus::Failed => "failed",
            ServiceStatus::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bluetooth devices
// ─────────────────────────────────────────────────────────────────────────────

/// A device seen by the adapter during a discovery window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Hardware address, e.g. `"AA:BB:CC:DD:EE:FF"`.
    pub address: String,
    pub display_name: String,
    /// Position in the order the adapter reported the device.
    pub discovery_order: usize,
}

impl DeviceRecord {
    pub fn new(
        address: impl Into<String>,
        display_name: impl Into<String>,
        discovery_order: usize,
    ) -> Self {
        Self {
            address: address.into(),
            display_name: display_name.into(),
            discovery_order,
        }
    }
}

/// Summary of a completed pairing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingReport {
    pub session_id: Uuid,
    pub address: String,
    pub display_name: String,
    pub completed_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Operator guidance
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that reach an operator carry a short hint on how to recover.
pub trait Remediation {
    /// One or two sentences telling the operator what to try next.
    fn remediation(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_starting_and_running_are_active() {
        assert!(ServiceStatus::Starting.is_active());
        assert!(ServiceStatus::Running.is_active());
        assert!(!ServiceStatus::Pending.is_active());
        assert!(!ServiceStatus::Failed.is_active());
        assert!(!ServiceStatus::Stopped.is_active());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ServiceStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
        assert_eq!(ServiceStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn pairing_report_serializes_address() {
        let report = PairingReport {
            session_id: Uuid::new_v4(),
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            display_name: "Wireless Controller".to_string(),
            completed_at: Utc::now(),
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("AA:BB:CC:DD:EE:FF"));
        assert!(json.contains("Wireless Controller"));
    }
}
