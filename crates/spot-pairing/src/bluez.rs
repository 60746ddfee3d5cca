//! [`BluezCtl`] – [`BluetoothAdapter`] backed by `rfkill` and `bluetoothctl`.
//!
//! Each operation runs one non-interactive `bluetoothctl` command and checks
//! its output for the success marker BlueZ prints, so a command that exits 0
//! without doing anything is still reported as a failure. Discovery runs as a
//! long-lived `bluetoothctl --timeout <secs> scan on` child that is killed by
//! [`BluetoothAdapter::stop_scan`].

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use spot_types::DeviceRecord;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::adapter::BluetoothAdapter;
use crate::error::AdapterError;

const NO_CONTROLLER: &str = "No default controller available";
const AGENT_CAPABILITY: &str = "NoInputNoOutput";

/// Turn `bluetoothctl devices` output into records, in output order.
///
/// Lines that do not carry a `Device <MAC> <name>` entry are skipped, as are
/// repeated addresses. Prefixes such as `[NEW]` are tolerated. A device
/// without a name gets its address as display name, like BlueZ shows it.
pub fn parse_device_listing(output: &str) -> Vec<DeviceRecord> {
    let mut devices: Vec<DeviceRecord> = Vec::new();
    for line in output.lines() {
        let Some(start) = line.find("Device ") else {
            continue;
        };
        let rest = &line[start + "Device ".len()..];
        let (address, name) = match rest.split_once(char::is_whitespace) {
            Some((addr, name)) => (addr, name.trim()),
            None => (rest.trim(), ""),
        };
        if !is_mac_address(address) || devices.iter().any(|d| d.address == address) {
            continue;
        }
        let name = if name.is_empty() { address } else { name };
        let order = devices.len();
        devices.push(DeviceRecord::new(address, name, order));
    }
    devices
}

fn is_mac_address(s: &str) -> bool {
    let parts: Vec<&str> = s.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Most specific failure line in a command's output.
fn failure_detail(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .find(|l| l.contains("Failed") || l.contains("Error") || l.contains("not available"))
        .or_else(|| output.lines().map(str::trim).rfind(|l| !l.is_empty()))
        .unwrap_or("no output")
        .to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// BluezCtl
// ─────────────────────────────────────────────────────────────────────────────

/// Drives the local BlueZ stack through its command-line tools.
pub struct BluezCtl {
    bluetoothctl: PathBuf,
    rfkill: PathBuf,
    sudo: bool,
    scan: Mutex<Option<Child>>,
}

impl Default for BluezCtl {
    fn default() -> Self {
        Self::new()
    }
}

impl BluezCtl {
    pub fn new() -> Self {
        Self {
            bluetoothctl: PathBuf::from("bluetoothctl"),
            rfkill: PathBuf::from("rfkill"),
            sudo: false,
            scan: Mutex::new(None),
        }
    }

    /// Use a different `bluetoothctl` binary.
    pub fn with_bluetoothctl(mut self, path: impl Into<PathBuf>) -> Self {
        self.bluetoothctl = path.into();
        self
    }

    /// Use a different `rfkill` binary.
    pub fn with_rfkill(mut self, path: impl Into<PathBuf>) -> Self {
        self.rfkill = path.into();
        self
    }

    /// Run `rfkill` through `sudo` (needed when the user cannot write
    /// `/dev/rfkill`).
    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    /// Run `bluetoothctl` with `args` and return its combined output.
    async fn ctl(&self, args: &[&str]) -> Result<String, AdapterError> {
        let command = format!("bluetoothctl {}", args.join(" "));
        debug!(%command, "running");
        let output = Command::new(&self.bluetoothctl)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AdapterError::Io(format!("{command}: {e}")))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if text.contains(NO_CONTROLLER) {
            return Err(AdapterError::NoAdapter);
        }
        if !output.status.success() {
            return Err(AdapterError::CommandFailed {
                command,
                detail: failure_detail(&text),
            });
        }
        Ok(text)
    }

    /// Run `bluetoothctl` and require one of `markers` in its output.
    async fn ctl_expect(&self, args: &[&str], markers: &[&str]) -> Result<String, AdapterError> {
        let text = self.ctl(args).await?;
        if markers.iter().any(|m| text.contains(m)) {
            Ok(text)
        } else {
            Err(AdapterError::CommandFailed {
                command: format!("bluetoothctl {}", args.join(" ")),
                detail: failure_detail(&text),
            })
        }
    }

    /// Like [`Self::ctl_expect`], but a missing marker means the device
    /// refused the request.
    async fn device_step(&self, args: &[&str], markers: &[&str]) -> Result<(), AdapterError> {
        match self.ctl(args).await {
            Ok(text) if markers.iter().any(|m| text.contains(m)) => Ok(()),
            Ok(text) => Err(AdapterError::Rejected(failure_detail(&text))),
            Err(AdapterError::CommandFailed { detail, .. }) => Err(AdapterError::Rejected(detail)),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl BluetoothAdapter for BluezCtl {
    async fn unblock(&self) -> Result<(), AdapterError> {
        let mut cmd = if self.sudo {
            let mut c = Command::new("sudo");
            c.arg(&self.rfkill);
            c
        } else {
            Command::new(&self.rfkill)
        };
        let status = cmd
            .args(["unblock", "bluetooth"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;
        match status {
            Ok(s) if s.success() => {}
            // Not every image ships rfkill; the adapter check below decides.
            Ok(s) => warn!(code = ?s.code(), "rfkill unblock failed"),
            Err(e) => warn!(error = %e, "rfkill not available"),
        }
        self.ctl(&["show"]).await.map(|_| ())
    }

    async fn power_on(&self) -> Result<(), AdapterError> {
        self.ctl_expect(&["power", "on"], &["Changing power on succeeded", "Powered: yes"])
            .await
            .map(|_| ())
    }

    async fn register_agent(&self) -> Result<(), AdapterError> {
        self.ctl_expect(
            &["--agent", AGENT_CAPABILITY, "default-agent"],
            &["Default agent request successful"],
        )
        .await
        .map(|_| ())
    }

    async fn start_scan(&self, window: Duration) -> Result<(), AdapterError> {
        let mut slot = self.scan.lock().await;
        if let Some(mut previous) = slot.take() {
            if let Err(e) = previous.start_kill() {
                warn!(error = %e, "failed to stop previous discovery");
            }
        }
        let secs = window.as_secs().max(1).to_string();
        let child = Command::new(&self.bluetoothctl)
            .args(["--timeout", secs.as_str(), "scan", "on"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AdapterError::Io(format!("bluetoothctl scan on: {e}")))?;
        debug!(pid = ?child.id(), window = ?window, "discovery started");
        *slot = Some(child);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), AdapterError> {
        let Some(mut child) = self.scan.lock().await.take() else {
            return Ok(());
        };
        if child
            .try_wait()
            .map_err(|e| AdapterError::Io(e.to_string()))?
            .is_none()
        {
            child
                .kill()
                .await
                .map_err(|e| AdapterError::Io(format!("stopping discovery: {e}")))?;
        }
        Ok(())
    }

    async fn discovered_devices(&self) -> Result<Vec<DeviceRecord>, AdapterError> {
        Ok(parse_device_listing(&self.ctl(&["devices"]).await?))
    }

    async fn paired_devices(&self) -> Result<Vec<DeviceRecord>, AdapterError> {
        Ok(parse_device_listing(&self.ctl(&["devices", "Paired"]).await?))
    }

    async fn pair(&self, address: &str) -> Result<(), AdapterError> {
        // An existing bond counts as success.
        self.device_step(
            &["--agent", AGENT_CAPABILITY, "pair", address],
            &["Pairing successful", "AlreadyExists"],
        )
        .await
    }

    async fn trust(&self, address: &str) -> Result<(), AdapterError> {
        self.device_step(&["trust", address], &["trust succeeded"]).await
    }

    async fn connect(&self, address: &str) -> Result<(), AdapterError> {
        self.device_step(&["connect", address], &["Connection successful"])
            .await
    }

    async fn is_connected(&self, address: &str) -> Result<bool, AdapterError> {
        let text = self.ctl(&["info", address]).await?;
        Ok(text
            .lines()
            .any(|l| l.trim().eq_ignore_ascii_case("Connected: yes")))
    }
}
