//! Configuration – reads/writes `~/.microspot/config.toml`.
//!
//! Every field is optional; a missing file means "all defaults". Values are
//! then overridden from `MICROSPOT_*` environment variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spot_pairing::{DeviceMatcher, PairingConfig, RetryPolicy, WatchdogConfig};
use spot_supervisor::SupervisorConfig;
use spot_types::Remediation;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid controller pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid service '{name}': {reason}")]
    InvalidService { name: String, reason: String },
}

impl Remediation for ConfigError {
    fn remediation(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "Check that the config path exists and is readable.",
            ConfigError::Parse { .. } => "Fix the TOML syntax, or delete the file to fall back to defaults.",
            ConfigError::Write { .. } | ConfigError::Serialize(_) => {
                "Check the permissions of ~/.microspot/."
            }
            ConfigError::InvalidPattern(_) => {
                "`pairing.controller_patterns` entries are regular expressions; escape special characters."
            }
            ConfigError::InvalidService { .. } => {
                "Every `[[services]]` entry that is not a built-in service needs a non-empty `command`."
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Schema
// ─────────────────────────────────────────────────────────────────────────────

/// Which foreground UI `spot-launch` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UiKind {
    #[default]
    Streamlit,
    Dash,
}

impl std::fmt::Display for UiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiKind::Streamlit => write!(f, "streamlit"),
            UiKind::Dash => write!(f, "dash"),
        }
    }
}

impl std::str::FromStr for UiKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "streamlit" => Ok(UiKind::Streamlit),
            "dash" => Ok(UiKind::Dash),
            other => Err(format!("unknown UI '{other}' (expected 'streamlit' or 'dash')")),
        }
    }
}

/// Health predicate selectable from the config file.
///
/// ```toml
/// health = { kind = "stays_up", secs = 3 }
/// health = { kind = "http", url = "http://localhost:8000/api/status" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthSetting {
    Immediate,
    StaysUp { secs: u64 },
    Http { url: String },
}

/// `[[services]]` entry: patches a built-in service or adds a new one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceOverride {
    pub name: String,
    /// Program followed by its arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthSetting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingSection {
    #[serde(default = "default_scan_window_secs")]
    pub scan_window_secs: u64,
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Case-insensitive regular expressions. Empty means the built-in
    /// PlayStation controller names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controller_patterns: Vec<String>,
}

impl Default for PairingSection {
    fn default() -> Self {
        Self {
            scan_window_secs: default_scan_window_secs(),
            step_timeout_secs: default_step_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            controller_patterns: Vec::new(),
        }
    }
}

/// Persisted configuration stored in `~/.microspot/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the MicroSpot backend API.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Python interpreter used for the backend, listener and Dash UI.
    #[serde(default = "default_python")]
    pub python: String,

    /// Directory holding the Python sources. Services run from here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_dir: Option<PathBuf>,

    /// Foreground UI.
    #[serde(default)]
    pub ui: UiKind,

    #[serde(default)]
    pub supervisor: SupervisorSection,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceOverride>,

    #[serde(default)]
    pub pairing: PairingSection,
}

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_python() -> String {
    "python3".to_string()
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_grace_period_ms() -> u64 {
    5_000
}
fn default_scan_window_secs() -> u64 {
    15
}
fn default_step_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            python: default_python(),
            src_dir: None,
            ui: UiKind::default(),
            supervisor: SupervisorSection::default(),
            services: Vec::new(),
            pairing: PairingSection::default(),
        }
    }
}

impl Config {
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            poll_interval: Duration::from_millis(self.supervisor.poll_interval_ms.max(1)),
            grace_period: Duration::from_millis(self.supervisor.grace_period_ms),
        }
    }

    pub fn pairing_config(&self) -> PairingConfig {
        PairingConfig {
            scan_window: Duration::from_secs(self.pairing.scan_window_secs),
            step_timeout: Duration::from_secs(self.pairing.step_timeout_secs.max(1)),
            retry: RetryPolicy::new(
                self.pairing.max_retries,
                Duration::from_millis(self.pairing.retry_backoff_ms),
            ),
        }
    }

    pub fn watchdog_config(&self) -> WatchdogConfig {
        WatchdogConfig {
            step_timeout: Duration::from_secs(self.pairing.step_timeout_secs.max(1)),
            ..WatchdogConfig::default()
        }
    }

    /// Matcher over the configured controller patterns.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] when a pattern does not
    /// compile.
    pub fn matcher(&self) -> Result<DeviceMatcher, ConfigError> {
        if self.pairing.controller_patterns.is_empty() {
            return Ok(DeviceMatcher::controllers());
        }
        DeviceMatcher::new(&self.pairing.controller_patterns)
            .map_err(|e| ConfigError::InvalidPattern(e.to_string()))
    }

    /// `{backend_url}/api/status`.
    pub fn status_url(&self) -> String {
        format!("{}/api/status", self.backend_url.trim_end_matches('/'))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Load / save
// ─────────────────────────────────────────────────────────────────────────────

/// Return the path to `~/.microspot/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".microspot").join("config.toml")
}

/// Resolve the effective configuration.
///
/// An explicit `path` must exist. Without one, `~/.microspot/config.toml` is
/// used when present and defaults otherwise. Environment overrides are
/// applied last in every case.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut cfg = match path {
        Some(p) => load_from(p)?.ok_or_else(|| ConfigError::Read {
            path: p.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        })?,
        None => load_from(&config_path())?.unwrap_or_default(),
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path. Returns `None` if the file does not
/// exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(cfg))
}

/// Apply `MICROSPOT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MICROSPOT_BACKEND_URL` | `backend_url` |
/// | `MICROSPOT_PYTHON` | `python` |
/// | `MICROSPOT_UI` | `ui` |
/// | `MICROSPOT_SCAN_SECS` | `pairing.scan_window_secs` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MICROSPOT_BACKEND_URL") {
        cfg.backend_url = v;
    }
    if let Ok(v) = std::env::var("MICROSPOT_PYTHON") {
        cfg.python = v;
    }
    if let Ok(v) = std::env::var("MICROSPOT_UI")
        && let Ok(ui) = v.parse::<UiKind>()
    {
        cfg.ui = ui;
    }
    if let Ok(v) = std::env::var("MICROSPOT_SCAN_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.pairing.scan_window_secs = secs;
    }
}

/// Write `cfg` to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source: std::io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(write_err)?;
        }
    }
    let raw = toml::to_string_pretty(cfg)?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn config_path_points_to_microspot_dir() {
        let p = config_path_for_home("/home/pi");
        assert_eq!(p, PathBuf::from("/home/pi/.microspot/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
backend_url = "http://spot.local:8000/"
ui = "dash"

[pairing]
scan_window_secs = 30
controller_patterns = ["^xbox"]

[[services]]
name = "listener"
critical = true
health = { kind = "stays_up", secs = 5 }
"#,
        )
        .unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.ui, UiKind::Dash);
        assert_eq!(cfg.python, "python3");
        assert_eq!(cfg.status_url(), "http://spot.local:8000/api/status");
        assert_eq!(cfg.pairing.scan_window_secs, 30);
        assert_eq!(cfg.pairing.max_retries, 2);
        assert_eq!(cfg.supervisor, SupervisorSection::default());
        assert_eq!(cfg.services[0].critical, Some(true));
        assert_eq!(cfg.services[0].health, Some(HealthSetting::StaysUp { secs: 5 }));
        assert!(cfg.matcher().unwrap().matches("Xbox Wireless Controller"));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "backend_url = [").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let mut cfg = Config::default();
        cfg.pairing.controller_patterns = vec!["(unclosed".into()];
        assert!(matches!(cfg.matcher(), Err(ConfigError::InvalidPattern(_))));
    }

    #[test]
    fn derived_runtime_configs() {
        let cfg = Config::default();
        assert_eq!(cfg.supervisor_config(), SupervisorConfig::default());
        assert_eq!(cfg.pairing_config(), PairingConfig::default());
        assert_eq!(cfg.watchdog_config().step_timeout, Duration::from_secs(10));
    }

    #[test]
    fn ui_kind_parses_case_insensitively() {
        assert_eq!("Dash".parse::<UiKind>(), Ok(UiKind::Dash));
        assert!("qt".parse::<UiKind>().is_err());
    }

    #[test]
    fn apply_env_overrides_changes_backend_url() {
        let _env = crate::env_lock();
        // SAFETY: every test touching the environment holds `env_lock`.
        unsafe { std::env::set_var("MICROSPOT_BACKEND_URL", "http://robot:9000") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.backend_url, "http://robot:9000");
        unsafe { std::env::remove_var("MICROSPOT_BACKEND_URL") };
    }

    #[test]
    fn apply_env_overrides_changes_scan_window() {
        let _env = crate::env_lock();
        // SAFETY: every test touching the environment holds `env_lock`.
        unsafe { std::env::set_var("MICROSPOT_SCAN_SECS", "42") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pairing.scan_window_secs, 42);
        unsafe { std::env::remove_var("MICROSPOT_SCAN_SECS") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_ui() {
        let _env = crate::env_lock();
        // SAFETY: every test touching the environment holds `env_lock`.
        unsafe { std::env::set_var("MICROSPOT_UI", "qt") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.ui, UiKind::Streamlit);
        unsafe { std::env::remove_var("MICROSPOT_UI") };
    }
}
