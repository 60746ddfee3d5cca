//! The MicroSpot service topology launched by `spot-launch`.
//!
//! ```text
//! backend (critical) ◄── listener
//!                    ◄── ui (foreground)
//! watchdog
//! ```
//!
//! `[[services]]` entries in the config patch these defaults by name or add
//! further services.

use std::path::PathBuf;
use std::time::Duration;

use spot_supervisor::{HttpHealthCheck, ImmediateHealthCheck, ServiceSpec, StaysUpHealthCheck};

use crate::config::{Config, ConfigError, HealthSetting, ServiceOverride, UiKind};

pub const BACKEND: &str = "backend";
pub const WATCHDOG: &str = "watchdog";
pub const LISTENER: &str = "listener";
/// Name of the foreground UI service; `spot-launch` waits for it to exit.
pub const UI: &str = "ui";

const BACKEND_DEADLINE: Duration = Duration::from_secs(30);

/// Build every service to register, in registration order, with the UI last.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidService`] for an override that adds a new
/// service without a command, or that sets an empty command.
pub fn build(cfg: &Config, ui: UiKind) -> Result<Vec<ServiceSpec>, ConfigError> {
    let mut specs = default_services(cfg, ui);
    for patch in &cfg.services {
        match specs.iter().position(|s| s.name == patch.name) {
            Some(i) => {
                let base = specs[i].clone();
                specs[i] = apply_override(base, patch)?;
            }
            None => {
                let base = new_service(patch)?;
                // Keep the UI last so overrides read top-to-bottom like the
                // startup order.
                let at = specs.len().saturating_sub(1);
                specs.insert(at, apply_override(base, patch)?);
            }
        }
    }
    Ok(specs)
}

fn default_services(cfg: &Config, ui: UiKind) -> Vec<ServiceSpec> {
    let in_src = |spec: ServiceSpec| match &cfg.src_dir {
        Some(dir) => spec.working_dir(dir.clone()),
        None => spec,
    };

    let backend = ServiceSpec::new(BACKEND, cfg.python.as_str())
        .arg("microspot_app.py")
        .critical(true)
        .health(HttpHealthCheck::new(cfg.status_url()))
        .startup_deadline(BACKEND_DEADLINE);

    let watchdog = ServiceSpec::new(WATCHDOG, watchdog_program())
        .health(StaysUpHealthCheck::new(Duration::from_secs(2)));

    let listener = ServiceSpec::new(LISTENER, cfg.python.as_str())
        .args(["ps4_controller.py", "--api", cfg.backend_url.as_str()])
        .depends_on(BACKEND)
        .health(StaysUpHealthCheck::new(Duration::from_secs(3)));

    let ui_spec = match ui {
        UiKind::Streamlit => ServiceSpec::new(UI, "streamlit").args(["run", "app.py"]),
        UiKind::Dash => ServiceSpec::new(UI, cfg.python.as_str()).arg("dash_app.py"),
    }
    .depends_on(BACKEND)
    .health(StaysUpHealthCheck::new(Duration::from_secs(1)));

    vec![in_src(backend), watchdog, in_src(listener), in_src(ui_spec)]
}

/// `spot-watchdog` next to the running executable, else from `PATH`.
fn watchdog_program() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("spot-watchdog")))
        .filter(|p| p.is_file())
        .unwrap_or_else(|| PathBuf::from("spot-watchdog"))
        .to_string_lossy()
        .into_owned()
}

fn new_service(patch: &ServiceOverride) -> Result<ServiceSpec, ConfigError> {
    match patch.command.as_deref() {
        Some([program, ..]) => Ok(ServiceSpec::new(patch.name.as_str(), program.as_str())),
        _ => Err(ConfigError::InvalidService {
            name: patch.name.clone(),
            reason: "new services need a command".into(),
        }),
    }
}

fn apply_override(mut spec: ServiceSpec, patch: &ServiceOverride) -> Result<ServiceSpec, ConfigError> {
    if let Some(command) = &patch.command {
        let Some((program, args)) = command.split_first() else {
            return Err(ConfigError::InvalidService {
                name: patch.name.clone(),
                reason: "command is empty".into(),
            });
        };
        spec.program = program.clone();
        spec.args = args.to_vec();
    }
    if let Some(deps) = &patch.depends_on {
        spec.depends_on = deps.iter().cloned().collect();
    }
    if let Some(critical) = patch.critical {
        spec.critical = critical;
    }
    if let Some(health) = &patch.health {
        spec = match health {
            HealthSetting::Immediate => spec.health(ImmediateHealthCheck),
            HealthSetting::StaysUp { secs } => spec.health(StaysUpHealthCheck::new(Duration::from_secs(*secs))),
            HealthSetting::Http { url } => spec.health(HttpHealthCheck::new(url.as_str())),
        };
    }
    if let Some(secs) = patch.startup_deadline_secs {
        spec.startup_deadline = Duration::from_secs(secs);
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(specs: &[ServiceSpec]) -> Vec<&str> {
        specs.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn default_topology() {
        let cfg = Config::default();
        let specs = build(&cfg, UiKind::Streamlit).unwrap();
        assert_eq!(names(&specs), [BACKEND, WATCHDOG, LISTENER, UI]);

        let backend = &specs[0];
        assert!(backend.critical);
        assert_eq!(backend.command_line(), "python3 microspot_app.py");
        assert_eq!(backend.startup_deadline, BACKEND_DEADLINE);
        assert!(backend.health.describe().contains("http://localhost:8000/api/status"));

        assert!(!specs[1].critical);
        assert!(specs[1].program.ends_with("spot-watchdog"));

        let listener = &specs[2];
        assert!(listener.depends_on.contains(BACKEND));
        assert_eq!(
            listener.command_line(),
            "python3 ps4_controller.py --api http://localhost:8000"
        );

        assert_eq!(specs[3].command_line(), "streamlit run app.py");
        assert!(specs[3].depends_on.contains(BACKEND));
    }

    #[test]
    fn dash_ui_uses_python() {
        let specs = build(&Config::default(), UiKind::Dash).unwrap();
        assert_eq!(specs[3].command_line(), "python3 dash_app.py");
    }

    #[test]
    fn src_dir_becomes_working_dir() {
        let cfg = Config {
            src_dir: Some(PathBuf::from("/opt/microspot/src")),
            ..Config::default()
        };
        let specs = build(&cfg, UiKind::Streamlit).unwrap();
        assert_eq!(specs[0].working_dir, cfg.src_dir);
        assert_eq!(specs[1].working_dir, None);
    }

    #[test]
    fn overrides_patch_builtin_services() {
        let cfg = Config {
            services: vec![ServiceOverride {
                name: LISTENER.into(),
                command: Some(vec!["python3".into(), "xbox_controller.py".into()]),
                critical: Some(true),
                startup_deadline_secs: Some(7),
                health: Some(HealthSetting::Immediate),
                ..ServiceOverride::default()
            }],
            ..Config::default()
        };
        let specs = build(&cfg, UiKind::Streamlit).unwrap();
        let listener = &specs[2];
        assert_eq!(listener.command_line(), "python3 xbox_controller.py");
        assert!(listener.critical);
        assert_eq!(listener.startup_deadline, Duration::from_secs(7));
        assert_eq!(listener.health.describe(), "process alive");
        assert!(listener.depends_on.contains(BACKEND));
    }

    #[test]
    fn new_services_go_before_the_ui() {
        let cfg = Config {
            services: vec![ServiceOverride {
                name: "imu".into(),
                command: Some(vec!["python3".into(), "stability_monitor.py".into()]),
                depends_on: Some(vec![BACKEND.into()]),
                ..ServiceOverride::default()
            }],
            ..Config::default()
        };
        let specs = build(&cfg, UiKind::Streamlit).unwrap();
        assert_eq!(names(&specs), [BACKEND, WATCHDOG, LISTENER, "imu", UI]);
        assert_eq!(specs[3].args, ["stability_monitor.py"]);
    }

    #[test]
    fn new_service_without_command_is_rejected() {
        let cfg = Config {
            services: vec![ServiceOverride {
                name: "mystery".into(),
                ..ServiceOverride::default()
            }],
            ..Config::default()
        };
        assert!(matches!(
            build(&cfg, UiKind::Streamlit),
            Err(ConfigError::InvalidService { .. })
        ));
    }

    #[test]
    fn empty_command_is_rejected() {
        let cfg = Config {
            services: vec![ServiceOverride {
                name: BACKEND.into(),
                command: Some(Vec::new()),
                ..ServiceOverride::default()
            }],
            ..Config::default()
        };
        assert!(build(&cfg, UiKind::Streamlit).is_err());
    }
}
