//! Error taxonomy for service registration and startup.

use spot_types::Remediation;
use thiserror::Error;

/// Errors returned by [`Supervisor`][crate::Supervisor] operations.
///
/// Registration errors are caller mistakes in the topology description.
/// [`SupervisorError::StartupFailed`] is fatal: by the time it is returned,
/// every service that had been started is already stopped again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("Service '{0}' is already registered")]
    DuplicateName(String),

    #[error("Registering '{service}' would create a dependency cycle: {}", cycle.join(" -> "))]
    CyclicDependency { service: String, cycle: Vec<String> },

    #[error("Service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency { service: String, dependency: String },

    #[error("Critical service '{service}' failed to start: {reason}")]
    StartupFailed { service: String, reason: String },
}

impl Remediation for SupervisorError {
    fn remediation(&self) -> &'static str {
        match self {
            SupervisorError::DuplicateName(_) => {
                "Give every [[services]] entry in config.toml a unique name."
            }
            SupervisorError::CyclicDependency { .. } => {
                "Remove one of the depends_on links so the services form a chain."
            }
            SupervisorError::UnknownDependency { .. } => {
                "Check depends_on for typos or add the missing service to config.toml."
            }
            SupervisorError::StartupFailed { .. } => {
                "Run the service command by hand to see its output, then check that its \
                 health endpoint answers before the startup deadline."
            }
        }
    }
}
