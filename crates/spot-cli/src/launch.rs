//! Foreground orchestration for `spot-launch`.
//!
//! [`supervise`] starts the topology, then blocks until the UI exits, a
//! critical background service dies, or a shutdown signal arrives. Whichever
//! happens first, services are stopped exactly once before it returns. A UI
//! that never reaches `Running` ends the session straight after startup.

use std::time::Duration;

use spot_supervisor::{ServiceStatus, Supervisor, SupervisorError};
use tracing::{info, warn};

use crate::signal::ShutdownSignal;

/// How often background services are checked while the UI runs.
pub const LIVENESS_INTERVAL: Duration = Duration::from_secs(1);

/// Why the launcher stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The foreground UI exited on its own.
    UiExited { code: Option<i32> },
    /// SIGINT/SIGTERM was received.
    Signalled,
    /// A critical background service exited while the UI was running.
    ServiceLost { service: String },
    /// Background services came up but the UI never reached `Running`.
    UiFailed { reason: String },
}

impl LaunchOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchOutcome::UiExited { .. } | LaunchOutcome::Signalled => 0,
            LaunchOutcome::ServiceLost { .. } | LaunchOutcome::UiFailed { .. } => 1,
        }
    }
}

/// Start every registered service, wait on `ui`, and shut down.
///
/// # Errors
///
/// Returns the [`SupervisorError`] from startup; services have already been
/// rolled back in that case.
pub async fn supervise(
    supervisor: &mut Supervisor,
    ui: &str,
    shutdown: &ShutdownSignal,
) -> Result<LaunchOutcome, SupervisorError> {
    supervise_with_interval(supervisor, ui, shutdown, LIVENESS_INTERVAL).await
}

pub(crate) async fn supervise_with_interval(
    supervisor: &mut Supervisor,
    ui: &str,
    shutdown: &ShutdownSignal,
    liveness_interval: Duration,
) -> Result<LaunchOutcome, SupervisorError> {
    let started = tokio::select! {
        res = supervisor.start_all() => Some(res),
        _ = shutdown.wait() => None,
    };
    let outcome = match started {
        Some(Err(e)) => return Err(e),
        None => LaunchOutcome::Signalled,
        Some(Ok(())) => match ui_failure(supervisor, ui) {
            Some(reason) => LaunchOutcome::UiFailed { reason },
            None => watch(supervisor, ui, shutdown, liveness_interval).await,
        },
    };

    info!(outcome = ?outcome, "shutting down");
    supervisor.stop_all().await;
    Ok(outcome)
}

/// Why the foreground service is not running after startup, if it is not.
fn ui_failure(supervisor: &Supervisor, ui: &str) -> Option<String> {
    let Some(state) = supervisor.service(ui) else {
        return Some(format!("service '{ui}' is not registered"));
    };
    if state.status() == ServiceStatus::Running {
        return None;
    }
    Some(
        state
            .last_error()
            .map(str::to_string)
            .unwrap_or_else(|| format!("UI is {}", state.status())),
    )
}

async fn watch(
    supervisor: &mut Supervisor,
    ui: &str,
    shutdown: &ShutdownSignal,
    liveness_interval: Duration,
) -> LaunchOutcome {
    loop {
        tokio::select! {
            exit = supervisor.wait_for_exit(ui) => {
                return LaunchOutcome::UiExited { code: exit.and_then(|e| e.code) };
            }
            _ = shutdown.wait() => return LaunchOutcome::Signalled,
            _ = tokio::time::sleep(liveness_interval) => {
                for name in supervisor.check_liveness() {
                    if name == ui {
                        return LaunchOutcome::UiExited { code: None };
                    }
                    let critical = supervisor
                        .service(&name)
                        .is_some_and(|s| s.spec().critical);
                    if critical {
                        return LaunchOutcome::ServiceLost { service: name };
                    }
                    warn!(service = %name, "non-critical service exited; continuing");
                }
            }
        }
    }
}
