//! [`ServiceSpec`] – static description of one supervised service.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::health::{HealthCheck, ImmediateHealthCheck};

/// Default time a service gets to report healthy after launch.
pub const DEFAULT_STARTUP_DEADLINE: Duration = Duration::from_secs(10);

/// How to launch a service, what it needs first, and how to tell it is ready.
///
/// Built with a small fluent API:
///
/// ```
/// use std::time::Duration;
/// use spot_supervisor::{ServiceSpec, StaysUpHealthCheck};
///
/// let listener = ServiceSpec::new("listener", "python3")
///     .args(["ps4_controller.py", "--api", "http://localhost:8000"])
///     .depends_on("backend")
///     .health(StaysUpHealthCheck::new(Duration::from_secs(3)));
///
/// assert!(!listener.critical);
/// assert!(listener.depends_on.contains("backend"));
/// ```
#[derive(Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub depends_on: BTreeSet<String>,
    /// A critical service that fails to become healthy aborts the startup.
    pub critical: bool,
    pub health: Arc<dyn HealthCheck>,
    pub startup_deadline: Duration,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            depends_on: BTreeSet::new(),
            critical: false,
            health: Arc::new(ImmediateHealthCheck),
            startup_deadline: DEFAULT_STARTUP_DEADLINE,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.insert(name.into());
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn health(mut self, check: impl HealthCheck + 'static) -> Self {
        self.health = Arc::new(check);
        self
    }

    pub fn startup_deadline(mut self, deadline: Duration) -> Self {
        self.startup_deadline = deadline;
        self
    }

    /// The full command line, for log output.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Debug for ServiceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceSpec")
            .field("name", &self.name)
            .field("command", &self.command_line())
            .field("depends_on", &self.depends_on)
            .field("critical", &self.critical)
            .field("health", &self.health.describe())
            .field("startup_deadline", &self.startup_deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_non_critical_with_immediate_health() {
        let spec = ServiceSpec::new("ui", "streamlit");
        assert!(!spec.critical);
        assert!(spec.depends_on.is_empty());
        assert_eq!(spec.startup_deadline, DEFAULT_STARTUP_DEADLINE);
        assert_eq!(spec.health.describe(), "process alive");
    }

    #[test]
    fn command_line_joins_program_and_args() {
        let spec = ServiceSpec::new("ui", "streamlit").args(["run", "app.py"]);
        assert_eq!(spec.command_line(), "streamlit run app.py");
    }

    #[test]
    fn debug_shows_health_description() {
        let spec = ServiceSpec::new("backend", "python3").critical(true);
        let dbg = format!("{spec:?}");
        assert!(dbg.contains("backend"));
        assert!(dbg.contains("critical: true"));
    }
}
