//! [`Supervisor`] – ordered startup, health polling and coordinated shutdown.
//!
//! The supervisor owns a registry of [`ServiceState`] records keyed by
//! service name. Every status transition happens inside a `&mut self` method,
//! so the registry has exactly one writer.
//!
//! # Startup
//!
//! [`Supervisor::start_all`] walks the services in dependency order. A service
//! is launched only once every dependency is [`ServiceStatus::Running`], and
//! becomes `Running` itself only after its [`HealthCheck`] passes. The check
//! is polled every `poll_interval` until the service's startup deadline, so a
//! fast service is detected within one interval and a slow one never overruns.
//!
//! # Shutdown
//!
//! [`Supervisor::stop_all`] stops active services in reverse start order:
//! termination request, up to `grace_period` for a voluntary exit, then a
//! kill bounded by [`KILL_TIMEOUT`].
//!
//! [`HealthCheck`]: crate::health::HealthCheck

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use spot_types::ServiceStatus;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use crate::error::SupervisorError;
use crate::graph::{DependencyMap, cycle_through, topological_order};
use crate::process::{ExitInfo, ProcessLauncher, ServiceProcess};
use crate::spec::ServiceSpec;

/// Upper bound on waiting for a killed process to be reaped.
pub const KILL_TIMEOUT: Duration = Duration::from_secs(2);

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Timing knobs shared by every supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Delay between consecutive health probes of a starting service.
    pub poll_interval: Duration,
    /// Time a service gets to exit after a termination request.
    pub grace_period: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            grace_period: Duration::from_secs(5),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Service state
// ────────────────────────────────────────────────────────────────────────────

/// Runtime record for one registered service.
pub struct ServiceState {
    spec: ServiceSpec,
    process: Option<Box<dyn ServiceProcess>>,
    status: ServiceStatus,
    last_error: Option<String>,
}

impl ServiceState {
    fn new(spec: ServiceSpec) -> Self {
        Self {
            spec,
            process: None,
            status: ServiceStatus::Pending,
            last_error: None,
        }
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    /// Why the service last failed, if it did.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid())
    }
}

impl std::fmt::Debug for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceState")
            .field("name", &self.spec.name)
            .field("status", &self.status)
            .field("pid", &self.pid())
            .field("last_error", &self.last_error)
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Supervisor
// ────────────────────────────────────────────────────────────────────────────

/// Starts, health-checks and stops a small topology of sibling processes.
///
/// # Example
///
/// ```
/// use spot_supervisor::{ServiceSpec, Supervisor, SupervisorError};
/// use spot_supervisor::process::OsLauncher;
///
/// let mut sup = Supervisor::new(OsLauncher);
/// sup.register(ServiceSpec::new("backend", "python3").critical(true)).unwrap();
/// sup.register(ServiceSpec::new("listener", "python3").depends_on("backend")).unwrap();
///
/// let err = sup.register(ServiceSpec::new("backend", "python3")).unwrap_err();
/// assert_eq!(err, SupervisorError::DuplicateName("backend".into()));
/// ```
pub struct Supervisor {
    launcher: Arc<dyn ProcessLauncher>,
    config: SupervisorConfig,
    services: HashMap<String, ServiceState>,
    registration_order: Vec<String>,
    /// Services launched since the last full stop, in launch order.
    start_order: Vec<String>,
}

impl Supervisor {
    pub fn new(launcher: impl ProcessLauncher + 'static) -> Self {
        Self::with_config(launcher, SupervisorConfig::default())
    }

    pub fn with_config(launcher: impl ProcessLauncher + 'static, config: SupervisorConfig) -> Self {
        Self {
            launcher: Arc::new(launcher),
            config,
            services: HashMap::new(),
            registration_order: Vec::new(),
            start_order: Vec::new(),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Add a service to the registry.
    ///
    /// Dependencies may name services that are registered later; they are
    /// resolved by [`start_all`][Self::start_all].
    ///
    /// # Errors
    ///
    /// - [`SupervisorError::DuplicateName`] – the name is taken.
    /// - [`SupervisorError::CyclicDependency`] – the new edges close a cycle.
    pub fn register(&mut self, spec: ServiceSpec) -> Result<(), SupervisorError> {
        if self.services.contains_key(&spec.name) {
            return Err(SupervisorError::DuplicateName(spec.name));
        }

        let cycle = {
            let mut graph = self.dependency_map();
            graph.insert(spec.name.as_str(), &spec.depends_on);
            cycle_through(&spec.name, &graph)
        };
        if let Some(cycle) = cycle {
            return Err(SupervisorError::CyclicDependency {
                service: spec.name,
                cycle,
            });
        }

        debug!(service = %spec.name, deps = ?spec.depends_on, critical = spec.critical, "registered");
        self.registration_order.push(spec.name.clone());
        self.services.insert(spec.name.clone(), ServiceState::new(spec));
        Ok(())
    }

    pub fn status(&self, name: &str) -> Option<ServiceStatus> {
        self.services.get(name).map(|s| s.status)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceState> {
        self.services.get(name)
    }

    /// All services in registration order.
    pub fn services(&self) -> impl Iterator<Item = &ServiceState> {
        self.registration_order
            .iter()
            .filter_map(|name| self.services.get(name))
    }

    /// Names of services currently starting or running.
    pub fn active(&self) -> Vec<&str> {
        self.services()
            .filter(|s| s.status.is_active())
            .map(|s| s.spec.name.as_str())
            .collect()
    }

    /// Services launched since the last full stop, in launch order.
    pub fn start_order(&self) -> &[String] {
        &self.start_order
    }

    /// Start every registered service in dependency order.
    ///
    /// Services that are already active are left alone, so calling this
    /// again after a partial failure only retries what is not running.
    ///
    /// # Errors
    ///
    /// - [`SupervisorError::UnknownDependency`] before anything is launched.
    /// - [`SupervisorError::StartupFailed`] when a critical service could not
    ///   be made healthy. Every service started by this supervisor has been
    ///   stopped again by the time the error is returned.
    #[instrument(skip(self))]
    pub async fn start_all(&mut self) -> Result<(), SupervisorError> {
        let order = {
            let graph = self.dependency_map();
            topological_order(&self.registration_order, &graph)?
        };
        info!(order = ?order, "starting services");

        for name in order {
            let Some(state) = self.services.get(&name) else {
                continue;
            };
            if state.status.is_active() {
                continue;
            }
            let critical = state.spec.critical;
            let blocked_on = state
                .spec
                .depends_on
                .iter()
                .find(|dep| self.status(dep) != Some(ServiceStatus::Running))
                .cloned();

            let outcome = match blocked_on {
                Some(dep) => Err(format!("dependency '{dep}' is not running")),
                None => self.start_one(&name).await,
            };

            if let Err(reason) = outcome {
                self.stop_service(&name).await;
                if let Some(state) = self.services.get_mut(&name) {
                    state.status = ServiceStatus::Failed;
                    state.last_error = Some(reason.clone());
                }
                if critical {
                    error!(service = %name, reason = %reason, "critical service failed; rolling back startup");
                    self.stop_all().await;
                    return Err(SupervisorError::StartupFailed {
                        service: name,
                        reason,
                    });
                }
                warn!(service = %name, reason = %reason, "ServiceFailed: non-critical service did not start; continuing");
            }
        }

        info!(running = ?self.active(), "startup complete");
        Ok(())
    }

    /// Stop every active service in reverse start order.
    ///
    /// Idempotent: when nothing is active this performs no process operation.
    #[instrument(skip(self))]
    pub async fn stop_all(&mut self) {
        let targets: Vec<String> = self
            .start_order
            .iter()
            .rev()
            .filter(|name| self.status(name).is_some_and(ServiceStatus::is_active))
            .cloned()
            .collect();

        if targets.is_empty() {
            debug!("stop_all: nothing running");
            self.start_order.clear();
            return;
        }

        info!(order = ?targets, "stopping services");
        for name in targets {
            self.stop_service(&name).await;
            if let Some(state) = self.services.get_mut(&name) {
                state.status = ServiceStatus::Stopped;
            }
        }
        self.start_order.clear();
        info!("all services stopped");
    }

    /// Reap running services whose process has exited on its own.
    ///
    /// Returns the names of the services that were found dead; they are
    /// marked [`ServiceStatus::Stopped`].
    pub fn check_liveness(&mut self) -> Vec<String> {
        let mut exited = Vec::new();
        for name in &self.registration_order {
            let Some(state) = self.services.get_mut(name) else {
                continue;
            };
            if state.status != ServiceStatus::Running {
                continue;
            }
            let Some(process) = state.process.as_mut() else {
                continue;
            };
            match process.try_exit() {
                Ok(Some(exit)) => {
                    warn!(service = %name, code = ?exit.code, "service exited unexpectedly");
                    state.process = None;
                    state.status = ServiceStatus::Stopped;
                    state.last_error = Some(format!("exited with code {:?}", exit.code));
                    exited.push(name.clone());
                }
                Ok(None) => {}
                Err(e) => warn!(service = %name, error = %e, "liveness check failed"),
            }
        }
        exited
    }

    /// Wait until the named service's process exits.
    ///
    /// Returns `None` immediately when the service has no live process. The
    /// future only holds the registry between polls, so it can be dropped at
    /// any await point (e.g. inside `tokio::select!`).
    pub async fn wait_for_exit(&mut self, name: &str) -> Option<ExitInfo> {
        let poll_interval = self.config.poll_interval;
        loop {
            let state = self.services.get_mut(name)?;
            let process = state.process.as_mut()?;
            match process.try_exit() {
                Ok(Some(exit)) => {
                    info!(service = %name, code = ?exit.code, "service exited");
                    state.process = None;
                    state.status = ServiceStatus::Stopped;
                    return Some(exit);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(service = %name, error = %e, "cannot poll service");
                    return None;
                }
            }
            sleep(poll_interval).await;
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Internal helpers
    // ────────────────────────────────────────────────────────────────────────

    fn dependency_map(&self) -> DependencyMap<'_> {
        self.services
            .iter()
            .map(|(name, state)| (name.as_str(), &state.spec.depends_on))
            .collect()
    }

    /// Launch one service and poll it until healthy or past its deadline.
    async fn start_one(&mut self, name: &str) -> Result<(), String> {
        let Some(spec) = self.services.get(name).map(|s| s.spec.clone()) else {
            return Err(format!("service '{name}' is not registered"));
        };
        info!(service = %name, command = %spec.command_line(), health = %spec.health.describe(), "launching");

        let process = self
            .launcher
            .launch(&spec)
            .await
            .map_err(|e| format!("launch failed: {e}"))?;
        let launched_at = Instant::now();
        let deadline = launched_at + spec.startup_deadline;
        if let Some(state) = self.services.get_mut(name) {
            state.process = Some(process);
            state.status = ServiceStatus::Starting;
            state.last_error = None;
        }
        self.start_order.push(name.to_string());

        loop {
            let state = self
                .services
                .get_mut(name)
                .ok_or_else(|| format!("service '{name}' vanished from the registry"))?;
            let process = state
                .process
                .as_mut()
                .ok_or_else(|| "process handle lost".to_string())?;

            match process.try_exit() {
                Ok(Some(exit)) => {
                    state.process = None;
                    return Err(format!("exited during startup with code {:?}", exit.code));
                }
                Ok(None) => {}
                Err(e) => return Err(format!("cannot poll process: {e}")),
            }

            let now = Instant::now();
            let remaining = deadline.saturating_duration_since(now);
            let healthy = timeout(remaining, spec.health.is_healthy(now - launched_at))
                .await
                .unwrap_or(false);
            if healthy {
                state.status = ServiceStatus::Running;
                info!(service = %name, after = ?launched_at.elapsed(), "service healthy");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(format!(
                    "not healthy within {:?} ({})",
                    spec.startup_deadline,
                    spec.health.describe()
                ));
            }
            sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    /// Terminate, wait out the grace period, then kill.
    async fn stop_service(&mut self, name: &str) {
        let grace = self.config.grace_period;
        let Some(state) = self.services.get_mut(name) else {
            return;
        };
        let Some(mut process) = state.process.take() else {
            return;
        };

        if let Ok(Some(exit)) = process.try_exit() {
            debug!(service = %name, code = ?exit.code, "already exited");
            return;
        }

        if let Err(e) = process.terminate().await {
            warn!(service = %name, error = %e, "termination request failed");
        }
        match timeout(grace, process.wait()).await {
            Ok(Ok(exit)) => {
                info!(service = %name, code = ?exit.code, "stopped");
                return;
            }
            Ok(Err(e)) => warn!(service = %name, error = %e, "wait failed; killing"),
            Err(_) => warn!(service = %name, grace = ?grace, "no exit within grace period; killing"),
        }

        match timeout(KILL_TIMEOUT, process.kill()).await {
            Ok(Ok(())) => info!(service = %name, "killed"),
            Ok(Err(e)) => error!(service = %name, error = %e, "kill failed"),
            Err(_) => error!(service = %name, "kill did not complete in time"),
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        let active = self.active();
        if !active.is_empty() {
            // Handles are kill-on-drop; say so rather than fail silently.
            warn!(services = ?active, "supervisor dropped with active services; killing them");
        }
    }
}
