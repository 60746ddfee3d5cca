//! In-memory process layer for tests.
//!
//! [`FakeLauncher`] hands out [`ServiceProcess`] handles that never touch the
//! OS. Every launch, termination request and kill is appended to a shared
//! journal so tests can assert on the exact sequence of process operations.
//!
//! Enabled for downstream crates with the `test-util` feature.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::process::{ExitInfo, ProcessLauncher, ServiceProcess};
use crate::spec::ServiceSpec;

/// One recorded process operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Launched(String),
    Terminated(String),
    Killed(String),
}

/// How a fake process reacts over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Runs until asked to terminate, then exits cleanly.
    #[default]
    Graceful,
    /// Ignores termination requests; only a kill brings it down.
    IgnoresTerminate,
    /// Exits with code 1 on its own after the given time.
    ExitsAfter(Duration),
    /// `launch` itself fails.
    FailsToLaunch,
}

type LaunchHook = Arc<dyn Fn(&ServiceSpec) + Send + Sync>;

#[derive(Default)]
struct Journal {
    events: Vec<ProcessEvent>,
    behaviors: HashMap<String, FakeBehavior>,
}

/// A [`ProcessLauncher`] that records instead of spawning.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    journal: Arc<Mutex<Journal>>,
    launch_hook: Option<LaunchHook>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` at the start of every launch, before the process exists.
    pub fn with_launch_hook(mut self, hook: impl Fn(&ServiceSpec) + Send + Sync + 'static) -> Self {
        self.launch_hook = Some(Arc::new(hook));
        self
    }

    pub fn set_behavior(&self, service: &str, behavior: FakeBehavior) {
        lock(&self.journal)
            .behaviors
            .insert(service.to_string(), behavior);
    }

    pub fn events(&self) -> Vec<ProcessEvent> {
        lock(&self.journal).events.clone()
    }

    /// Names of launched services, in launch order.
    pub fn launched(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProcessEvent::Launched(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Names of services that received a termination request, in order.
    pub fn terminated(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProcessEvent::Terminated(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn killed(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProcessEvent::Killed(name) => Some(name),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn launch(&self, spec: &ServiceSpec) -> io::Result<Box<dyn ServiceProcess>> {
        if let Some(hook) = &self.launch_hook {
            hook(spec);
        }
        let behavior = {
            let mut journal = lock(&self.journal);
            let behavior = journal
                .behaviors
                .get(&spec.name)
                .copied()
                .unwrap_or_default();
            if behavior == FakeBehavior::FailsToLaunch {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{}: command not found", spec.program),
                ));
            }
            journal.events.push(ProcessEvent::Launched(spec.name.clone()));
            behavior
        };
        Ok(Box::new(FakeProcess {
            name: spec.name.clone(),
            behavior,
            launched_at: Instant::now(),
            terminate_requested: false,
            exited: None,
            journal: self.journal.clone(),
        }))
    }
}

struct FakeProcess {
    name: String,
    behavior: FakeBehavior,
    launched_at: Instant,
    terminate_requested: bool,
    exited: Option<ExitInfo>,
    journal: Arc<Mutex<Journal>>,
}

impl FakeProcess {
    fn record(&self, event: ProcessEvent) {
        lock(&self.journal).events.push(event);
    }
}

#[async_trait]
impl ServiceProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        self.exited.is_none().then_some(4242)
    }

    fn try_exit(&mut self) -> io::Result<Option<ExitInfo>> {
        if self.exited.is_none() {
            match self.behavior {
                FakeBehavior::Graceful if self.terminate_requested => {
                    self.exited = Some(ExitInfo { code: Some(0) });
                }
                FakeBehavior::ExitsAfter(after) if self.launched_at.elapsed() >= after => {
                    self.exited = Some(ExitInfo { code: Some(1) });
                }
                _ => {}
            }
        }
        Ok(self.exited)
    }

    async fn terminate(&mut self) -> io::Result<()> {
        self.record(ProcessEvent::Terminated(self.name.clone()));
        self.terminate_requested = true;
        Ok(())
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.record(ProcessEvent::Killed(self.name.clone()));
        self.exited = Some(ExitInfo { code: None });
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<ExitInfo> {
        loop {
            if let Some(exit) = self.try_exit()? {
                return Ok(exit);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

fn lock(journal: &Mutex<Journal>) -> MutexGuard<'_, Journal> {
    journal.lock().unwrap_or_else(PoisonError::into_inner)
}
