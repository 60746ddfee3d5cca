//! `spot-supervisor` – service bring-up and tear-down.
//!
//! Launches a small topology of sibling processes (backend, watchdog,
//! controller listener, UI), waits for each to report healthy before its
//! dependents start, and stops everything in reverse order on shutdown.
//!
//! # Modules
//!
//! - [`supervisor`] – [`Supervisor`][supervisor::Supervisor]: the service
//!   registry and its start/stop/liveness operations.
//! - [`spec`] – [`ServiceSpec`][spec::ServiceSpec]: what to run, what it
//!   depends on, how to tell it is ready.
//! - [`health`] – the [`HealthCheck`][health::HealthCheck] trait with HTTP,
//!   stays-up and immediate implementations.
//! - [`process`] – the [`ProcessLauncher`][process::ProcessLauncher] seam
//!   and its `tokio::process` implementation.
//! - `testing` (feature `test-util`) – a recording fake process layer.

pub mod error;
mod graph;
pub mod health;
pub mod process;
pub mod spec;
pub mod supervisor;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::SupervisorError;
pub use health::{FnHealthCheck, HealthCheck, HttpHealthCheck, ImmediateHealthCheck, StaysUpHealthCheck};
pub use process::{ExitInfo, OsLauncher, ProcessLauncher, ServiceProcess};
pub use spec::ServiceSpec;
pub use spot_types::ServiceStatus;
pub use supervisor::{ServiceState, Supervisor, SupervisorConfig};
