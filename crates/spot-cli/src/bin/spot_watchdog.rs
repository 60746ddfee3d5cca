//! `spot-watchdog` – keep the paired controller connected.
//!
//! Runs until SIGINT/SIGTERM. Normally started by `spot-launch`.

use std::sync::Arc;

use spot_cli::{ShutdownSignal, config, console, telemetry};
use spot_pairing::{BluezCtl, ControllerWatchdog};
use spot_types::Remediation;
use tokio::sync::Notify;
use tracing::warn;

fn main() {
    let guard = telemetry::init_tracing("spot-watchdog");

    let code = match spot_cli::runtime() {
        Ok(rt) => rt.block_on(run()),
        Err(e) => {
            console::print_failure(&e, "Could not start the async runtime.");
            1
        }
    };
    drop(guard);
    std::process::exit(code);
}

async fn run() -> i32 {
    let cfg = match config::load(None) {
        Ok(cfg) => cfg,
        Err(e) => {
            console::print_failure(&e, e.remediation());
            return 1;
        }
    };
    let matcher = match cfg.matcher() {
        Ok(m) => m,
        Err(e) => {
            console::print_failure(&e, e.remediation());
            return 1;
        }
    };

    let shutdown = ShutdownSignal::new();
    if let Err(e) = shutdown.install() {
        warn!(error = %e, "Failed to install signal handler");
    }
    let stop = Arc::new(Notify::new());
    shutdown.forward_to(stop.clone());

    let mut watchdog = ControllerWatchdog::new(BluezCtl::new(), matcher, cfg.watchdog_config());
    watchdog.run(stop).await;
    0
}
