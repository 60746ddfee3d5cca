//! `spot-pair` – pair a PlayStation controller with the robot.
//!
//! Exit code `0` when the controller is paired, trusted and connected, `1`
//! otherwise.

use colored::Colorize;
use spot_cli::{ShutdownSignal, config, console, telemetry};
use spot_pairing::{BluezCtl, PairingAutomaton};
use spot_types::Remediation;
use tracing::warn;

fn main() {
    let guard = telemetry::init_tracing("spot-pair");

    let code = match spot_cli::runtime() {
        Ok(rt) => rt.block_on(run()),
        Err(e) => {
            console::print_failure(&e, "Could not start the async runtime.");
            1
        }
    };
    drop(guard);
    // Exit without waiting for a pending stdin read.
    std::process::exit(code);
}

async fn run() -> i32 {
    console::print_banner("MicroSpot", "Controller pairing");

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

    println!("  1. Hold {} + {} until the light bar flashes rapidly.", "SHARE".bold(), "PS".bold());
    println!("  2. Keep the controller close to the robot.");
    println!();
    if !console::confirm("Press Enter when ready …", &shutdown).await {
        println!("  {}", "Cancelled.".yellow());
        return 1;
    }

    let pairing = cfg.pairing_config();
    let mut automaton = PairingAutomaton::new(BluezCtl::new(), matcher, pairing);
    shutdown.forward_to(automaton.cancel_handle());

    println!(
        "  Scanning for {} …",
        format!("{}s", pairing.scan_window.as_secs()).bold()
    );
    match automaton.run().await {
        Ok(report) => {
            console::print_pairing_report(&report);
            0
        }
        Err(e) => {
            console::print_failure(&e, e.remediation());
            1
        }
    }
}
