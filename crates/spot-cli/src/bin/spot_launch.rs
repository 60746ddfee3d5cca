//! `spot-launch` – bring up the MicroSpot services and run the UI.
//!
//! Exit codes: `0` after a clean shutdown (UI exited or SIGINT/SIGTERM),
//! `1` when the configuration is invalid or a critical service fails.

use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use spot_cli::config::{self, Config};
use spot_cli::{ShutdownSignal, UiKind, console, supervise, telemetry, topology};
use spot_supervisor::{OsLauncher, Supervisor};
use spot_types::Remediation;
use tracing::warn;

#[derive(Parser)]
#[command(name = "spot-launch")]
#[command(about = "Start the MicroSpot backend, controller services and UI", long_about = None)]
#[command(version)]
struct Cli {
    /// Foreground UI to run (default from config: streamlit)
    #[arg(long, value_enum)]
    ui: Option<UiKind>,

    /// Config file (default: ~/.microspot/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a default config file and exit
    #[arg(long)]
    init_config: bool,
}

fn main() {
    let cli = Cli::parse();
    let guard = telemetry::init_tracing("spot-launch");

    let code = match spot_cli::runtime() {
        Ok(rt) => rt.block_on(run(cli)),
        Err(e) => {
            console::print_failure(&e, "Could not start the async runtime.");
            1
        }
    };
    drop(guard);
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    if cli.init_config {
        return init_config(cli.config);
    }

    let cfg = match config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            console::print_failure(&e, e.remediation());
            return 1;
        }
    };
    let ui = cli.ui.unwrap_or(cfg.ui);
    let specs = match topology::build(&cfg, ui) {
        Ok(specs) => specs,
        Err(e) => {
            console::print_failure(&e, e.remediation());
            return 1;
        }
    };

    let mut supervisor = Supervisor::with_config(OsLauncher, cfg.supervisor_config());
    for spec in specs {
        if let Err(e) = supervisor.register(spec) {
            console::print_failure(&e, e.remediation());
            return 1;
        }
    }

    let shutdown = ShutdownSignal::new();
    if let Err(e) = shutdown.install() {
        warn!(error = %e, "Failed to install signal handler; Ctrl-C will not stop services cleanly");
    }

    console::print_banner("MicroSpot", &format!("Launching services ({ui} UI) …"));
    let code = match supervise(&mut supervisor, topology::UI, &shutdown).await {
        Ok(outcome) => {
            console::print_outcome(&outcome);
            outcome.exit_code()
        }
        Err(e) => {
            console::print_failure(&e, e.remediation());
            1
        }
    };
    console::print_services(&supervisor);
    code
}

fn init_config(path: Option<PathBuf>) -> i32 {
    let path = path.unwrap_or_else(config::config_path);
    if path.exists() {
        println!("  Config already exists at {}", path.display().to_string().bold());
        return 0;
    }
    match config::save_to(&Config::default(), &path) {
        Ok(()) => {
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            0
        }
        Err(e) => {
            console::print_failure(&e, e.remediation());
            1
        }
    }
}
