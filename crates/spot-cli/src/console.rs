//! Operator-facing terminal output.
//!
//! Diagnostics go through `tracing`; everything here is meant for the person
//! at the keyboard and uses `println!` with colour.

use colored::{ColoredString, Colorize};
use spot_supervisor::{ServiceStatus, Supervisor};
use spot_types::PairingReport;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::launch::LaunchOutcome;
use crate::signal::ShutdownSignal;

pub fn print_banner(tool: &str, tagline: &str) {
    println!();
    println!("  {} {}", tool.bold().cyan(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  {tagline}");
    println!();
}

pub fn status_label(status: ServiceStatus) -> ColoredString {
    let text = format!("{:<8}", status.to_string());
    match status {
        ServiceStatus::Running => text.green(),
        ServiceStatus::Starting => text.yellow(),
        ServiceStatus::Failed => text.red().bold(),
        ServiceStatus::Pending | ServiceStatus::Stopped => text.dimmed(),
    }
}

/// One line per service: name, status, pid and last error.
pub fn print_services(supervisor: &Supervisor) {
    for state in supervisor.services() {
        let pid = state
            .pid()
            .map(|p| format!("pid {p}"))
            .unwrap_or_default();
        println!(
            "    {:<10} {} {:>9}  {}",
            state.spec().name.bold(),
            status_label(state.status()),
            pid.dimmed(),
            state.last_error().unwrap_or_default().red()
        );
    }
}

pub fn print_outcome(outcome: &LaunchOutcome) {
    match outcome {
        LaunchOutcome::UiExited { code } => println!(
            "  {} UI exited{}; services stopped.",
            "✓".green().bold(),
            code.map(|c| format!(" with code {c}")).unwrap_or_default()
        ),
        LaunchOutcome::Signalled => {
            println!("  {} Services stopped.", "✓".green().bold())
        }
        LaunchOutcome::ServiceLost { service } => println!(
            "  {} Critical service '{}' exited; everything was stopped.",
            "✗".red().bold(),
            service.bold()
        ),
        LaunchOutcome::UiFailed { reason } => {
            println!("  {} {}", "✗".red().bold(), format!("UI did not start: {reason}").red());
            println!(
                "  {} Check that the UI is installed and `src_dir` points at the MicroSpot sources.",
                "→".yellow()
            );
        }
    }
}

/// Print an error and the hint that tells the operator what to do next.
pub fn print_failure(error: &dyn std::error::Error, hint: &str) {
    println!("  {} {}", "✗".red().bold(), error.to_string().red());
    println!("  {} {}", "→".yellow(), hint);
}

pub fn print_pairing_report(report: &PairingReport) {
    println!(
        "  {} Paired {} ({})",
        "✓".green().bold(),
        report.display_name.bold(),
        report.address.cyan()
    );
    println!("  {}", format!("session {}", report.session_id).dimmed());
}

/// Print `message` and wait for Enter.
///
/// Returns `false` when stdin is closed or `shutdown` fires first.
pub async fn confirm(message: &str, shutdown: &ShutdownSignal) -> bool {
    println!("  {}", message.bold());
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        read = stdin.read_line(&mut line) => matches!(read, Ok(n) if n > 0),
        _ = shutdown.wait() => false,
    }
}
