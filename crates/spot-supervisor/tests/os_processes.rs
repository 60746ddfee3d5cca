//! End-to-end supervision of real child processes.
#![cfg(unix)]

use std::time::{Duration, Instant};

use spot_supervisor::{
    OsLauncher, ServiceSpec, ServiceStatus, StaysUpHealthCheck, Supervisor, SupervisorConfig,
    SupervisorError,
};

fn supervisor() -> Supervisor {
    Supervisor::with_config(
        OsLauncher,
        SupervisorConfig {
            poll_interval: Duration::from_millis(20),
            grace_period: Duration::from_millis(300),
        },
    )
}

fn pid_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
        && std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .map(|s| !s.contains(") Z "))
            .unwrap_or(false)
}

#[tokio::test]
async fn starts_in_dependency_order_and_stops_cleanly() {
    let mut sup = supervisor();
    sup.register(
        ServiceSpec::new("listener", "sleep")
            .arg("30")
            .depends_on("backend"),
    )
    .unwrap();
    sup.register(
        ServiceSpec::new("backend", "sleep")
            .arg("30")
            .critical(true)
            .health(StaysUpHealthCheck::new(Duration::from_millis(100))),
    )
    .unwrap();

    sup.start_all().await.unwrap();
    assert_eq!(sup.start_order(), ["backend", "listener"]);
    assert_eq!(sup.status("backend"), Some(ServiceStatus::Running));
    assert_eq!(sup.status("listener"), Some(ServiceStatus::Running));
    let pids: Vec<u32> = sup.services().filter_map(|s| s.pid()).collect();
    assert_eq!(pids.len(), 2);

    sup.stop_all().await;
    assert!(sup.active().is_empty());
    assert!(sup.services().all(|s| s.status() == ServiceStatus::Stopped));
    if cfg!(target_os = "linux") {
        for pid in pids {
            assert!(!pid_alive(pid), "pid {pid} survived stop_all");
        }
    }
}

#[tokio::test]
async fn crashing_critical_service_rolls_back() {
    let mut sup = supervisor();
    sup.register(ServiceSpec::new("watchdog", "sleep").arg("30"))
        .unwrap();
    sup.register(
        ServiceSpec::new("backend", "sh")
            .args(["-c", "exit 2"])
            .critical(true)
            .health(StaysUpHealthCheck::new(Duration::from_millis(500))),
    )
    .unwrap();

    let err = sup.start_all().await.unwrap_err();
    assert!(matches!(err, SupervisorError::StartupFailed { ref service, .. } if service == "backend"));
    assert_eq!(sup.status("backend"), Some(ServiceStatus::Failed));
    assert_eq!(sup.status("watchdog"), Some(ServiceStatus::Stopped));
    assert!(sup.active().is_empty());
}

#[tokio::test]
async fn service_ignoring_sigterm_is_killed_after_grace() {
    let mut sup = supervisor();
    // Ignored signal dispositions survive exec.
    sup.register(ServiceSpec::new("stubborn", "sh").args(["-c", "trap '' TERM; exec sleep 30"]))
        .unwrap();
    sup.start_all().await.unwrap();
    // Give the shell time to install the trap before exec.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    sup.stop_all().await;
    let took = started.elapsed();
    assert!(took >= Duration::from_millis(300), "stopped before the grace period: {took:?}");
    assert!(took < Duration::from_secs(3), "kill took {took:?}");
    assert_eq!(sup.status("stubborn"), Some(ServiceStatus::Stopped));
}

#[tokio::test]
async fn missing_program_fails_noncritical_service_only() {
    let mut sup = supervisor();
    sup.register(ServiceSpec::new("backend", "sleep").arg("30").critical(true))
        .unwrap();
    sup.register(ServiceSpec::new("extra", "/nonexistent/spot-helper"))
        .unwrap();

    sup.start_all().await.unwrap();
    assert_eq!(sup.status("extra"), Some(ServiceStatus::Failed));
    assert!(sup.service("extra").and_then(|s| s.last_error()).is_some());
    assert_eq!(sup.status("backend"), Some(ServiceStatus::Running));
    sup.stop_all().await;
}
