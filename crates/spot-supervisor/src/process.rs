//! Process layer seam.
//!
//! The supervisor never touches `tokio::process` directly; it launches and
//! signals children through [`ProcessLauncher`] and [`ServiceProcess`]. The
//! OS-backed implementations live here, and tests substitute in-memory fakes
//! that record every operation.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
#[cfg(unix)]
use nix::{
    errno::Errno,
    sys::signal::{Signal, kill},
    unistd::Pid,
};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::spec::ServiceSpec;

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

/// Handle to one launched service process.
#[async_trait]
pub trait ServiceProcess: Send {
    /// OS process id, if the process has not been reaped yet.
    fn pid(&self) -> Option<u32>;

    /// Non-blocking exit check.
    fn try_exit(&mut self) -> io::Result<Option<ExitInfo>>;

    /// Ask the process to exit (SIGTERM on Unix). Does not wait.
    async fn terminate(&mut self) -> io::Result<()>;

    /// Force the process down and reap it.
    async fn kill(&mut self) -> io::Result<()>;

    /// Wait until the process exits.
    async fn wait(&mut self) -> io::Result<ExitInfo>;
}

/// Starts service processes from their [`ServiceSpec`].
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, spec: &ServiceSpec) -> io::Result<Box<dyn ServiceProcess>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// OS implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Launches real child processes that inherit the launcher's stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsLauncher;

#[async_trait]
impl ProcessLauncher for OsLauncher {
    async fn launch(&self, spec: &ServiceSpec) -> io::Result<Box<dyn ServiceProcess>> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            // Last line of defence: dropping the handle never leaves an orphan.
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        let child = cmd.spawn()?;
        debug!(service = %spec.name, pid = ?child.id(), "spawned");
        Ok(Box::new(OsProcess { child }))
    }
}

/// A [`ServiceProcess`] backed by a `tokio::process::Child`.
pub struct OsProcess {
    child: Child,
}

#[async_trait]
impl ServiceProcess for OsProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_exit(&mut self) -> io::Result<Option<ExitInfo>> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| ExitInfo { code: status.code() }))
    }

    #[cfg(unix)]
    async fn terminate(&mut self) -> io::Result<()> {
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = i32::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            // Already exited but not yet reaped.
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        }
    }

    #[cfg(not(unix))]
    async fn terminate(&mut self) -> io::Result<()> {
        if self.child.id().is_none() {
            return Ok(());
        }
        self.child.start_kill()
    }

    async fn kill(&mut self) -> io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill().await
    }

    async fn wait(&mut self) -> io::Result<ExitInfo> {
        let status = self.child.wait().await?;
        Ok(ExitInfo { code: status.code() })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn terminate_stops_a_sleeping_child() {
        let spec = ServiceSpec::new("sleeper", "sleep").arg("30");
        let mut proc = OsLauncher.launch(&spec).await.unwrap();
        assert!(proc.pid().is_some());
        assert_eq!(proc.try_exit().unwrap(), None);

        proc.terminate().await.unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), proc.wait())
            .await
            .expect("child should exit on SIGTERM")
            .unwrap();
        // Killed by a signal, so there is no exit code.
        assert_eq!(exit.code, None);
    }

    #[tokio::test]
    async fn exit_code_is_reported() {
        let spec = ServiceSpec::new("quitter", "sh").args(["-c", "exit 3"]);
        let mut proc = OsLauncher.launch(&spec).await.unwrap();
        let exit = proc.wait().await.unwrap();
        assert_eq!(exit.code, Some(3));
        // Signalling an already-reaped child is harmless.
        proc.terminate().await.unwrap();
        proc.kill().await.unwrap();
    }

    #[tokio::test]
    async fn terminate_after_unreaped_exit_is_ok() {
        let spec = ServiceSpec::new("brief", "true");
        let mut proc = OsLauncher.launch(&spec).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        proc.terminate().await.unwrap();
        assert_eq!(proc.wait().await.unwrap().code, Some(0));
    }

    #[tokio::test]
    async fn missing_program_fails_to_launch() {
        let spec = ServiceSpec::new("ghost", "/nonexistent/definitely-not-here");
        assert!(OsLauncher.launch(&spec).await.is_err());
    }
}
