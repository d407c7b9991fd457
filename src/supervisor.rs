use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use eyre::eyre;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::HarnessError;

/// Grace period between shutdown escalation steps.
pub const DEFAULT_GRACE: Duration = Duration::from_millis(200);

/// Launches child processes and guarantees none survive the scope that
/// created them.
///
/// Cleanup is scope-tied: every [`ManagedProcess`] kills its child on drop,
/// and Rust drops locals in reverse declaration order, so a scenario that
/// unwinds mid-flight releases its processes last-launched-first without any
/// explicit teardown code.
#[derive(Debug, Clone)]
pub struct Supervisor {
    grace: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE)
    }
}

impl Supervisor {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Spawns a child process and wraps it in a [`ManagedProcess`].
    ///
    /// The child gets a null stdin and inherits stdout/stderr so its output
    /// lands in the test log. `kill_on_drop` backs the scope guarantee even
    /// if the emergency path in `Drop` is never reached.
    ///
    /// # Arguments
    /// * `program` - Executable to launch
    /// * `args` - Argument vector, not including the program itself
    pub fn launch<S: AsRef<str>>(&self, program: &str, args: &[S]) -> crate::Result<ManagedProcess> {
        let argv: Vec<String> = std::iter::once(program.to_string())
            .chain(args.iter().map(|a| a.as_ref().to_string()))
            .collect();
        info!("launching child: {:?}", argv);

        let mut command = Command::new(program);
        command.args(args.iter().map(|a| a.as_ref()));
        command.kill_on_drop(true);
        command.stdin(Stdio::null());
        command.stdout(Stdio::inherit());
        command.stderr(Stdio::inherit());

        let child = command.spawn().map_err(|e| eyre!("failed to spawn {argv:?}: {e}"))?;
        let pid = child
            .id()
            .ok_or_else(|| eyre!("child {argv:?} exited before its PID could be read"))?;

        Ok(ManagedProcess {
            child,
            pid: Pid::from_raw(pid as i32),
            argv,
            status: None,
            grace: self.grace,
        })
    }
}

/// A child process owned by the harness.
///
/// The exit status is cached the first time it is observed; from then on the
/// process counts as exited and is never signalled again.
#[derive(Debug)]
pub struct ManagedProcess {
    child: Child,
    pid: Pid,
    argv: Vec<String>,
    status: Option<ExitStatus>,
    grace: Duration,
}

impl ManagedProcess {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Exit status, if the process has already been observed to exit.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Non-blocking liveness check; caches the exit status when present.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>, HarnessError> {
        if let Some(status) = self.status {
            return Ok(Some(status));
        }
        if let Some(status) = self.child.try_wait()? {
            debug!("process {} exited with {}", self.pid, status);
            self.status = Some(status);
            return Ok(Some(status));
        }
        Ok(None)
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }

    /// Waits for the process to exit, without a deadline.
    pub async fn wait(&mut self) -> Result<ExitStatus, HarnessError> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        debug!("process {} exited with {}", self.pid, status);
        self.status = Some(status);
        Ok(status)
    }

    /// Waits up to `limit` for the process to exit.
    ///
    /// Returns `None` on deadline expiry; the process is left running.
    pub async fn wait_timeout(&mut self, limit: Duration) -> Result<Option<ExitStatus>, HarnessError> {
        if let Some(status) = self.status {
            return Ok(Some(status));
        }
        match timeout(limit, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!("process {} exited with {}", self.pid, status);
                self.status = Some(status);
                Ok(Some(status))
            }
            Err(_) => Ok(None),
        }
    }

    /// Sends `signal` to the process.
    ///
    /// A process already observed to exit is never signalled; ESRCH from a
    /// racing exit is tolerated, the next wait picks up the status.
    pub fn signal(&mut self, signal: Signal) -> Result<(), HarnessError> {
        if self.status.is_some() {
            return Ok(());
        }
        debug!("sending {:?} to process {}", signal, self.pid);
        match kill(self.pid, signal) {
            Ok(()) | Err(nix::Error::ESRCH) => Ok(()),
            Err(e) => Err(std::io::Error::from_raw_os_error(e as i32).into()),
        }
    }

    /// Escalating shutdown ladder.
    ///
    /// An already-exited process is a no-op and returns the cached status.
    /// Otherwise the process gets one grace period to exit on its own (the
    /// one-shot case), then SIGTERM, SIGTERM again, and finally SIGKILL,
    /// each followed by a grace-period wait. A process still alive after
    /// SIGKILL is a harness-integrity fault
    /// ([`HarnessError::ProcessSurvivedKill`]).
    ///
    /// A non-zero exit status is returned, not raised; asserting on it is
    /// the caller's concern.
    pub async fn shutdown(&mut self) -> Result<ExitStatus, HarnessError> {
        if let Some(status) = self.status {
            return Ok(status);
        }

        let grace = self.grace;
        if let Some(status) = self.wait_timeout(grace).await? {
            return Ok(status);
        }

        for attempt in 1..=2 {
            self.signal(Signal::SIGTERM)?;
            if let Some(status) = self.wait_timeout(grace).await? {
                debug!("process {} exited after SIGTERM (attempt {attempt})", self.pid);
                return Ok(status);
            }
            warn!("process {} ignored SIGTERM (attempt {attempt})", self.pid);
        }

        self.signal(Signal::SIGKILL)?;
        match self.wait_timeout(grace).await? {
            Some(status) => {
                warn!("process {} required SIGKILL", self.pid);
                Ok(status)
            }
            None => Err(HarnessError::ProcessSurvivedKill {
                pid: self.pid.as_raw(),
            }),
        }
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        // Emergency path for scenarios unwinding with the child still alive.
        if self.status.is_none() && matches!(self.child.try_wait(), Ok(None)) {
            warn!(
                "process {} ({:?}) still running at drop, killing",
                self.pid, self.argv
            );
            if let Err(e) = self.child.start_kill() {
                warn!("emergency kill of process {} failed: {}", self.pid, e);
            }
        }
    }
}
