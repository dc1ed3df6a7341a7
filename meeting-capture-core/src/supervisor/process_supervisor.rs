use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::command::CaptureToolCommand;
use crate::models::error::CaptureError;

const EXIT_POLL: Duration = Duration::from_millis(20);

/// Identity of a launched capture process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisedProcess {
    pub pid: u32,
    pub command_line: String,
    pub started_at: DateTime<Utc>,
}

/// Owns at most one external capture process and guarantees it is reaped.
///
/// Termination is graceful first (SIGTERM on unix, so the tool can finish its
/// file), then forced once `terminate_timeout` has elapsed. Dropping the
/// supervisor terminates a process that is still running.
#[derive(Debug)]
pub struct ProcessSupervisor {
    child: Option<Child>,
    process: Option<SupervisedProcess>,
    exit_status: Option<ExitStatus>,
    terminate_timeout: Duration,
    forward_output: bool,
}

impl ProcessSupervisor {
    pub fn new(terminate_timeout: Duration) -> Self {
        Self {
            child: None,
            process: None,
            exit_status: None,
            terminate_timeout,
            forward_output: false,
        }
    }

    /// Inherit stdout/stderr for spawned processes instead of discarding them.
    pub fn with_forwarded_output(mut self, forward: bool) -> Self {
        self.forward_output = forward;
        self
    }

    fn output(&self) -> Stdio {
        if self.forward_output {
            Stdio::inherit()
        } else {
            Stdio::null()
        }
    }

    /// Launch `command` with stdin detached. Returns the pid.
    pub fn spawn(&mut self, command: &CaptureToolCommand) -> Result<u32, CaptureError> {
        if self.child.is_some() {
            return Err(CaptureError::InvalidState(
                "a capture process is already running".into(),
            ));
        }

        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(self.output())
            .stderr(self.output())
            .spawn()
            .map_err(|e| CaptureError::Spawn(format!("{}: {}", command.program, e)))?;

        let pid = child.id();
        log::info!("spawned capture process {} (pid {})", command.command_line(), pid);

        self.child = Some(child);
        self.exit_status = None;
        self.process = Some(SupervisedProcess {
            pid,
            command_line: command.command_line(),
            started_at: Utc::now(),
        });
        Ok(pid)
    }

    /// Non-blocking check whether the process is still running.
    ///
    /// An exited process is reaped here and its status kept for `exit_status()`.
    pub fn poll_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                log::info!("capture process {} exited: {}", child.id(), status);
                self.exit_status = Some(status);
                self.child = None;
                false
            }
            Err(e) => {
                log::warn!("failed to poll capture process {}: {}", child.id(), e);
                true
            }
        }
    }

    /// Wait up to `timeout` for the process to exit on its own.
    ///
    /// Returns the exit status if it exited, `None` if it is still running.
    pub fn wait_exit(&mut self, timeout: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.poll_alive() {
                return self.exit_status;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            thread::sleep(EXIT_POLL.min(deadline - now));
        }
    }

    /// Stop the process and reap it.
    ///
    /// Returns the exit status, or `None` if nothing was ever spawned.
    /// Calling it again after the process is gone returns the stored status.
    pub fn terminate(&mut self) -> Result<Option<ExitStatus>, CaptureError> {
        if !self.poll_alive() {
            return Ok(self.exit_status);
        }
        let Some(mut child) = self.child.take() else {
            return Ok(self.exit_status);
        };
        let pid = child.id();

        if let Err(e) = request_exit(&mut child) {
            log::warn!("failed to signal capture process {}: {}", pid, e);
        }

        let deadline = Instant::now() + self.terminate_timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL),
                Ok(None) => {
                    log::warn!(
                        "capture process {} ignored termination for {:?}, killing",
                        pid,
                        self.terminate_timeout
                    );
                    if let Err(e) = child.kill() {
                        log::warn!("failed to kill capture process {}: {}", pid, e);
                    }
                    break child.wait()?;
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e.into());
                }
            }
        };

        log::info!("capture process {} terminated: {}", pid, status);
        self.exit_status = Some(status);
        Ok(Some(status))
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    pub fn process(&self) -> Option<&SupervisedProcess> {
        self.process.as_ref()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(e) = self.terminate() {
                log::error!("failed to terminate capture process on drop: {}", e);
            }
        }
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(child.id())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: plain syscall on a pid we own and have not reaped yet.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) -> std::io::Result<()> {
    child.kill()
}
