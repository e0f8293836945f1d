//! Unix child process management for PTY.
//!
//! This module spawns a program with its standard streams bound to the
//! child side of a PTY and provides the handle used to observe and signal it.

use std::ffi::OsStr;
use std::io;
use std::os::unix::io::OwnedFd;
use std::process::Stdio;

use rustix::process::{Pid, Signal, kill_process};
use tokio::process::{Child as TokioChild, Command};

use crate::config::{PtyConfig, PtySignal};
use crate::error::{PtyError, Result, errno_to_io};
use crate::status::ExitStatus;

/// Unix child process handle.
///
/// The process is killed if the handle is dropped while it is still
/// running, so a forgotten handle never leaks a process.
pub struct UnixPtyChild {
    /// The underlying tokio child process.
    child: TokioChild,
    /// The process ID.
    pid: u32,
    /// Cached exit status once the process has been reaped.
    exit_status: Option<ExitStatus>,
}

impl std::fmt::Debug for UnixPtyChild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixPtyChild")
            .field("pid", &self.pid)
            .field("exit_status", &self.exit_status)
            .finish()
    }
}

impl UnixPtyChild {
    fn new(child: TokioChild) -> Result<Self> {
        let pid = child.id().ok_or_else(|| {
            PtyError::Spawn(io::Error::other("spawned process has no pid"))
        })?;
        Ok(Self {
            child,
            pid,
            exit_status: None,
        })
    }

    /// Get the process ID.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Check if the process is still running, as far as we have observed.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.exit_status.is_none()
    }

    /// Wait for the child process to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }

        let status = ExitStatus::from(self.child.wait().await.map_err(PtyError::Wait)?);
        self.exit_status = Some(status);
        tracing::debug!(pid = self.pid, %status, "child reaped");
        Ok(status)
    }

    /// Try to get the exit status without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.exit_status {
            return Ok(Some(status));
        }

        let status = self
            .child
            .try_wait()
            .map_err(PtyError::Wait)?
            .map(ExitStatus::from);
        if let Some(status) = status {
            self.exit_status = Some(status);
            tracing::debug!(pid = self.pid, %status, "child reaped");
        }
        Ok(status)
    }

    /// Send a signal to the child process.
    ///
    /// Returns [`PtyError::ProcessExited`] if the process is already gone.
    pub fn signal(&self, signal: PtySignal) -> Result<()> {
        if !self.is_running() {
            return Err(PtyError::ProcessExited);
        }

        let pid = Pid::from_raw(self.pid as i32).ok_or_else(|| {
            PtyError::Signal(io::Error::new(io::ErrorKind::InvalidInput, "invalid pid"))
        })?;

        let sig = Signal::from_named_raw(signal.as_unix_signal()).ok_or_else(|| {
            PtyError::Signal(io::Error::new(io::ErrorKind::InvalidInput, "invalid signal"))
        })?;

        tracing::trace!(pid = self.pid, ?signal, "sending signal");
        match kill_process(pid, sig) {
            Ok(()) => Ok(()),
            Err(rustix::io::Errno::SRCH) => Err(PtyError::ProcessExited),
            Err(e) => Err(PtyError::Signal(errno_to_io(e))),
        }
    }

    /// Kill the child process (SIGKILL).
    pub fn kill(&self) -> Result<()> {
        self.signal(PtySignal::Kill)
    }
}

/// Spawn a child process in a PTY.
///
/// Standard input, output and error are duplicates of `slave_fd`. With
/// `new_session` the child calls `setsid`, and with `controlling_terminal`
/// the PTY becomes its controlling terminal so `/dev/tty` resolves to it.
pub fn spawn_child<S, I>(
    slave_fd: &OwnedFd,
    program: S,
    args: I,
    config: &PtyConfig,
) -> Result<UnixPtyChild>
where
    S: AsRef<OsStr>,
    I: IntoIterator,
    I::Item: AsRef<OsStr>,
{
    let stdio = || -> Result<Stdio> {
        let fd = slave_fd.try_clone().map_err(PtyError::Spawn)?;
        Ok(Stdio::from(fd))
    };

    let mut cmd = Command::new(program.as_ref());
    cmd.args(args);
    cmd.env_clear();
    cmd.envs(config.effective_env());
    cmd.stdin(stdio()?);
    cmd.stdout(stdio()?);
    cmd.stderr(stdio()?);
    cmd.kill_on_drop(true);

    if let Some(ref dir) = config.working_directory {
        cmd.current_dir(dir);
    }

    if config.new_session {
        let controlling_terminal = config.controlling_terminal;
        // SAFETY: only async-signal-safe calls run between fork and exec.
        // Standard input is already the PTY child side at this point.
        unsafe {
            cmd.pre_exec(move || {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                if controlling_terminal && libc::ioctl(0, libc::TIOCSCTTY, 0) == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let child = cmd.spawn().map_err(PtyError::Spawn)?;
    let child = UnixPtyChild::new(child)?;
    tracing::debug!(pid = child.pid(), program = ?program.as_ref(), "spawned child");
    Ok(child)
}
