//! Child process lifecycle.
//!
//! The [`Supervisor`] starts the agent on a session's terminal and ends its
//! life in exactly one of two ways: [`Supervisor::await_exit`] after a
//! success verdict, or [`Supervisor::terminate`] on every other path. Both
//! consume the [`ChildProcess`], so the two can never both run.
//!
//! Termination escalates: SIGTERM, wait for the grace period, then SIGKILL
//! and one more grace period. A process that survives that is reported as a
//! [`TeardownWarning`] rather than an error.

use std::time::Duration;

use pass_pty::{ExitStatus, PtyConfig, PtyError, PtySignal, UnixPtyChild, spawn_child};

use crate::error::{PassError, Result, TeardownWarning};
use crate::session::PtySession;

/// Default time allowed for the child to exit after each signal.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// A running agent process.
///
/// Dropping it without going through the supervisor still kills the
/// process, but does not wait for it.
#[derive(Debug)]
pub struct ChildProcess {
    inner: UnixPtyChild,
    program: String,
}

impl ChildProcess {
    /// The process ID.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.inner.pid()
    }

    /// The program name it was started as.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Stop the process and reap it. Idempotent.
    ///
    /// A process that has already exited, including one that exits between
    /// the check and the signal, is not an error.
    pub async fn shutdown(&mut self, grace: Duration) -> Option<TeardownWarning> {
        match self.inner.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(pid = self.pid(), %status, "child already exited");
                return None;
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(pid = self.pid(), error = %e, "try_wait failed"),
        }

        let mut last_failure = String::from("still running after SIGKILL");
        for signal in [PtySignal::Terminate, PtySignal::Kill] {
            match self.inner.signal(signal) {
                Ok(()) => {}
                Err(e) if e.is_process_exited() => {
                    // Reap if we can; the status is no longer interesting.
                    let _ = self.inner.try_wait();
                    return None;
                }
                Err(e) => {
                    tracing::debug!(pid = self.pid(), ?signal, error = %e, "signal failed");
                    last_failure = e.to_string();
                    continue;
                }
            }

            match tokio::time::timeout(grace, self.inner.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(pid = self.pid(), ?signal, %status, "child stopped");
                    return None;
                }
                Ok(Err(e)) => {
                    tracing::debug!(pid = self.pid(), error = %e, "wait failed");
                    last_failure = e.to_string();
                }
                Err(_) => {
                    tracing::debug!(pid = self.pid(), ?signal, ?grace, "child ignored signal");
                }
            }
        }

        Some(TeardownWarning::new(
            self.program.clone(),
            self.pid(),
            last_failure,
        ))
    }
}

/// Starts and stops the agent process.
#[derive(Debug, Clone, Copy)]
pub struct Supervisor {
    grace: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINATE_GRACE)
    }
}

impl Supervisor {
    /// Create a supervisor with the given termination grace period.
    #[must_use]
    pub const fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// The grace period used between termination steps.
    #[must_use]
    pub const fn grace(&self) -> Duration {
        self.grace
    }

    /// Start `program` with `args` attached to `session`'s terminal.
    ///
    /// On success the session's own copy of the child endpoint is released.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::Spawn`] if the program cannot be started or the
    /// session no longer has a child endpoint.
    pub fn spawn(
        &self,
        program: &str,
        args: &[String],
        session: &mut PtySession,
        config: &PtyConfig,
    ) -> Result<ChildProcess> {
        let spawn_error = |source: PtyError| PassError::Spawn {
            program: program.to_string(),
            source,
        };

        let child_side = session
            .child_side()
            .ok_or_else(|| spawn_error(PtyError::Closed))?;
        let inner = spawn_child(child_side, program, args, config).map_err(spawn_error)?;
        session.release_child_side();

        tracing::debug!(pid = inner.pid(), program, "agent started");
        Ok(ChildProcess {
            inner,
            program: program.to_string(),
        })
    }

    /// Stop the child, escalating to SIGKILL if needed.
    pub async fn terminate(&self, mut child: ChildProcess) -> Option<TeardownWarning> {
        child.shutdown(self.grace).await
    }

    /// Wait for the child to exit on its own.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::Wait`] if the process cannot be reaped.
    pub async fn await_exit(&self, mut child: ChildProcess) -> Result<ExitStatus> {
        child.inner.wait().await.map_err(PassError::Wait)
    }
}
