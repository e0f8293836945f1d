//! Maps a finished run to one diagnostic line and an exit code.

use std::io::{self, Write};

use pass_pty::ExitStatus;

use crate::error::{PassError, TeardownWarning, format_buffer_snippet};

/// Exit code for a successful run.
pub const EXIT_SUCCESS: u8 = 0;

/// Exit code for every failed run.
pub const EXIT_FAILURE: u8 = 1;

/// The result of one run together with any teardown warnings.
#[derive(Debug)]
pub struct Outcome {
    /// The agent's exit status, or why the run failed.
    pub result: Result<ExitStatus, PassError>,
    /// Processes that could not be stopped.
    pub warnings: Vec<TeardownWarning>,
}

impl Outcome {
    /// A run that failed before any child existed.
    #[must_use]
    pub const fn failed(error: PassError) -> Self {
        Self {
            result: Err(error),
            warnings: Vec::new(),
        }
    }

    /// The exit code this outcome maps to.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self.result {
            Ok(_) => EXIT_SUCCESS,
            Err(_) => EXIT_FAILURE,
        }
    }
}

/// Writes the user-facing diagnostics of an [`Outcome`].
#[derive(Debug)]
pub struct Reporter<W> {
    out: W,
}

impl Reporter<io::Stderr> {
    /// A reporter writing to standard error.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> Reporter<W> {
    /// Create a reporter writing to `out`.
    pub const fn new(out: W) -> Self {
        Self { out }
    }

    /// Print the diagnostics for `outcome` and return its exit code.
    ///
    /// Success prints nothing. A bad passphrase prints `bad passphrase`;
    /// any other failure prints one `error:` line. Teardown warnings are
    /// printed first, one line each, and never change the exit code.
    pub fn report(&mut self, outcome: &Outcome) -> u8 {
        for warning in &outcome.warnings {
            let _ = writeln!(self.out, "warning: {warning}");
        }

        match &outcome.result {
            Ok(status) => tracing::debug!(%status, "identity added"),
            Err(PassError::BadSecret) => {
                let _ = writeln!(self.out, "bad passphrase");
            }
            Err(err) => {
                if let Some(buffer) = err.buffer() {
                    tracing::debug!("captured output:\n{}", format_buffer_snippet(buffer));
                }
                let _ = writeln!(self.out, "error: {err}");
            }
        }
        let _ = self.out.flush();

        outcome.exit_code()
    }

    /// Consume the reporter and return its writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}
