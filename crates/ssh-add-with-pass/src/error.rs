//! Error types for ssh-add-with-pass.
//!
//! [`PassError`] is the single fatal-error type of the crate. Every variant
//! renders as one line, because the reporter prints exactly one diagnostic
//! per failed run. Captured agent output travels with the errors that need
//! it and is rendered separately by [`format_buffer_snippet`].
//!
//! [`TeardownWarning`] is deliberately not an error: a child that refuses to
//! die is reported, but never changes an exit code that was already decided.

use std::fmt;
use std::io;
use std::time::Duration;

use pass_pty::{ExitStatus, PtyError};
use thiserror::Error;

/// Maximum length of buffer content to display.
const MAX_BUFFER_DISPLAY: usize = 500;

/// Lines kept from the tail of a large buffer.
const CONTEXT_LINES: usize = 6;

/// Format captured output for display, truncating if necessary.
#[must_use]
pub fn format_buffer_snippet(buffer: &str) -> String {
    if buffer.is_empty() {
        return "(empty buffer)".to_string();
    }

    let lines: Vec<&str> = buffer.lines().collect();

    if buffer.len() <= MAX_BUFFER_DISPLAY || lines.len() <= CONTEXT_LINES {
        return format!(
            "┌─ buffer ({} bytes) ──────────────────────\n│ {}\n└────────────────────────────────────────",
            buffer.len(),
            lines.join("\n│ ")
        );
    }

    let tail = &lines[lines.len() - CONTEXT_LINES..];
    format!(
        "┌─ buffer ({} bytes, {} lines) ─────────────\n│ ... ({} lines hidden)\n│ {}\n└────────────────────────────────────────",
        buffer.len(),
        lines.len(),
        lines.len() - tail.len(),
        tail.join("\n│ ")
    )
}

/// Why the interaction loop gave up without a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoSignalReason {
    /// The agent's output stream reached end-of-file.
    StreamClosed,
    /// No new output arrived for the given duration.
    Stalled(Duration),
}

impl fmt::Display for NoSignalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StreamClosed => f.write_str("agent output ended"),
            Self::Stalled(d) => write!(f, "agent produced no output for {d:?}"),
        }
    }
}

/// The main error type for ssh-add-with-pass.
#[derive(Debug, Error)]
pub enum PassError {
    /// Pseudo-terminal allocation failed.
    #[error("failed to allocate a pseudo-terminal: {0}")]
    SessionCreate(#[source] PtyError),

    /// The agent executable could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// The program that was being started.
        program: String,
        /// The underlying PTY error.
        #[source]
        source: PtyError,
    },

    /// Writing to the agent's terminal failed.
    #[error("failed to send input to the agent: {0}")]
    Write(#[source] io::Error),

    /// The agent rejected the secret.
    #[error("bad passphrase")]
    BadSecret,

    /// The agent's output never reached a success or failure marker.
    #[error("{reason} before a success or failure message appeared")]
    NoTerminalSignal {
        /// Why polling stopped.
        reason: NoSignalReason,
        /// Redacted output captured so far.
        buffer: String,
    },

    /// The run was interrupted.
    #[error("interrupted")]
    Cancelled,

    /// The agent reported success but then exited unsuccessfully.
    #[error("agent {0} after adding the identity")]
    AgentExit(ExitStatus),

    /// Waiting for the agent to exit failed.
    #[error("failed to wait for the agent: {0}")]
    Wait(#[source] PtyError),

    /// The secret could not be read from standard input.
    #[error("failed to read the passphrase: {0}")]
    SecretInput(#[source] io::Error),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

/// Result type alias for ssh-add-with-pass operations.
pub type Result<T> = std::result::Result<T, PassError>;

impl PassError {
    /// Create a stream-closed error carrying the captured output.
    pub fn stream_closed(buffer: impl Into<String>) -> Self {
        Self::NoTerminalSignal {
            reason: NoSignalReason::StreamClosed,
            buffer: buffer.into(),
        }
    }

    /// Create a stalled-output error carrying the captured output.
    pub fn stalled(after: Duration, buffer: impl Into<String>) -> Self {
        Self::NoTerminalSignal {
            reason: NoSignalReason::Stalled(after),
            buffer: buffer.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this is the bad-secret verdict.
    #[must_use]
    pub const fn is_bad_secret(&self) -> bool {
        matches!(self, Self::BadSecret)
    }

    /// Check if the loop ended without any verdict.
    #[must_use]
    pub const fn is_no_terminal_signal(&self) -> bool {
        matches!(self, Self::NoTerminalSignal { .. })
    }

    /// Get the captured output if this error carries it.
    #[must_use]
    pub fn buffer(&self) -> Option<&str> {
        match self {
            Self::NoTerminalSignal { buffer, .. } => Some(buffer),
            _ => None,
        }
    }
}

/// A child process that could not be stopped during teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownWarning {
    /// The program that was running.
    pub program: String,
    /// Its process ID.
    pub pid: u32,
    /// What went wrong.
    pub reason: String,
}

impl TeardownWarning {
    /// Create a new teardown warning.
    pub fn new(program: impl Into<String>, pid: u32, reason: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            pid,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TeardownWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (pid {}) not killed: {}",
            self.program, self.pid, self.reason
        )
    }
}
