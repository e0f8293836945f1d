//! The pseudo-terminal session the agent runs on.
//!
//! A [`PtySession`] owns the controller side of one terminal pair. A drain
//! task continuously copies everything the agent writes into an
//! [`OutputBuffer`], so the agent never blocks on a full terminal and the
//! interaction loop can poll without consuming output.

use std::io;
use std::os::unix::io::OwnedFd;
use std::time::Duration;

use pass_pty::{PtyConfig, PtyReader, PtyWriter, UnixPtyMaster, UnixPtySystem};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;

use crate::buffer::{OutputBuffer, OutputWriter, Snapshot};
use crate::error::{PassError, Result};
use crate::interaction::LineSink;

/// Upper bound on a single `send_line`.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

const READ_CHUNK: usize = 4096;

/// A live pseudo-terminal session.
///
/// Must be opened inside a tokio runtime.
#[derive(Debug)]
pub struct PtySession {
    master: UnixPtyMaster,
    writer: Option<PtyWriter>,
    child_side: Option<OwnedFd>,
    output: OutputBuffer,
    drain: Option<JoinHandle<()>>,
    closed: bool,
}

impl PtySession {
    /// Allocate a terminal pair and start draining its output.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::SessionCreate`] if the pair cannot be allocated.
    pub fn open(config: &PtyConfig) -> Result<Self> {
        let (master, child_side) =
            UnixPtySystem::open_pair(config).map_err(PassError::SessionCreate)?;
        let (reader, writer) = master.split();
        let (output, sink) = OutputBuffer::pair();
        let drain = tokio::spawn(drain(reader, sink));

        tracing::debug!(fd = ?child_side, "session opened");
        Ok(Self {
            master,
            writer: Some(writer),
            child_side: Some(child_side),
            output,
            drain: Some(drain),
            closed: false,
        })
    }

    /// The terminal endpoint a child should be attached to.
    ///
    /// `None` once released or closed.
    #[must_use]
    pub const fn child_side(&self) -> Option<&OwnedFd> {
        self.child_side.as_ref()
    }

    /// Close this process's copy of the child endpoint.
    ///
    /// Called once the child holds its own copies, so that end-of-file is
    /// observed when the child exits.
    pub fn release_child_side(&mut self) {
        self.child_side = None;
    }

    /// A read handle to the accumulated output.
    #[must_use]
    pub const fn output(&self) -> &OutputBuffer {
        &self.output
    }

    /// Snapshot everything received so far.
    #[must_use]
    pub fn snapshot_output(&self) -> Snapshot {
        self.output.snapshot()
    }

    /// Write `text` followed by a newline to the agent's terminal.
    ///
    /// The text and the newline are written separately so the secret is
    /// never copied into a longer buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::Write`] if the session is closed, the write
    /// fails, or it does not finish within [`WRITE_TIMEOUT`].
    pub async fn send_line(&mut self, text: &str) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            PassError::Write(io::Error::new(io::ErrorKind::BrokenPipe, "session closed"))
        })?;

        let write = async {
            writer.write_all(text.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };

        match tokio::time::timeout(WRITE_TIMEOUT, write).await {
            Ok(result) => result.map_err(PassError::Write),
            Err(_) => Err(PassError::Write(io::Error::new(
                io::ErrorKind::TimedOut,
                "terminal did not accept input",
            ))),
        }
    }

    /// Whether [`close`](Self::close) has run.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop the drain task and release both terminal endpoints. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
        self.writer = None;
        self.child_side = None;
        self.master.close();
        tracing::debug!("session closed");
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.close();
    }
}

impl LineSink for PtySession {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        Self::send_line(self, line).await
    }
}

async fn drain(mut reader: PtyReader, mut sink: OutputWriter) {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => sink.append(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::debug!(error = %e, "terminal read failed");
                break;
            }
        }
    }
    sink.close();
    tracing::trace!("drain finished");
}
