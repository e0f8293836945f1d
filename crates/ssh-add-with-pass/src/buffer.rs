//! Accumulated agent output.
//!
//! The session's drain task is the only writer; it owns the single
//! [`OutputWriter`]. Readers hold cheap [`OutputBuffer`] clones and only
//! ever take snapshots, so polling never consumes anything.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    data: Vec<u8>,
    closed: bool,
}

/// Read handle to the output of a session.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

/// The unique append handle for an [`OutputBuffer`].
///
/// Dropping it marks the stream closed.
#[derive(Debug)]
pub struct OutputWriter {
    buffer: OutputBuffer,
}

/// A consistent view of the output at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Everything written so far, decoded lossily as UTF-8.
    pub text: String,
    /// Number of raw bytes received.
    pub len: usize,
    /// Whether the stream has reached end-of-file.
    pub closed: bool,
}

impl OutputBuffer {
    /// Create an empty buffer and its writer.
    #[must_use]
    pub fn pair() -> (Self, OutputWriter) {
        let buffer = Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            notify: Arc::new(Notify::new()),
        };
        let writer = OutputWriter {
            buffer: buffer.clone(),
        };
        (buffer, writer)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a snapshot of everything received so far.
    ///
    /// The text and the closed flag are read under one lock, so a snapshot
    /// that reports `closed` already contains every byte ever written.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            text: String::from_utf8_lossy(&inner.data).into_owned(),
            len: inner.data.len(),
            closed: inner.closed,
        }
    }

    /// Whether the stream has reached end-of-file.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Wait until new output arrives, the stream closes, or `timeout` passes.
    ///
    /// Returns `true` if woken by a change.
    pub async fn wait_for_change(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.notify.notified())
            .await
            .is_ok()
    }
}

impl OutputWriter {
    /// Append raw bytes.
    pub fn append(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        {
            let mut inner = self.buffer.lock();
            if inner.closed {
                return;
            }
            inner.data.extend_from_slice(bytes);
        }
        self.buffer.notify.notify_one();
    }

    /// Mark the stream closed. Idempotent.
    pub fn close(&mut self) {
        {
            let mut inner = self.buffer.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
        }
        self.buffer.notify.notify_one();
    }
}

impl Drop for OutputWriter {
    fn drop(&mut self) {
        self.close();
    }
}
