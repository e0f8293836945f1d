//! Interrupt signal handling.
//!
//! A supervisor that owns a child process must not die on Ctrl+C without
//! reaping it. [`interrupt_signals`] turns SIGINT, SIGTERM and SIGHUP into an
//! async stream so the caller can cancel its work and run teardown instead.

use std::io;

use futures::StreamExt;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook_tokio::{Handle, Signals};

/// Signals treated as a request to stop.
pub const INTERRUPT_SIGNALS: [i32; 3] = [SIGINT, SIGTERM, SIGHUP];

/// An async source of interrupt signals.
///
/// Registration is undone when the value is dropped.
pub struct InterruptSignals {
    signals: Signals,
    handle: Handle,
}

impl std::fmt::Debug for InterruptSignals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptSignals")
            .field("closed", &self.handle.is_closed())
            .finish()
    }
}

impl InterruptSignals {
    /// Wait for the next interrupt signal.
    ///
    /// Returns `None` once the stream has been closed.
    pub async fn recv(&mut self) -> Option<i32> {
        let signal = self.signals.next().await?;
        tracing::debug!(signal = signal_name(signal), "interrupt received");
        Some(signal)
    }

    /// Stop listening for signals.
    pub fn close(&self) {
        self.handle.close();
    }
}

impl Drop for InterruptSignals {
    fn drop(&mut self) {
        self.close();
    }
}

/// Start listening for SIGINT, SIGTERM and SIGHUP.
///
/// # Errors
///
/// Returns an error if signal registration fails.
pub fn interrupt_signals() -> io::Result<InterruptSignals> {
    let signals = Signals::new(INTERRUPT_SIGNALS)?;
    let handle = signals.handle();
    Ok(InterruptSignals { signals, handle })
}

/// Human-readable name of an interrupt signal.
#[must_use]
pub const fn signal_name(signal: i32) -> &'static str {
    match signal {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        SIGHUP => "SIGHUP",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_names() {
        assert_eq!(signal_name(SIGINT), "SIGINT");
        assert_eq!(signal_name(SIGTERM), "SIGTERM");
        assert_eq!(signal_name(SIGHUP), "SIGHUP");
        assert_eq!(signal_name(0), "unknown");
    }

    #[tokio::test]
    async fn closed_stream_ends() {
        let mut signals = interrupt_signals().unwrap();
        signals.close();
        assert_eq!(signals.recv().await, None);
    }
}
