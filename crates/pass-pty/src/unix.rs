//! Unix platform implementation for PTY operations.
//!
//! This module provides:
//!
//! - PTY pair allocation via openpt/grantpt/unlockpt
//! - Async controller I/O through tokio's `AsyncFd`
//! - Child process spawning with session and controlling terminal setup
//! - Interrupt signal streams for cancellation
//!
//! # Example
//!
//! ```ignore
//! use pass_pty::{PtyConfig, UnixPtySystem};
//!
//! let config = PtyConfig::default();
//! let (master, child) = UnixPtySystem::spawn("ssh-add", ["/home/me/.ssh/id_ed25519"], &config)?;
//! ```

mod child;
mod pty;
mod signals;

use std::ffi::OsStr;
use std::os::unix::io::OwnedFd;

pub use child::{UnixPtyChild, spawn_child};
pub use pty::{PtyReader, PtyWriter, UnixPtyMaster, open_slave};
pub use signals::{INTERRUPT_SIGNALS, InterruptSignals, interrupt_signals, signal_name};

use crate::config::PtyConfig;
use crate::error::Result;

/// Unix PTY system implementation.
///
/// Factory methods for allocating PTY pairs and spawning into them.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixPtySystem;

impl UnixPtySystem {
    /// Allocate a PTY pair sized according to `config`.
    ///
    /// Returns the controller and an open descriptor for the child side.
    pub fn open_pair(config: &PtyConfig) -> Result<(UnixPtyMaster, OwnedFd)> {
        let (master, slave_path) = UnixPtyMaster::open()?;
        master.set_window_size(config.window_size.into())?;
        let slave_fd = open_slave(&slave_path)?;
        tracing::trace!(slave = %slave_path, "allocated PTY pair");
        Ok((master, slave_fd))
    }

    /// Allocate a PTY pair and spawn `program` onto its child side.
    ///
    /// The parent's copy of the child side is closed before returning, so
    /// the controller sees end-of-stream once the child exits.
    pub fn spawn<S, I>(program: S, args: I, config: &PtyConfig) -> Result<(UnixPtyMaster, UnixPtyChild)>
    where
        S: AsRef<OsStr>,
        I: IntoIterator,
        I::Item: AsRef<OsStr>,
    {
        let (master, slave_fd) = Self::open_pair(config)?;
        let child = spawn_child(&slave_fd, program, args, config)?;
        Ok((master, child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn spawn_echo_reaches_eof() {
        let config = PtyConfig::default();
        let Ok((master, mut child)) = UnixPtySystem::spawn("echo", ["hello"], &config) else {
            return;
        };

        let (mut reader, _writer) = master.split();
        let mut output = Vec::new();
        reader.read_to_end(&mut output).await.unwrap();
        assert!(String::from_utf8_lossy(&output).contains("hello"));

        let status = child.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn open_pair_applies_window_size() {
        let config = PtyConfig::builder().window_size(132, 50).build();
        let Ok((master, _slave)) = UnixPtySystem::open_pair(&config) else {
            return;
        };
        let size = master.window_size().unwrap();
        assert_eq!((size.cols, size.rows), (132, 50));
    }
}
