//! pass-pty: Unix pseudo-terminal plumbing
//!
//! This crate allocates pseudo-terminals, spawns programs that believe they
//! are talking to an interactive user, and exposes the controller side as
//! tokio `AsyncRead`/`AsyncWrite` halves.
//!
//! # Quick Start
//!
//! ```ignore
//! use pass_pty::{PtyConfig, UnixPtySystem};
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! let (master, mut child) = UnixPtySystem::spawn("ssh-add", ["key"], &PtyConfig::default())?;
//! let (mut reader, mut writer) = master.split();
//!
//! let mut buf = [0u8; 1024];
//! let n = reader.read(&mut buf).await?;
//! writer.write_all(b"passphrase\n").await?;
//!
//! child.wait().await?;
//! ```
//!
//! # Platform Support
//!
//! Unix only (Linux, macOS, BSDs). PTY calls go through `rustix`.

#![cfg(unix)]

pub mod config;
pub mod error;
pub mod status;
pub mod unix;

pub use config::{PtyConfig, PtyConfigBuilder, PtySignal, WindowSize};
pub use error::{PtyError, Result};
pub use status::ExitStatus;
pub use unix::{
    InterruptSignals, PtyReader, PtyWriter, UnixPtyChild, UnixPtyMaster, UnixPtySystem,
    interrupt_signals, spawn_child,
};
