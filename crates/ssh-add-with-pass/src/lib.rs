//! ssh-add-with-pass: feed a passphrase to `ssh-add` without a human at the
//! keyboard.
//!
//! `ssh-add` insists on reading passphrases from a terminal. This crate runs
//! it on a pseudo-terminal, waits for the passphrase prompt, answers it once,
//! and classifies the reply as accepted, rejected, or neither.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::future::pending;
//! use std::path::Path;
//!
//! use ssh_add_with_pass::{AgentConfig, Reporter, Secret, add_identity};
//!
//! let config = AgentConfig::default();
//! let secret = Secret::new("correct horse battery staple");
//! let outcome = add_identity(&config, Path::new("/home/me/.ssh/id_ed25519"), &secret, pending()).await;
//! let code = Reporter::stderr().report(&outcome);
//! ```
//!
//! # Modules
//!
//! - [`session`]: the pseudo-terminal and its output drain
//! - [`supervisor`]: starting and stopping the agent process
//! - [`interaction`]: the prompt/response state machine
//! - [`reporter`]: exit codes and the single diagnostic line

#![cfg(unix)]

pub mod agent;
pub mod buffer;
pub mod config;
pub mod error;
pub mod interaction;
pub mod markers;
pub mod reporter;
pub mod secret;
pub mod session;
pub mod supervisor;

pub use agent::add_identity;
pub use buffer::{OutputBuffer, OutputWriter, Snapshot};
pub use config::{AgentConfig, EnvConfig, FileConfig};
pub use error::{NoSignalReason, PassError, Result, TeardownWarning};
pub use interaction::{InteractionLoop, LineSink, LoopState};
pub use markers::{MarkerKind, MarkerSet};
pub use reporter::{EXIT_FAILURE, EXIT_SUCCESS, Outcome, Reporter};
pub use secret::{Secret, read_secret};
pub use session::PtySession;
pub use supervisor::{ChildProcess, Supervisor};
