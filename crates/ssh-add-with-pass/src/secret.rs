//! The passphrase handed to the agent.
//!
//! The value lives in a [`SecretString`], which zeroes its memory on drop
//! and never shows up in `Debug` output. It is exposed exactly once, when
//! the interaction loop writes it to the terminal.

use std::fmt;
use std::io::{self, BufRead};

use secrecy::{ExposeSecret, SecretString};

use crate::error::{PassError, Result};

/// Replacement text for the secret in captured output.
pub const REDACTED: &str = "[REDACTED]";

/// An opaque passphrase.
pub struct Secret(SecretString);

impl Secret {
    /// Wrap a passphrase.
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Borrow the plain value. Only the input path may call this.
    pub(crate) fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Whether the passphrase is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }

    /// Mask every occurrence of the secret in `text`.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        let value = self.expose();
        if value.is_empty() {
            text.to_string()
        } else {
            text.replace(value, REDACTED)
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// Read one newline-terminated secret from `reader`.
///
/// The trailing `\n` (or `\r\n`) is stripped; the newline is added back
/// when the secret is sent. A missing final newline is accepted.
///
/// # Errors
///
/// Returns [`PassError::SecretInput`] on I/O failure or if the input ends
/// before any byte was read.
pub fn read_secret<R: BufRead>(mut reader: R) -> Result<Secret> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).map_err(PassError::SecretInput)?;
    if n == 0 {
        return Err(PassError::SecretInput(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "standard input closed before a passphrase was read",
        )));
    }

    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }

    Ok(Secret(SecretString::from(line)))
}
