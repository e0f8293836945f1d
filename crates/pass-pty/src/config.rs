//! Configuration types for PTY creation and management.
//!
//! This module provides [`PtyConfig`] for configuring PTY creation and
//! [`PtySignal`] for the signals a supervisor sends to its child.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;

/// Configuration for creating a new PTY session.
///
/// # Example
///
/// ```
/// use pass_pty::PtyConfig;
///
/// let config = PtyConfig::builder()
///     .working_directory("/tmp")
///     .env("SSH_ASKPASS_REQUIRE", "never")
///     .window_size(80, 24)
///     .build();
/// assert_eq!(config.window_size, (80, 24));
/// ```
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Working directory for the child process.
    pub working_directory: Option<PathBuf>,

    /// Environment variables to set for the child process.
    /// If None, inherits from the parent process.
    pub env: Option<HashMap<OsString, OsString>>,

    /// Additional environment variables to add (merged with inherited).
    pub env_add: HashMap<OsString, OsString>,

    /// Environment variables to remove from inherited environment.
    pub env_remove: Vec<OsString>,

    /// Initial window size (columns, rows).
    pub window_size: (u16, u16),

    /// Whether to start the child in a new session (`setsid`).
    pub new_session: bool,

    /// Whether the PTY becomes the child's controlling terminal.
    ///
    /// Only honoured together with `new_session`.
    pub controlling_terminal: bool,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            working_directory: None,
            env: None,
            env_add: HashMap::new(),
            env_remove: Vec::new(),
            window_size: (80, 24),
            new_session: true,
            controlling_terminal: true,
        }
    }
}

impl PtyConfig {
    /// Create a new builder for `PtyConfig`.
    #[must_use]
    pub fn builder() -> PtyConfigBuilder {
        PtyConfigBuilder::new()
    }

    /// Get the effective environment for the child process.
    ///
    /// This merges the base environment (inherited or explicit), adds
    /// variables from `env_add`, and removes variables from `env_remove`.
    #[must_use]
    pub fn effective_env(&self) -> HashMap<OsString, OsString> {
        let mut env = self
            .env
            .clone()
            .unwrap_or_else(|| std::env::vars_os().collect());

        env.extend(self.env_add.clone());

        for key in &self.env_remove {
            env.remove(key);
        }

        env
    }
}

/// Builder for [`PtyConfig`].
#[derive(Debug, Clone, Default)]
pub struct PtyConfigBuilder {
    config: PtyConfig,
}

impl PtyConfigBuilder {
    /// Create a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory for the child process.
    #[must_use]
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.working_directory = Some(path.into());
        self
    }

    /// Start from an empty environment instead of inheriting.
    #[must_use]
    pub fn env_clear(mut self) -> Self {
        self.config.env = Some(HashMap::new());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.config.env_add.insert(key.into(), value.into());
        self
    }

    /// Remove an inherited environment variable.
    #[must_use]
    pub fn env_remove(mut self, key: impl Into<OsString>) -> Self {
        self.config.env_remove.push(key.into());
        self
    }

    /// Set the initial window size.
    #[must_use]
    pub const fn window_size(mut self, cols: u16, rows: u16) -> Self {
        self.config.window_size = (cols, rows);
        self
    }

    /// Set whether to create a new session.
    #[must_use]
    pub const fn new_session(mut self, value: bool) -> Self {
        self.config.new_session = value;
        self
    }

    /// Set whether to use a controlling terminal.
    #[must_use]
    pub const fn controlling_terminal(mut self, value: bool) -> Self {
        self.config.controlling_terminal = value;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> PtyConfig {
        self.config
    }
}

/// Signals a supervisor may deliver to its child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PtySignal {
    /// Polite termination request (SIGTERM).
    Terminate,
    /// Forced termination, cannot be caught (SIGKILL).
    Kill,
}

impl PtySignal {
    /// Get the Unix signal number.
    #[must_use]
    pub const fn as_unix_signal(self) -> i32 {
        match self {
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
        }
    }
}

/// Window size for the PTY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    /// Number of columns (characters per line).
    pub cols: u16,
    /// Number of rows (lines).
    pub rows: u16,
}

impl WindowSize {
    /// Create a new window size with the given dimensions.
    #[must_use]
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

impl From<(u16, u16)> for WindowSize {
    fn from((cols, rows): (u16, u16)) -> Self {
        Self::new(cols, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = PtyConfig::builder()
            .working_directory("/tmp")
            .env("FOO", "bar")
            .window_size(120, 40)
            .build();

        assert_eq!(config.working_directory, Some(PathBuf::from("/tmp")));
        assert_eq!(config.window_size, (120, 40));
        assert!(config.env_add.contains_key(&OsString::from("FOO")));
    }

    #[test]
    fn effective_env_merges_and_removes() {
        let config = PtyConfig::builder()
            .env_clear()
            .env("KEEP", "1")
            .env("DROP", "2")
            .env_remove("DROP")
            .build();

        let env = config.effective_env();
        assert_eq!(env.get(&OsString::from("KEEP")), Some(&OsString::from("1")));
        assert!(!env.contains_key(&OsString::from("DROP")));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn default_starts_new_session_with_controlling_terminal() {
        let config = PtyConfig::default();
        assert!(config.new_session);
        assert!(config.controlling_terminal);
    }

    #[test]
    fn signal_numbers() {
        assert_eq!(PtySignal::Terminate.as_unix_signal(), libc::SIGTERM);
        assert_eq!(PtySignal::Kill.as_unix_signal(), libc::SIGKILL);
    }

    #[test]
    fn window_size_default() {
        let size = WindowSize::default();
        assert_eq!(size.cols, 80);
        assert_eq!(size.rows, 24);
        assert_eq!(WindowSize::from((100, 30)), WindowSize::new(100, 30));
    }
}
