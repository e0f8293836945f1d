//! Configuration for an agent run.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `SSH_ADD_WITH_PASS_*` environment variables, then command-line flags.

pub mod env;
pub mod file;

use std::collections::HashMap;
use std::time::Duration;

use pass_pty::PtyConfig;

use crate::error::{PassError, Result};
use crate::interaction::{DEFAULT_POLL_INTERVAL, DEFAULT_STALL_TIMEOUT};
use crate::markers::MarkerSet;
use crate::supervisor::DEFAULT_TERMINATE_GRACE;

pub use env::EnvConfig;
pub use file::{ExtraMarkers, FileConfig};

/// Default agent program.
pub const DEFAULT_PROGRAM: &str = "ssh-add";

/// Default terminal width.
pub const DEFAULT_TERMINAL_WIDTH: u16 = 80;

/// Default terminal height.
pub const DEFAULT_TERMINAL_HEIGHT: u16 = 24;

/// Configuration for one run of the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// The program to run.
    pub program: String,

    /// Arguments placed before the key path.
    pub args: Vec<String>,

    /// Output classification markers.
    pub markers: MarkerSet,

    /// Longest sleep between output checks.
    pub poll_interval: Duration,

    /// Give up after this long without output; `None` waits forever.
    pub stall_timeout: Option<Duration>,

    /// Wait after SIGTERM and again after SIGKILL.
    pub terminate_grace: Duration,

    /// Terminal dimensions (cols, rows).
    pub window_size: (u16, u16),

    /// Extra environment for the agent.
    pub env: HashMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let mut env = HashMap::new();
        // Keep ssh-add on the terminal even when DISPLAY and SSH_ASKPASS are set.
        env.insert("SSH_ASKPASS_REQUIRE".to_string(), "never".to_string());

        Self {
            program: DEFAULT_PROGRAM.to_string(),
            args: Vec::new(),
            markers: MarkerSet::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stall_timeout: Some(DEFAULT_STALL_TIMEOUT),
            terminate_grace: DEFAULT_TERMINATE_GRACE,
            window_size: (DEFAULT_TERMINAL_WIDTH, DEFAULT_TERMINAL_HEIGHT),
            env,
        }
    }
}

/// `0` disables the stall timeout.
fn stall_from_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl AgentConfig {
    /// Create a configuration running `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Set the arguments placed before the key path.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set an environment variable for the agent.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the stall timeout.
    #[must_use]
    pub const fn stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Set the termination grace period.
    #[must_use]
    pub const fn terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    /// Overlay values from a configuration file.
    #[must_use]
    pub fn apply_file(mut self, file: FileConfig) -> Self {
        if let Some(program) = file.program {
            self.program = program;
        }
        if let Some(args) = file.args {
            self.args = args;
        }
        if let Some(ms) = file.poll_interval_ms {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = file.stall_timeout_ms {
            self.stall_timeout = stall_from_millis(ms);
        }
        if let Some(ms) = file.terminate_grace_ms {
            self.terminate_grace = Duration::from_millis(ms);
        }
        if let Some(size) = file.window_size {
            self.window_size = size;
        }
        self.markers.extend(file.markers.into());
        self
    }

    /// Overlay values from `SSH_ADD_WITH_PASS_*` variables.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::Config`] if a numeric variable does not parse.
    pub fn apply_env(mut self, env: &EnvConfig) -> Result<Self> {
        if let Some(program) = env.get(env::vars::PROGRAM) {
            self.program = program.to_string();
        }
        if let Some(interval) = env.duration_millis(env::vars::POLL_INTERVAL_MS)? {
            self.poll_interval = interval;
        }
        if let Some(ms) = env.parse::<u64>(env::vars::STALL_TIMEOUT_MS)? {
            self.stall_timeout = stall_from_millis(ms);
        }
        if let Some(grace) = env.duration_millis(env::vars::TERMINATE_GRACE_MS)? {
            self.terminate_grace = grace;
        }
        Ok(self)
    }

    /// Check the configuration for values that cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(PassError::config("agent program is empty"));
        }
        if self.poll_interval.is_zero() {
            return Err(PassError::config("poll interval must be positive"));
        }
        if self.window_size.0 == 0 || self.window_size.1 == 0 {
            return Err(PassError::config("window size must be positive"));
        }
        self.markers.validate()
    }

    /// The terminal configuration for the agent.
    #[must_use]
    pub fn pty_config(&self) -> PtyConfig {
        let mut builder =
            PtyConfig::builder().window_size(self.window_size.0, self.window_size.1);
        for (key, value) in &self.env {
            builder = builder.env(key, value);
        }
        builder.build()
    }
}
