//! Environment-based configuration.

use std::collections::HashMap;
use std::ffi::OsString;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PassError, Result};

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "SSH_ADD_WITH_PASS";

/// Environment variable reader.
///
/// Values are captured once at construction, so a reader is a stable
/// snapshot even if the process environment changes later.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Prefix for environment variables.
    prefix: String,
    /// Captured values, keyed by full variable name.
    vars: HashMap<String, String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Create a reader over the current process environment.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::from_vars_os(prefix, std::env::vars_os())
    }

    /// Create a reader over raw OS variables.
    ///
    /// Pairs whose name or value is not valid UTF-8 are skipped; none of
    /// the variables this crate reads can hold such values.
    #[must_use]
    pub fn from_vars_os<I>(prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        Self::from_vars(
            prefix,
            vars.into_iter().filter_map(|(k, v)| match (k.into_string(), v.into_string()) {
                (Ok(k), Ok(v)) => Some((k, v)),
                (Err(k), _) => {
                    tracing::trace!(name = ?k, "skipping non-UTF-8 environment variable");
                    None
                }
                (Ok(k), Err(_)) => {
                    tracing::trace!(name = %k, "skipping non-UTF-8 environment value");
                    None
                }
            }),
        )
    }

    /// Create a reader over an explicit set of variables.
    #[must_use]
    pub fn from_vars<I, K, V>(prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Build the full environment variable name.
    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(&self.var_name(name)).map(String::as_str)
    }

    /// Get a parsed value.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::Config`] naming the variable if it is set but
    /// does not parse.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.get(name)
            .map(|raw| {
                raw.trim().parse().map_err(|_| {
                    PassError::config(format!("invalid value {raw:?} for {}", self.var_name(name)))
                })
            })
            .transpose()
    }

    /// Get a duration in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::Config`] if the value is not an integer.
    pub fn duration_millis(&self, name: &str) -> Result<Option<Duration>> {
        Ok(self.parse::<u64>(name)?.map(Duration::from_millis))
    }

    /// Check if a variable is set.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Variable names read by [`AgentConfig::apply_env`](super::AgentConfig::apply_env).
pub mod vars {
    /// Agent program.
    pub const PROGRAM: &str = "PROGRAM";
    /// Poll interval in milliseconds.
    pub const POLL_INTERVAL_MS: &str = "POLL_INTERVAL_MS";
    /// Stall timeout in milliseconds; `0` disables it.
    pub const STALL_TIMEOUT_MS: &str = "STALL_TIMEOUT_MS";
    /// Termination grace period in milliseconds.
    pub const TERMINATE_GRACE_MS: &str = "TERMINATE_GRACE_MS";
}
