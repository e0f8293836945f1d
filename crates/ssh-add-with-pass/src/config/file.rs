//! File-based configuration loading.
//!
//! ```toml
//! program = "/usr/bin/ssh-add"
//! args = ["-t", "3600"]
//! poll_interval_ms = 10
//! stall_timeout_ms = 30000
//! terminate_grace_ms = 2000
//! window_size = [80, 24]
//!
//! [markers]
//! success = ["Certificate added"]
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{PassError, Result};
use crate::markers::MarkerSet;

/// Contents of a TOML configuration file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Agent program.
    pub program: Option<String>,
    /// Arguments placed before the key path.
    pub args: Option<Vec<String>>,
    /// Poll interval in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Stall timeout in milliseconds; `0` disables it.
    pub stall_timeout_ms: Option<u64>,
    /// Termination grace period in milliseconds.
    pub terminate_grace_ms: Option<u64>,
    /// Terminal size as `[cols, rows]`.
    pub window_size: Option<(u16, u16)>,
    /// Markers appended to the built-in sets.
    pub markers: ExtraMarkers,
}

/// Additional marker alternatives from a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtraMarkers {
    /// Extra prompt alternatives.
    pub prompt: Vec<String>,
    /// Extra success alternatives.
    pub success: Vec<String>,
    /// Extra failure alternatives.
    pub failure: Vec<String>,
}

impl From<ExtraMarkers> for MarkerSet {
    fn from(extra: ExtraMarkers) -> Self {
        Self {
            prompt: extra.prompt,
            success: extra.success,
            failure: extra.failure,
        }
    }
}

impl FileConfig {
    /// Parse TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::Config`] on syntax errors or unknown keys.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PassError::config(e.message().to_string()))
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PassError::config(format!("{}: {e}", path.display())))?;
        Self::parse(&text).map_err(|e| match e {
            PassError::Config { message } => {
                PassError::config(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(FileConfig::parse("").unwrap(), FileConfig::default());
    }

    #[test]
    fn parses_all_fields() {
        let config = FileConfig::parse(
            r#"
            program = "/opt/ssh/bin/ssh-add"
            args = ["-t", "3600"]
            poll_interval_ms = 5
            stall_timeout_ms = 0
            terminate_grace_ms = 500
            window_size = [132, 40]

            [markers]
            success = ["Certificate added"]
            "#,
        )
        .unwrap();

        assert_eq!(config.program.as_deref(), Some("/opt/ssh/bin/ssh-add"));
        assert_eq!(config.args, Some(vec!["-t".to_string(), "3600".to_string()]));
        assert_eq!(config.poll_interval_ms, Some(5));
        assert_eq!(config.stall_timeout_ms, Some(0));
        assert_eq!(config.terminate_grace_ms, Some(500));
        assert_eq!(config.window_size, Some((132, 40)));

        let markers = config.markers;
        assert_eq!(markers.success, vec!["Certificate added".to_string()]);
        assert!(markers.prompt.is_empty());
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = FileConfig::parse("timeout = 3").unwrap_err();
        assert!(matches!(err, PassError::Config { .. }));
    }

    #[test]
    fn missing_file_names_path() {
        let err = FileConfig::load(Path::new("/nonexistent/ssh-add-with-pass.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ssh-add-with-pass.toml"));
    }
}
