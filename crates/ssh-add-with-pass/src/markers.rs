//! Substrings that classify the agent's output.
//!
//! Matching is plain, case-sensitive substring search over captured
//! output. Each class accepts several alternatives so that prompt
//! wording differences between `ssh-add` releases are tolerated.

use crate::error::{PassError, Result};

/// The primary prompt written by `ssh-add` before reading a passphrase.
pub const PROMPT_MARKER: &str = "Enter passphrase for";

/// Written by `ssh-add` once the key is loaded into the agent.
pub const SUCCESS_MARKER: &str = "Identity added";

/// Written by `ssh-add` when the passphrase does not decrypt the key.
pub const FAILURE_MARKER: &str = "Bad passphrase";

/// The class of a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// The agent is waiting for the secret.
    Prompt,
    /// The agent accepted the secret.
    Success,
    /// The agent rejected the secret.
    Failure,
}

/// A marker located in captured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerMatch<'a> {
    /// Which class matched.
    pub kind: MarkerKind,
    /// Byte offset of the first occurrence.
    pub position: usize,
    /// The alternative that matched.
    pub marker: &'a str,
}

/// The three marker lists used by the interaction loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSet {
    /// Prompt alternatives.
    pub prompt: Vec<String>,
    /// Success alternatives.
    pub success: Vec<String>,
    /// Failure alternatives.
    pub failure: Vec<String>,
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self {
            prompt: vec![
                PROMPT_MARKER.to_string(),
                "Enter PIN for".to_string(),
            ],
            success: vec![SUCCESS_MARKER.to_string()],
            failure: vec![
                FAILURE_MARKER.to_string(),
                "incorrect passphrase supplied".to_string(),
            ],
        }
    }
}

impl MarkerSet {
    /// The alternatives for one class.
    #[must_use]
    pub fn alternatives(&self, kind: MarkerKind) -> &[String] {
        match kind {
            MarkerKind::Prompt => &self.prompt,
            MarkerKind::Success => &self.success,
            MarkerKind::Failure => &self.failure,
        }
    }

    /// Find the earliest occurrence of any alternative of `kind` in `text`.
    #[must_use]
    pub fn find<'a>(&'a self, kind: MarkerKind, text: &str) -> Option<MarkerMatch<'a>> {
        self.alternatives(kind)
            .iter()
            .filter_map(|marker| {
                text.find(marker.as_str()).map(|position| MarkerMatch {
                    kind,
                    position,
                    marker: marker.as_str(),
                })
            })
            .min_by_key(|m| m.position)
    }

    /// Find whichever of success or failure occurs first in `text`.
    ///
    /// Ties cannot happen between distinct non-overlapping markers; if both
    /// start at the same offset, failure wins.
    #[must_use]
    pub fn find_verdict<'a>(&'a self, text: &str) -> Option<MarkerMatch<'a>> {
        let success = self.find(MarkerKind::Success, text);
        let failure = self.find(MarkerKind::Failure, text);
        match (success, failure) {
            (Some(s), Some(f)) if s.position < f.position => Some(s),
            (_, Some(f)) => Some(f),
            (s, None) => s,
        }
    }

    /// Append the alternatives of `other`, skipping duplicates.
    pub fn extend(&mut self, other: Self) {
        fn merge(into: &mut Vec<String>, from: Vec<String>) {
            for marker in from {
                if !into.contains(&marker) {
                    into.push(marker);
                }
            }
        }

        merge(&mut self.prompt, other.prompt);
        merge(&mut self.success, other.success);
        merge(&mut self.failure, other.failure);
    }

    /// Check that every class has at least one non-empty alternative.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::Config`] for an empty class or an empty marker,
    /// which would match any output.
    pub fn validate(&self) -> Result<()> {
        for (name, list) in [
            ("prompt", &self.prompt),
            ("success", &self.success),
            ("failure", &self.failure),
        ] {
            if list.is_empty() {
                return Err(PassError::config(format!("no {name} markers configured")));
            }
            if list.iter().any(String::is_empty) {
                return Err(PassError::config(format!("empty {name} marker")));
            }
        }
        Ok(())
    }
}
