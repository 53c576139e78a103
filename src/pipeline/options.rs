//! Engine options.

use crate::core::DEFAULT_MAX_HISTORY;
use serde::{Deserialize, Serialize};

/// Flags and limits an engine is constructed with.
///
/// Every field has a default, so a partial document deserializes:
///
/// ```rust
/// use wizflow::pipeline::EngineOptions;
///
/// let options: EngineOptions = serde_json::from_str(r#"{ "dry_run": true }"#).unwrap();
/// assert!(options.dry_run);
/// assert!(options.strict);
/// assert_eq!(options.max_history, 50);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Honor validation functions during live execution.
    pub strict: bool,
    /// Skip every validator and callback and log each attempted operation instead.
    pub dry_run: bool,
    /// Maximum history entries kept; the oldest are dropped first. Clamped to at least 1.
    pub max_history: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            strict: true,
            dry_run: false,
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

impl EngineOptions {
    /// Defaults with dry-run enabled.
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    /// Defaults with validators bypassed.
    pub fn permissive() -> Self {
        Self {
            strict: false,
            ..Self::default()
        }
    }

    /// Set the history bound.
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }
}
