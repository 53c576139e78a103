//! Function slots a state can carry, and the error they report.

use super::data::DataBag;
use super::state::StateId;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a validator or hook to reject the current move.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    /// Error carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for HookError {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for HookError {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Business rule over the current data. Read-only.
pub type Validator = Arc<dyn Fn(&DataBag) -> Result<(), HookError> + Send + Sync>;

/// Enter or exit hook. Gets a read/write view of the bag for the duration of the call.
pub type Hook = Arc<dyn Fn(&mut DataBag) -> Result<(), HookError> + Send + Sync>;

/// Called with the key and new value after each data-bag write.
pub type DataChangeHook = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Computes the `next` target from the data, overriding the static table.
pub type NextStateFn = Arc<dyn Fn(&DataBag) -> Option<StateId> + Send + Sync>;
