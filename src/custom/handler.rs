//! Extension point for states contributed from outside the flow.

use crate::core::{DataBag, HookError, StateConfig, StateId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a custom state is spliced: between `after` and `before`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InsertionPoint {
    pub after: StateId,
    pub before: StateId,
}

impl InsertionPoint {
    /// Insertion point between `after` and `before`.
    pub fn between(after: impl Into<StateId>, before: impl Into<StateId>) -> Self {
        Self {
            after: after.into(),
            before: before.into(),
        }
    }
}

impl fmt::Display for InsertionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.after, self.before)
    }
}

/// A state contributed by code outside the flow definition.
///
/// `enter`, `leave`, and `validate` receive the shared data bag overlaid
/// with the handler's own persisted values. Anything `enter` or `leave`
/// writes lands in the handler's own storage, never in the shared keys.
///
/// # Example
///
/// ```rust
/// use wizflow::core::{DataBag, HookError, StateId};
/// use wizflow::custom::{CustomStateHandler, InsertionPoint};
///
/// struct Telemetry;
///
/// impl CustomStateHandler for Telemetry {
///     fn state_id(&self) -> StateId {
///         "telemetry".into()
///     }
///
///     fn insertion_point(&self) -> InsertionPoint {
///         InsertionPoint::between("license", "install")
///     }
///
///     fn validate(&self, data: &DataBag) -> Result<(), HookError> {
///         match data.get_bool("opt_in") {
///             Some(_) => Ok(()),
///             None => Err("choose whether to send telemetry".into()),
///         }
///     }
/// }
/// ```
pub trait CustomStateHandler: Send + Sync {
    fn state_id(&self) -> StateId;

    fn insertion_point(&self) -> InsertionPoint;

    /// Flat configuration of the state. Its `next`, `back`, and `cancel`
    /// entries are overwritten when the state is spliced.
    fn config(&self) -> StateConfig {
        StateConfig::new(self.state_id())
    }

    fn enter(&self, _data: &mut DataBag) -> Result<(), HookError> {
        Ok(())
    }

    fn leave(&self, _data: &mut DataBag) -> Result<(), HookError> {
        Ok(())
    }

    fn validate(&self, _data: &DataBag) -> Result<(), HookError> {
        Ok(())
    }
}
