//! Engine-wide notifications for the presentation collaborator.

use crate::core::{Action, DataBag, HookError, StateId};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Describes a move in flight. `from` is `None` when starting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionEvent {
    pub from: Option<StateId>,
    pub to: StateId,
    pub action: Action,
}

impl fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.from {
            Some(from) => write!(f, "{from} -> {} [{}]", self.to, self.action),
            None => write!(f, "<start> -> {} [{}]", self.to, self.action),
        }
    }
}

pub type GuardCallback = Arc<dyn Fn(&TransitionEvent) -> Result<(), HookError> + Send + Sync>;
pub type EventCallback = Arc<dyn Fn(&TransitionEvent) + Send + Sync>;
pub type EnterCallback = Arc<dyn Fn(&StateId, &mut DataBag) -> Result<(), HookError> + Send + Sync>;
pub type LeaveCallback = Arc<dyn Fn(&StateId, &DataBag) -> Result<(), HookError> + Send + Sync>;
pub type StateCallback = Arc<dyn Fn(&StateId) + Send + Sync>;
pub type ValidationErrorCallback = Arc<dyn Fn(&StateId, &str) + Send + Sync>;
pub type CancelCallback = Arc<dyn Fn(&StateId, &BTreeMap<String, Value>) + Send + Sync>;
pub type DataCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Optional notifications fired around transitions.
///
/// Slots returning `Result` can reject the transition in flight, which
/// rolls the engine back to where it was before the attempt.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub before_transition: Option<GuardCallback>,
    pub on_leave: Option<LeaveCallback>,
    pub on_transition: Option<EventCallback>,
    pub on_enter: Option<EnterCallback>,
    pub after_transition: Option<EventCallback>,
    /// Fired after every successful move, including `back`.
    pub on_state_changed: Option<StateCallback>,
    pub on_validation_error: Option<ValidationErrorCallback>,
    pub on_cancel: Option<CancelCallback>,
    pub on_data_changed: Option<DataCallback>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("before_transition", &self.before_transition.is_some())
            .field("on_leave", &self.on_leave.is_some())
            .field("on_transition", &self.on_transition.is_some())
            .field("on_enter", &self.on_enter.is_some())
            .field("after_transition", &self.after_transition.is_some())
            .field("on_state_changed", &self.on_state_changed.is_some())
            .field("on_validation_error", &self.on_validation_error.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .field("on_data_changed", &self.on_data_changed.is_some())
            .finish()
    }
}
