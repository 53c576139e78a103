//! State identifiers and per-state configuration.
//!
//! A state is plain data: an opaque name plus a capability record of flags
//! and optional function references. The engine never subclasses states;
//! it reads the record and decides what to invoke.

use super::action::Action;
use super::guard::Guard;
use super::hook::{DataChangeHook, Hook, NextStateFn, Validator};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Opaque name identifying one step of a workflow.
///
/// # Example
///
/// ```rust
/// use wizflow::core::StateId;
///
/// let id = StateId::from("welcome");
/// assert_eq!(id, "welcome");
/// assert_eq!(id.as_str(), "welcome");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(String);

impl StateId {
    /// Wrap a state name.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The state name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the name is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StateId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&StateId> for StateId {
    fn from(value: &StateId) -> Self {
        value.clone()
    }
}

impl Borrow<str> for StateId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for StateId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StateId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Configuration of a single state.
///
/// Capability flags default to `can_go_next`, `can_go_back` and `can_cancel`
/// enabled and `can_skip` disabled. Every function slot is optional.
#[derive(Clone)]
pub struct StateConfig {
    pub id: StateId,
    pub can_go_next: bool,
    pub can_go_back: bool,
    pub can_skip: bool,
    pub can_cancel: bool,
    /// Runs before `next` leaves this state.
    pub validate_next: Option<Validator>,
    /// Runs after the engine has moved into this state.
    pub validate_entry: Option<Validator>,
    /// Runs before the engine leaves this state.
    pub validate_exit: Option<Validator>,
    /// Predicate that must hold for the state to be entered at all.
    pub entry_gate: Option<Guard>,
    pub on_enter: Option<Hook>,
    pub on_exit: Option<Hook>,
    pub on_data_change: Option<DataChangeHook>,
    /// Static action -> target table.
    pub transitions: BTreeMap<Action, StateId>,
    /// Overrides the static table for the `next` action when it yields a target.
    pub next_state: Option<NextStateFn>,
}

impl StateConfig {
    /// State allowing next, back, and cancel, with no hooks.
    pub fn new(id: impl Into<StateId>) -> Self {
        Self {
            id: id.into(),
            can_go_next: true,
            can_go_back: true,
            can_skip: false,
            can_cancel: true,
            validate_next: None,
            validate_entry: None,
            validate_exit: None,
            entry_gate: None,
            on_enter: None,
            on_exit: None,
            on_data_change: None,
            transitions: BTreeMap::new(),
            next_state: None,
        }
    }

    /// Add or replace an entry in the static transition table.
    pub fn with_transition(mut self, action: impl Into<Action>, target: impl Into<StateId>) -> Self {
        self.transitions.insert(action.into(), target.into());
        self
    }

    /// Static target for `action`.
    pub fn target(&self, action: &Action) -> Option<&StateId> {
        self.transitions.get(action)
    }

    /// Flag lookup for the built-in actions. Custom actions carry no flag.
    pub fn allows(&self, action: &Action) -> bool {
        match action {
            Action::Next => self.can_go_next,
            Action::Back => self.can_go_back,
            Action::Skip => self.can_skip,
            Action::Cancel => self.can_cancel,
            Action::Custom(_) => true,
        }
    }
}

impl fmt::Debug for StateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateConfig")
            .field("id", &self.id)
            .field("can_go_next", &self.can_go_next)
            .field("can_go_back", &self.can_go_back)
            .field("can_skip", &self.can_skip)
            .field("can_cancel", &self.can_cancel)
            .field("transitions", &self.transitions)
            .field("dynamic_next", &self.next_state.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_id_compares_with_str() {
        let id = StateId::from("license");
        assert_eq!(id, "license");
        assert_ne!(id, "welcome");
        assert_eq!(id.to_string(), "license");
    }

    #[test]
    fn state_id_serializes_as_plain_string() {
        let id = StateId::from("install");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"install\"");
        let back: StateId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn new_config_has_default_capabilities() {
        let config = StateConfig::new("welcome");
        assert!(config.can_go_next);
        assert!(config.can_go_back);
        assert!(!config.can_skip);
        assert!(config.can_cancel);
        assert!(config.transitions.is_empty());
    }

    #[test]
    fn with_transition_replaces_existing_entry() {
        let config = StateConfig::new("a")
            .with_transition(Action::Next, "b")
            .with_transition(Action::Next, "c");
        assert_eq!(config.target(&Action::Next), Some(&StateId::from("c")));
        assert_eq!(config.transitions.len(), 1);
    }

    #[test]
    fn allows_maps_flags_to_actions() {
        let mut config = StateConfig::new("a");
        config.can_skip = true;
        config.can_go_back = false;
        assert!(config.allows(&Action::Skip));
        assert!(!config.allows(&Action::Back));
        assert!(config.allows(&Action::custom("retry")));
    }
}
