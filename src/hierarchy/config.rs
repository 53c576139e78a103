//! Main-state and sub-state declarations.

use crate::core::{Guard, Hook, NextStateFn, StateConfig, StateId, Validator};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fmt;

/// Interaction mode inside a main state.
#[derive(Clone)]
pub struct SubStateConfig {
    pub id: StateId,
    /// Sub-actions `handle_sub_action` accepts while this sub-state is active.
    pub allowed_actions: BTreeSet<String>,
    /// Runs before the engine leaves this sub-state for another one.
    pub validate: Option<Validator>,
    pub on_enter: Option<Hook>,
    pub on_exit: Option<Hook>,
    /// Sub-state entered right after an accepted sub-action.
    pub auto_transition: Option<StateId>,
    /// Computes the auto-transition target; takes precedence over `auto_transition`.
    pub auto_transition_fn: Option<NextStateFn>,
    /// Must pass before a main-state `next` may leave this sub-state.
    pub can_complete: Option<Guard>,
}

impl SubStateConfig {
    /// Sub-state with no allowed actions.
    pub fn new(id: impl Into<StateId>) -> Self {
        Self {
            id: id.into(),
            allowed_actions: BTreeSet::new(),
            validate: None,
            on_enter: None,
            on_exit: None,
            auto_transition: None,
            auto_transition_fn: None,
            can_complete: None,
        }
    }

    /// Permit a sub-action.
    pub fn allow(mut self, action: impl Into<String>) -> Self {
        self.allowed_actions.insert(action.into());
        self
    }

    /// Sub-state entered after any accepted sub-action.
    pub fn auto_transition_to(mut self, target: impl Into<StateId>) -> Self {
        self.auto_transition = Some(target.into());
        self
    }

    /// Predicate that must pass before the main state can move on.
    pub fn complete_when(mut self, guard: Guard) -> Self {
        self.can_complete = Some(guard);
        self
    }

    /// Whether `action` is a permitted sub-action.
    pub fn is_allowed(&self, action: &str) -> bool {
        self.allowed_actions.contains(action)
    }
}

impl fmt::Debug for SubStateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubStateConfig")
            .field("id", &self.id)
            .field("allowed_actions", &self.allowed_actions)
            .field("validate", &self.validate.is_some())
            .field("auto_transition", &self.auto_transition)
            .field("can_complete", &self.can_complete.is_some())
            .finish_non_exhaustive()
    }
}

/// A screen: flat state configuration plus its sub-states.
#[derive(Clone, Debug)]
pub struct MainStateConfig {
    pub state: StateConfig,
    pub sub_states: IndexMap<StateId, SubStateConfig>,
    /// Entered together with the main state. Defaults to the first sub-state added.
    pub initial_sub_state: Option<StateId>,
    /// When set, `next` is refused until the active sub-state can complete.
    pub require_sub_completion: bool,
}

impl MainStateConfig {
    /// Wrap a flat state config as a main state with no sub-states.
    pub fn new(state: StateConfig) -> Self {
        Self {
            state,
            sub_states: IndexMap::new(),
            initial_sub_state: None,
            require_sub_completion: false,
        }
    }

    /// Id of the wrapped state.
    pub fn id(&self) -> &StateId {
        &self.state.id
    }

    /// Attach a sub-state, replacing one with the same id.
    pub fn with_sub_state(mut self, sub: SubStateConfig) -> Self {
        if self.initial_sub_state.is_none() {
            self.initial_sub_state = Some(sub.id.clone());
        }
        self.sub_states.insert(sub.id.clone(), sub);
        self
    }

    /// Refuse `next` until the active sub-state can complete.
    pub fn require_sub_completion(mut self) -> Self {
        self.require_sub_completion = true;
        self
    }

    /// Look up a declared sub-state.
    pub fn sub_state(&self, id: &StateId) -> Option<&SubStateConfig> {
        self.sub_states.get(id)
    }
}

impl From<StateConfig> for MainStateConfig {
    fn from(state: StateConfig) -> Self {
        Self::new(state)
    }
}
