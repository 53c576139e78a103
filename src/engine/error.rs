//! Engine error types.

use crate::core::{Action, StateId};
use crate::pipeline::Stage;
use thiserror::Error;

/// Problems with a flow definition, detected eagerly when declaring
/// states and rules or collectively by `validate`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("State id must not be empty")]
    EmptyStateId,

    #[error("State '{0}' is already declared")]
    DuplicateState(StateId),

    #[error("State '{0}' is not declared")]
    UnknownState(StateId),

    #[error("Initial state not specified. Call .set_initial_state(id) before validating")]
    MissingInitialState,

    #[error("Transition '{action}' of '{from}' targets undeclared state '{target}'")]
    UnknownTarget {
        from: StateId,
        action: Action,
        target: StateId,
    },

    #[error("Global rule '{action}' from '{from}' to '{to}' references an undeclared state")]
    UnknownRuleState {
        from: StateId,
        to: StateId,
        action: Action,
    },

    #[error("Custom state '{0}' is already registered")]
    DuplicateCustomState(StateId),

    #[error("Insertion point of '{state}' references undeclared state '{anchor}'")]
    UnknownInsertionPoint { state: StateId, anchor: StateId },

    #[error("Main state '{0}' is not declared")]
    UnknownMainState(StateId),

    #[error("Sub-state '{sub_state}' is not declared in main state '{main_state}'")]
    UnknownSubState {
        main_state: StateId,
        sub_state: StateId,
    },

    #[error("Sub-state '{sub_state}' is already declared in main state '{main_state}'")]
    DuplicateSubState {
        main_state: StateId,
        sub_state: StateId,
    },
}

/// Errors returned by engine operations.
///
/// Every variant except `Config`/`InvalidDefinition` leaves the engine
/// exactly as it was before the failed call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Flow definition is invalid: {}", join(.0))]
    InvalidDefinition(Vec<ConfigError>),

    #[error("Engine has not been started")]
    NotStarted,

    #[error("Action '{action}' is not allowed from state '{state}'")]
    ActionNotAllowed { state: StateId, action: Action },

    #[error("No target for action '{action}' from state '{state}'")]
    NoTarget { state: StateId, action: Action },

    #[error("Not enough history to go back")]
    InsufficientHistory,

    #[error("Validation failed at '{state}' ({stage}): {message}")]
    Validation {
        state: StateId,
        stage: Stage,
        message: String,
    },

    #[error("Entry to '{state}' rejected by its gate")]
    EntryRejected { state: StateId },

    #[error("Callback '{stage}' rejected the transition at '{state}': {message}")]
    CallbackRejected {
        state: StateId,
        stage: Stage,
        message: String,
    },

    #[error("Sub-action '{action}' is not allowed in sub-state '{sub_state}' of '{state}'")]
    SubActionNotAllowed {
        state: StateId,
        sub_state: StateId,
        action: String,
    },

    #[error("Sub-state '{sub_state}' of '{state}' has not been completed")]
    SubStateIncomplete { state: StateId, sub_state: StateId },

    #[error("Main state '{state}' has no active sub-state")]
    NoSubState { state: StateId },
}

impl EngineError {
    /// A business rule rejected the data.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// The flow definition itself is broken.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidDefinition(_))
    }

    /// A hook or notification rejected an in-flight transition.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::CallbackRejected { .. } | Self::EntryRejected { .. }
        )
    }
}

fn join(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
