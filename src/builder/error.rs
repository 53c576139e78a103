//! Errors raised by the flow builder.

use crate::engine::EngineError;
use thiserror::Error;

/// Errors that can occur when building a flow.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Initial state not specified. Call .initial(id) before .build()")]
    MissingInitialState,

    #[error("No states defined. Add at least one state")]
    NoStates,

    #[error(transparent)]
    Engine(#[from] EngineError),
}
