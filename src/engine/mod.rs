//! Flat wizard engine.
//!
//! Declarations live in a [`FlowDefinition`]; the [`Engine`] drives one
//! session over it. Every move runs the same protocol and either commits
//! completely or rolls back position, history, and data writes.

mod callbacks;
mod definition;
mod error;
mod machine;

pub use callbacks::{
    CancelCallback, Callbacks, DataCallback, EnterCallback, EventCallback, GuardCallback,
    LeaveCallback, StateCallback, TransitionEvent, ValidationErrorCallback,
};
pub use definition::FlowDefinition;
pub(crate) use definition::{accumulate, Check};
pub use error::{ConfigError, EngineError};
pub use machine::{Engine, COMPLETED_AT_KEY};
