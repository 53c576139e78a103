//! Two-level flows: main states containing sub-states.
//!
//! A main state is a screen; its sub-states are interaction modes within
//! that screen. Sub-actions are restricted per sub-state and may
//! auto-transition to another sub-state. A main state can require its
//! active sub-state to be completable before `next` may leave it.

mod composite;
mod config;
mod machine;

pub use composite::CompositeState;
pub use config::{MainStateConfig, SubStateConfig};
pub use machine::{HierarchicalEngine, SubStateCallback};
