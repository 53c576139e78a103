//! Composite positions in a two-level flow.

use crate::core::StateId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position in a two-level flow: a main state plus an optional sub-state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeState {
    pub main: StateId,
    pub sub: Option<StateId>,
}

impl CompositeState {
    /// Position at a main state with no active sub-state.
    pub fn new(main: impl Into<StateId>) -> Self {
        Self {
            main: main.into(),
            sub: None,
        }
    }

    /// Position at `sub` inside `main`.
    pub fn with_sub(main: impl Into<StateId>, sub: impl Into<StateId>) -> Self {
        Self {
            main: main.into(),
            sub: Some(sub.into()),
        }
    }

    /// Same main state, different sub-state.
    pub fn at_sub(&self, sub: Option<StateId>) -> Self {
        Self {
            main: self.main.clone(),
            sub,
        }
    }
}

impl fmt::Display for CompositeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub {
            Some(sub) => write!(f, "{}/{}", self.main, sub),
            None => write!(f, "{}", self.main),
        }
    }
}

impl From<StateId> for CompositeState {
    fn from(main: StateId) -> Self {
        Self { main, sub: None }
    }
}
