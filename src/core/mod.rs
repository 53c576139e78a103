//! Core data model shared by every engine.
//!
//! This module holds the plain data the engines operate on:
//! - State identifiers and per-state capability records
//! - Actions and global routing rules
//! - Guard predicates over the shared data bag
//! - The journaled data bag and the bounded history
//!
//! Nothing here performs a transition; the engines in `engine` and
//! `hierarchy` drive these types.

mod action;
mod data;
mod guard;
mod history;
mod hook;
mod rule;
mod state;

pub use action::Action;
pub use data::DataBag;
pub use guard::Guard;
pub use history::{History, DEFAULT_MAX_HISTORY};
pub use hook::{DataChangeHook, Hook, HookError, NextStateFn, Validator};
pub use rule::GlobalRule;
pub use state::{StateConfig, StateId};

pub(crate) use rule::resolve as resolve_rule;
