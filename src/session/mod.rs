//! Thread-safe handle around one engine session.
//!
//! Read-only accessors take a shared lock; everything else takes the
//! exclusive lock for the whole operation. Long-running work happens on
//! worker threads that report back through a completion channel; the
//! owning thread applies those signals with [`Session::drain_completions`].
//! Both the flat and the hierarchical engine can sit behind a session.

mod flow;

pub use flow::Flow;

use crate::core::Action;
use crate::engine::{Engine, EngineError};
use crate::pipeline::DryRunLog;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Signal sent by a worker when its step is done.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    Next,
    Transition(Action),
    Cancel,
}

/// Cloneable, shareable engine handle.
pub struct Session<E: Flow = Engine> {
    engine: Arc<RwLock<E>>,
    completions: (Sender<Completion>, Receiver<Completion>),
}

impl<E: Flow> Clone for Session<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            completions: self.completions.clone(),
        }
    }
}

impl<E: Flow> std::fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("engine", &*self.engine.read())
            .field("pending", &self.completions.1.len())
            .finish()
    }
}

impl<E: Flow> From<E> for Session<E> {
    fn from(engine: E) -> Self {
        Self::new(engine)
    }
}

impl<E: Flow> Session<E> {
    /// Wrap `engine` with a fresh completion channel.
    pub fn new(engine: E) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
            completions: crossbeam_channel::unbounded(),
        }
    }

    /// Run `f` under the shared lock.
    pub fn read<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        f(&self.engine.read())
    }

    /// Run `f` under the exclusive lock.
    ///
    /// Engine-specific operations such as sub-state navigation go through here.
    pub fn write<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        f(&mut self.engine.write())
    }

    /// Current position.
    pub fn current_state(&self) -> Option<E::Position> {
        self.engine.read().position()
    }

    /// Copy of one value from the data bag.
    pub fn get_data(&self, key: &str) -> Option<Value> {
        self.engine.read().get_data(key).cloned()
    }

    /// Snapshot of the whole data bag.
    pub fn get_all_data(&self) -> BTreeMap<String, Value> {
        self.engine.read().get_all_data()
    }

    /// Actions accepted from the current position.
    pub fn available_actions(&self) -> Vec<Action> {
        self.engine.read().available_actions()
    }

    /// Whether `action` is permitted and resolves to a target.
    pub fn can_transition(&self, action: &Action) -> bool {
        self.engine.read().can_transition(action)
    }

    /// Visited positions, oldest first.
    pub fn history(&self) -> Vec<E::Position> {
        self.engine.read().history()
    }

    /// Whether the current position is final.
    pub fn is_final(&self) -> bool {
        self.engine.read().is_final()
    }

    /// Copy of the dry-run log taken under the shared lock.
    pub fn dry_run_log(&self) -> DryRunLog {
        self.engine.read().dry_run_log().clone()
    }

    /// Enter the initial state.
    pub fn start(&self) -> Result<E::Position, EngineError> {
        self.engine.write().start()
    }

    /// Validate and follow the `next` route.
    pub fn next(&self) -> Result<E::Position, EngineError> {
        self.engine.write().next()
    }

    /// Return to the previous position.
    pub fn back(&self) -> Result<E::Position, EngineError> {
        self.engine.write().back()
    }

    /// Follow the `skip` route.
    pub fn skip(&self) -> Result<E::Position, EngineError> {
        self.engine.write().skip()
    }

    /// Report cancellation without moving.
    pub fn cancel(&self) -> Result<(), EngineError> {
        self.engine.write().cancel()
    }

    /// Apply any action.
    pub fn transition(&self, action: impl Into<Action>) -> Result<E::Position, EngineError> {
        self.engine.write().transition(action.into())
    }

    /// Write a value. Returns the previous one.
    pub fn set_data(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.engine.write().set_data(key.into(), value)
    }

    /// Clear position, history, and data.
    pub fn reset(&self) {
        self.engine.write().reset();
    }

    /// Sender handed to worker threads.
    pub fn completion_channel(&self) -> Sender<Completion> {
        self.completions.0.clone()
    }

    /// Apply every queued completion in arrival order.
    ///
    /// Stops at the first failing one and returns its error. That signal is
    /// consumed and not retried, leaving the engine parked where it was;
    /// later signals stay queued. Returns the number applied otherwise.
    pub fn drain_completions(&self) -> Result<usize, EngineError> {
        let mut applied = 0;
        while let Ok(completion) = self.completions.1.try_recv() {
            let mut engine = self.engine.write();
            tracing::debug!(session = %engine.session_id(), ?completion, "applying completion");
            match completion {
                Completion::Next => engine.next().map(drop)?,
                Completion::Transition(action) => engine.transition(action).map(drop)?,
                Completion::Cancel => engine.cancel()?,
            }
            applied += 1;
        }
        Ok(applied)
    }
}
