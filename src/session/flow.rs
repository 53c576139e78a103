//! Operations a [`Session`](super::Session) forwards to its engine.

use crate::core::{Action, StateId};
use crate::engine::{Engine, EngineError};
use crate::hierarchy::{CompositeState, HierarchicalEngine};
use crate::pipeline::DryRunLog;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;
use uuid::Uuid;

/// An engine that can be driven through a shared session handle.
///
/// Implemented by the flat [`Engine`] (positions are [`StateId`]s) and the
/// [`HierarchicalEngine`] (positions are [`CompositeState`]s).
pub trait Flow: Debug + Send + Sync + 'static {
    /// Where the engine currently is.
    type Position: Clone + Debug + PartialEq + Send + Sync + 'static;

    fn session_id(&self) -> Uuid;

    fn start(&mut self) -> Result<Self::Position, EngineError>;
    fn next(&mut self) -> Result<Self::Position, EngineError>;
    fn back(&mut self) -> Result<Self::Position, EngineError>;
    fn skip(&mut self) -> Result<Self::Position, EngineError>;
    fn cancel(&mut self) -> Result<(), EngineError>;
    fn transition(&mut self, action: Action) -> Result<Self::Position, EngineError>;
    fn set_data(&mut self, key: String, value: Value) -> Option<Value>;
    fn reset(&mut self);

    fn position(&self) -> Option<Self::Position>;
    fn get_data(&self, key: &str) -> Option<&Value>;
    fn get_all_data(&self) -> BTreeMap<String, Value>;
    fn available_actions(&self) -> Vec<Action>;
    fn can_transition(&self, action: &Action) -> bool;
    fn history(&self) -> Vec<Self::Position>;
    fn is_final(&self) -> bool;
    fn dry_run_log(&self) -> &DryRunLog;
}

impl Flow for Engine {
    type Position = StateId;

    fn session_id(&self) -> Uuid {
        self.id()
    }

    fn start(&mut self) -> Result<StateId, EngineError> {
        Engine::start(self)
    }

    fn next(&mut self) -> Result<StateId, EngineError> {
        Engine::next(self)
    }

    fn back(&mut self) -> Result<StateId, EngineError> {
        Engine::back(self)
    }

    fn skip(&mut self) -> Result<StateId, EngineError> {
        Engine::skip(self)
    }

    fn cancel(&mut self) -> Result<(), EngineError> {
        Engine::cancel(self)
    }

    fn transition(&mut self, action: Action) -> Result<StateId, EngineError> {
        Engine::transition(self, action)
    }

    fn set_data(&mut self, key: String, value: Value) -> Option<Value> {
        Engine::set_data(self, key, value)
    }

    fn reset(&mut self) {
        Engine::reset(self)
    }

    fn position(&self) -> Option<StateId> {
        self.current_state().cloned()
    }

    fn get_data(&self, key: &str) -> Option<&Value> {
        Engine::get_data(self, key)
    }

    fn get_all_data(&self) -> BTreeMap<String, Value> {
        Engine::get_all_data(self)
    }

    fn available_actions(&self) -> Vec<Action> {
        Engine::available_actions(self)
    }

    fn can_transition(&self, action: &Action) -> bool {
        Engine::can_transition(self, action)
    }

    fn history(&self) -> Vec<StateId> {
        Engine::history(self)
    }

    fn is_final(&self) -> bool {
        Engine::is_final(self)
    }

    fn dry_run_log(&self) -> &DryRunLog {
        Engine::dry_run_log(self)
    }
}

impl Flow for HierarchicalEngine {
    type Position = CompositeState;

    fn session_id(&self) -> Uuid {
        self.id()
    }

    fn start(&mut self) -> Result<CompositeState, EngineError> {
        HierarchicalEngine::start(self)
    }

    fn next(&mut self) -> Result<CompositeState, EngineError> {
        HierarchicalEngine::next(self)
    }

    fn back(&mut self) -> Result<CompositeState, EngineError> {
        HierarchicalEngine::back(self)
    }

    fn skip(&mut self) -> Result<CompositeState, EngineError> {
        HierarchicalEngine::skip(self)
    }

    fn cancel(&mut self) -> Result<(), EngineError> {
        HierarchicalEngine::cancel(self)
    }

    fn transition(&mut self, action: Action) -> Result<CompositeState, EngineError> {
        HierarchicalEngine::transition(self, action)
    }

    fn set_data(&mut self, key: String, value: Value) -> Option<Value> {
        HierarchicalEngine::set_data(self, key, value)
    }

    fn reset(&mut self) {
        HierarchicalEngine::reset(self)
    }

    fn position(&self) -> Option<CompositeState> {
        self.current_state().cloned()
    }

    fn get_data(&self, key: &str) -> Option<&Value> {
        HierarchicalEngine::get_data(self, key)
    }

    fn get_all_data(&self) -> BTreeMap<String, Value> {
        HierarchicalEngine::get_all_data(self)
    }

    fn available_actions(&self) -> Vec<Action> {
        HierarchicalEngine::available_actions(self)
    }

    fn can_transition(&self, action: &Action) -> bool {
        HierarchicalEngine::can_transition(self, action)
    }

    fn history(&self) -> Vec<CompositeState> {
        HierarchicalEngine::history(self)
    }

    fn is_final(&self) -> bool {
        HierarchicalEngine::is_final(self)
    }

    fn dry_run_log(&self) -> &DryRunLog {
        HierarchicalEngine::dry_run_log(self)
    }
}
