//! Builder for complete flows.

use crate::builder::error::BuildError;
use crate::builder::state::StateBuilder;
use crate::core::{Action, GlobalRule, StateConfig, StateId};
use crate::engine::{Callbacks, Engine};
use crate::pipeline::EngineOptions;

/// Fluent construction of a validated [`Engine`].
///
/// Produces the same engine as the equivalent `add_state` /
/// `add_transition` calls followed by `validate`.
#[derive(Debug, Default)]
pub struct FlowBuilder {
    states: Vec<StateConfig>,
    initial: Option<StateId>,
    finals: Vec<StateId>,
    rules: Vec<GlobalRule>,
    cancel_state: Option<StateId>,
    options: EngineOptions,
    callbacks: Callbacks,
}

impl FlowBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a state.
    pub fn state(mut self, state: impl Into<StateConfig>) -> Self {
        self.states.push(state.into());
        self
    }

    /// Add a `next` edge, declaring either endpoint that is not declared yet.
    pub fn edge(mut self, from: impl Into<StateId>, to: impl Into<StateId>) -> Self {
        let from = from.into();
        let to = to.into();
        for id in [&from, &to] {
            if !self.states.iter().any(|state| &state.id == id) {
                self.states.push(StateBuilder::new(id.clone()).build());
            }
        }
        if let Some(state) = self.states.iter_mut().find(|state| state.id == from) {
            state.transitions.insert(Action::Next, to);
        }
        self
    }

    /// Set the initial state (required).
    pub fn initial(mut self, id: impl Into<StateId>) -> Self {
        self.initial = Some(id.into());
        self
    }

    /// Mark a state as final.
    pub fn final_state(mut self, id: impl Into<StateId>) -> Self {
        self.finals.push(id.into());
        self
    }

    /// Add a global rule.
    pub fn rule(mut self, rule: GlobalRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Cancellation target written into spliced custom states.
    pub fn cancel_state(mut self, id: impl Into<StateId>) -> Self {
        self.cancel_state = Some(id.into());
        self
    }

    /// Engine options.
    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Engine-wide callbacks.
    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Build and validate the engine.
    pub fn build(self) -> Result<Engine, BuildError> {
        let initial = self.initial.ok_or(BuildError::MissingInitialState)?;
        if self.states.is_empty() {
            return Err(BuildError::NoStates);
        }

        let mut engine = Engine::with_options(self.options);
        for state in self.states {
            engine.add_state(state)?;
        }
        engine.set_initial_state(initial)?;
        for id in self.finals {
            engine.add_final_state(id)?;
        }
        for rule in self.rules {
            engine.add_transition(rule)?;
        }
        if let Some(id) = self.cancel_state {
            engine.set_cancel_state(id)?;
        }
        engine.validate()?;
        engine.set_callbacks(self.callbacks);
        Ok(engine)
    }
}
