//! Live flow plus its registered custom states.

use super::handler::CustomStateHandler;
use super::registry::CustomStateRegistry;
use super::splice::splice;
use crate::engine::{Callbacks, Engine, EngineError, FlowDefinition};
use crate::pipeline::EngineOptions;

/// Owns a base flow, its custom states, and the engine built from both.
///
/// Every registration rebuilds the engine from the base declarations. The
/// whole session carries over to the rebuilt engine: position, data bag,
/// history, strict and dry-run flags, the dry-run log, and callbacks. A
/// registration that makes the flow invalid leaves everything untouched.
#[derive(Debug)]
pub struct FlowController {
    base: FlowDefinition,
    registry: CustomStateRegistry,
    engine: Engine,
}

impl FlowController {
    /// Build the initial engine from `base` with no custom states.
    pub fn new(base: FlowDefinition, options: EngineOptions) -> Result<Self, EngineError> {
        let registry = CustomStateRegistry::new();
        let engine = build(&base, &registry, &options)?;
        Ok(Self {
            base,
            registry,
            engine,
        })
    }

    /// Register a custom state and splice it into the live flow.
    pub fn register<H>(&mut self, handler: H) -> Result<(), EngineError>
    where
        H: CustomStateHandler + 'static,
    {
        let mut registry = self.registry.clone();
        registry.register(handler)?;
        let engine = build(&self.base, &registry, self.engine.options())?;
        self.registry = registry;
        self.install(engine);
        Ok(())
    }

    /// Re-splice from declarations, keeping the session.
    pub fn rebuild(&mut self) -> Result<(), EngineError> {
        let engine = build(&self.base, &self.registry, self.engine.options())?;
        self.install(engine);
        Ok(())
    }

    /// Callbacks installed on this and every rebuilt engine.
    pub fn set_callbacks(&mut self, callbacks: Callbacks) {
        self.engine.set_callbacks(callbacks);
    }

    /// The live engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Mutable access to the live engine. Settings made here survive rebuilds.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Registered custom states.
    pub fn registry(&self) -> &CustomStateRegistry {
        &self.registry
    }

    /// Declarations as given, without custom states.
    pub fn base(&self) -> &FlowDefinition {
        &self.base
    }

    /// Give up the controller, keeping the live engine.
    pub fn into_engine(self) -> Engine {
        self.engine
    }

    fn install(&mut self, mut engine: Engine) {
        engine.carry_over(&self.engine);
        self.engine = engine;
    }
}

fn build(
    base: &FlowDefinition,
    registry: &CustomStateRegistry,
    options: &EngineOptions,
) -> Result<Engine, EngineError> {
    let definition = splice(base, registry)?;
    let mut engine = Engine::from_definition(definition, options.clone());
    engine.validate()?;
    Ok(engine)
}
