//! Registration of custom-state handlers.

use super::handler::CustomStateHandler;
use crate::core::StateId;
use crate::engine::ConfigError;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Custom-state handlers keyed by state id, in registration order.
#[derive(Clone, Default)]
pub struct CustomStateRegistry {
    handlers: IndexMap<StateId, Arc<dyn CustomStateHandler>>,
}

impl CustomStateRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. Ids must be unique within the registry.
    pub fn register<H>(&mut self, handler: H) -> Result<(), ConfigError>
    where
        H: CustomStateHandler + 'static,
    {
        self.register_shared(Arc::new(handler))
    }

    /// Register an already shared handler.
    pub fn register_shared(&mut self, handler: Arc<dyn CustomStateHandler>) -> Result<(), ConfigError> {
        let id = handler.state_id();
        if id.is_empty() {
            return Err(ConfigError::EmptyStateId);
        }
        if self.handlers.contains_key(&id) {
            return Err(ConfigError::DuplicateCustomState(id));
        }
        tracing::debug!(state = %id, insertion_point = %handler.insertion_point(), "custom state registered");
        self.handlers.insert(id, handler);
        Ok(())
    }

    /// Handler registered for `id`.
    pub fn get(&self, id: &StateId) -> Option<&Arc<dyn CustomStateHandler>> {
        self.handlers.get(id)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &StateId) -> bool {
        self.handlers.contains_key(id)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handlers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn CustomStateHandler>> {
        self.handlers.values()
    }
}

impl fmt::Debug for CustomStateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom::InsertionPoint;

    struct Named(&'static str);

    impl CustomStateHandler for Named {
        fn state_id(&self) -> StateId {
            self.0.into()
        }

        fn insertion_point(&self) -> InsertionPoint {
            InsertionPoint::between("a", "b")
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut registry = CustomStateRegistry::new();
        registry.register(Named("extra")).unwrap();
        assert_eq!(
            registry.register(Named("extra")).unwrap_err(),
            ConfigError::DuplicateCustomState("extra".into())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registration_order_is_kept() {
        let mut registry = CustomStateRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(Named(name)).unwrap();
        }
        let ids: Vec<StateId> = registry.iter().map(|h| h.state_id()).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn empty_id_is_rejected() {
        let mut registry = CustomStateRegistry::new();
        assert_eq!(registry.register(Named("")).unwrap_err(), ConfigError::EmptyStateId);
        assert!(registry.is_empty());
    }
}
