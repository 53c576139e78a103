//! Builder for individual state configurations.

use crate::core::{Action, DataBag, Guard, HookError, StateConfig, StateId};
use serde_json::Value;
use std::sync::Arc;

/// Fluent construction of a [`StateConfig`].
///
/// # Example
///
/// ```
/// use wizflow::builder::StateBuilder;
/// use wizflow::core::Action;
///
/// let license = StateBuilder::new("license")
///     .next("install")
///     .validate_next(|data| match data.get_bool("accepted") {
///         Some(true) => Ok(()),
///         _ => Err("license must be accepted".into()),
///     })
///     .build();
///
/// assert_eq!(license.target(&Action::Next).map(|id| id.as_str()), Some("install"));
/// assert!(license.validate_next.is_some());
/// ```
#[derive(Clone, Debug)]
pub struct StateBuilder {
    config: StateConfig,
}

impl StateBuilder {
    /// Start a state allowing next, back, and cancel.
    pub fn new(id: impl Into<StateId>) -> Self {
        Self {
            config: StateConfig::new(id),
        }
    }

    /// Id of the state being built.
    pub fn id(&self) -> &StateId {
        &self.config.id
    }

    /// Target of `next`.
    pub fn next(self, target: impl Into<StateId>) -> Self {
        self.on(Action::Next, target)
    }

    /// Target of a routed `back`.
    pub fn back(self, target: impl Into<StateId>) -> Self {
        self.on(Action::Back, target)
    }

    /// Route `skip` to `target` and allow skipping.
    pub fn skip(mut self, target: impl Into<StateId>) -> Self {
        self.config.can_skip = true;
        self.on(Action::Skip, target)
    }

    /// Target of a routed cancel.
    pub fn cancel(self, target: impl Into<StateId>) -> Self {
        self.on(Action::Cancel, target)
    }

    /// Route any action to `target`.
    pub fn on(mut self, action: impl Into<Action>, target: impl Into<StateId>) -> Self {
        self.config = self.config.with_transition(action, target);
        self
    }

    /// Allow `skip`, falling back to the `next` route.
    pub fn skippable(mut self) -> Self {
        self.config.can_skip = true;
        self
    }

    /// Disable `next`.
    pub fn no_next(mut self) -> Self {
        self.config.can_go_next = false;
        self
    }

    /// Disable `back`.
    pub fn no_back(mut self) -> Self {
        self.config.can_go_back = false;
        self
    }

    /// Disable `cancel`.
    pub fn no_cancel(mut self) -> Self {
        self.config.can_cancel = false;
        self
    }

    /// Validator run before leaving through `next`.
    pub fn validate_next<F>(mut self, validator: F) -> Self
    where
        F: Fn(&DataBag) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.config.validate_next = Some(Arc::new(validator));
        self
    }

    /// Validator run before entering.
    pub fn validate_entry<F>(mut self, validator: F) -> Self
    where
        F: Fn(&DataBag) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.config.validate_entry = Some(Arc::new(validator));
        self
    }

    /// Validator run before leaving.
    pub fn validate_exit<F>(mut self, validator: F) -> Self
    where
        F: Fn(&DataBag) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.config.validate_exit = Some(Arc::new(validator));
        self
    }

    /// Entry gate over the data bag.
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&DataBag) -> bool + Send + Sync + 'static,
    {
        self.config.entry_gate = Some(Guard::new(predicate));
        self
    }

    /// Hook run after entering.
    pub fn on_enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut DataBag) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.config.on_enter = Some(Arc::new(hook));
        self
    }

    /// Hook run before leaving.
    pub fn on_exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut DataBag) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.config.on_exit = Some(Arc::new(hook));
        self
    }

    /// Hook notified of every data write while current.
    pub fn on_data_change<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.config.on_data_change = Some(Arc::new(hook));
        self
    }

    /// Compute the `next` target from data, overriding the static entry.
    pub fn next_state<F>(mut self, next_state: F) -> Self
    where
        F: Fn(&DataBag) -> Option<StateId> + Send + Sync + 'static,
    {
        self.config.next_state = Some(Arc::new(next_state));
        self
    }

    /// Finish the state config.
    pub fn build(self) -> StateConfig {
        self.config
    }
}

impl From<StateBuilder> for StateConfig {
    fn from(builder: StateBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn routes_and_flags() {
        let config = StateBuilder::new("options")
            .next("install")
            .skip("install")
            .on("advanced", "expert")
            .no_back()
            .build();

        assert_eq!(config.target(&Action::Next).unwrap(), "install");
        assert_eq!(config.target(&Action::custom("advanced")).unwrap(), "expert");
        assert!(config.can_skip);
        assert!(!config.can_go_back);
        assert!(config.can_cancel);
    }

    #[test]
    fn closures_are_installed() {
        let config = StateBuilder::new("install")
            .when(|data| data.contains("path"))
            .on_enter(|data| {
                data.set("started", json!(true));
                Ok(())
            })
            .next_state(|_| Some("done".into()))
            .build();

        let mut data = DataBag::new();
        assert!(!config.entry_gate.as_ref().unwrap().check(&data));
        (config.on_enter.as_ref().unwrap())(&mut data).unwrap();
        assert_eq!(data.get("started"), Some(&json!(true)));
        assert_eq!(
            (config.next_state.as_ref().unwrap())(&data),
            Some(StateId::from("done"))
        );
    }
}
