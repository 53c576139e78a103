//! Declarative flow definitions.
//!
//! A `FlowDefinition` holds the declarations an engine is built from: the
//! state table, the initial and final states, global rules, and the
//! cancellation state. Keeping declarations separate from the running
//! engine lets a controller rebuild the whole transition table from
//! scratch whenever custom states are spliced in.

use super::error::{ConfigError, EngineError};
use crate::core::{resolve_rule, Action, DataBag, GlobalRule, StateConfig, StateId};
use indexmap::{IndexMap, IndexSet};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

pub(crate) type Check = Validation<(), NonEmptyVec<ConfigError>>;

/// State table plus flow-level declarations, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct FlowDefinition {
    states: IndexMap<StateId, StateConfig>,
    initial: Option<StateId>,
    finals: IndexSet<StateId>,
    rules: Vec<GlobalRule>,
    cancel_state: Option<StateId>,
}

impl FlowDefinition {
    /// Empty definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a state. Ids must be non-empty and unique.
    pub fn add_state(&mut self, config: StateConfig) -> Result<(), ConfigError> {
        if config.id.is_empty() {
            return Err(ConfigError::EmptyStateId);
        }
        if self.states.contains_key(&config.id) {
            return Err(ConfigError::DuplicateState(config.id));
        }
        self.states.insert(config.id.clone(), config);
        Ok(())
    }

    /// Set the state `start` enters.
    pub fn set_initial_state(&mut self, id: impl Into<StateId>) -> Result<(), ConfigError> {
        let id = self.require_declared(id.into())?;
        self.initial = Some(id);
        Ok(())
    }

    /// Mark a state as final.
    pub fn add_final_state(&mut self, id: impl Into<StateId>) -> Result<(), ConfigError> {
        let id = self.require_declared(id.into())?;
        self.finals.insert(id);
        Ok(())
    }

    /// State that spliced custom states route their `cancel` action to.
    pub fn set_cancel_state(&mut self, id: impl Into<StateId>) -> Result<(), ConfigError> {
        let id = self.require_declared(id.into())?;
        self.cancel_state = Some(id);
        Ok(())
    }

    /// Add a global rule. Both endpoints must already be declared.
    pub fn add_transition(&mut self, rule: GlobalRule) -> Result<(), ConfigError> {
        if !self.contains(&rule.from) || !self.contains(&rule.to) {
            return Err(ConfigError::UnknownRuleState {
                from: rule.from,
                to: rule.to,
                action: rule.action,
            });
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Whether `id` is declared.
    pub fn contains(&self, id: &StateId) -> bool {
        self.states.contains_key(id)
    }

    /// Look up a declared state.
    pub fn state(&self, id: &StateId) -> Option<&StateConfig> {
        self.states.get(id)
    }

    /// Mutable access to a declared state.
    pub fn state_mut(&mut self, id: &StateId) -> Option<&mut StateConfig> {
        self.states.get_mut(id)
    }

    pub(crate) fn require(&self, id: &StateId) -> Result<&StateConfig, ConfigError> {
        self.states
            .get(id)
            .ok_or_else(|| ConfigError::UnknownState(id.clone()))
    }

    /// States in declaration order.
    pub fn states(&self) -> impl Iterator<Item = &StateConfig> {
        self.states.values()
    }

    /// State ids in declaration order.
    pub fn state_ids(&self) -> impl Iterator<Item = &StateId> {
        self.states.keys()
    }

    /// Number of declared states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no state is declared.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// State `start` enters.
    pub fn initial_state(&self) -> Option<&StateId> {
        self.initial.as_ref()
    }

    /// Whether `id` is marked final.
    pub fn is_final(&self, id: &StateId) -> bool {
        self.finals.contains(id)
    }

    /// Final states in declaration order.
    pub fn final_states(&self) -> impl Iterator<Item = &StateId> {
        self.finals.iter()
    }

    /// Global rules in declaration order.
    pub fn rules(&self) -> &[GlobalRule] {
        &self.rules
    }

    /// Cancellation target written into spliced custom states.
    pub fn cancel_state(&self) -> Option<&StateId> {
        self.cancel_state.as_ref()
    }

    /// Target of `next` from `from`: the dynamic next-state function, then
    /// the static `next` entry, then the best matching global rule.
    pub fn route_next(&self, from: &StateId, data: &DataBag) -> Result<StateId, EngineError> {
        let config = self.require(from)?;
        if let Some(target) = config.next_state.as_ref().and_then(|next_state| next_state(data)) {
            return Ok(target);
        }
        self.route(from, &Action::Next, data)
    }

    /// Target of `skip` from `from`, falling back to the `next` route without
    /// the dynamic next-state function.
    pub fn route_skip(&self, from: &StateId, data: &DataBag) -> Result<StateId, EngineError> {
        self.route(from, &Action::Skip, data)
            .or_else(|_| self.route(from, &Action::Next, data))
            .map_err(|_| EngineError::NoTarget {
                state: from.clone(),
                action: Action::Skip,
            })
    }

    /// Target of `action` from `from`: the state's table, then global rules.
    pub fn route(&self, from: &StateId, action: &Action, data: &DataBag) -> Result<StateId, EngineError> {
        let config = self.require(from)?;
        config
            .target(action)
            .or_else(|| resolve_rule(&self.rules, from, action, data))
            .cloned()
            .ok_or_else(|| EngineError::NoTarget {
                state: from.clone(),
                action: action.clone(),
            })
    }

    fn require_declared(&self, id: StateId) -> Result<StateId, ConfigError> {
        if self.contains(&id) {
            Ok(id)
        } else {
            Err(ConfigError::UnknownState(id))
        }
    }

    /// Check the whole definition, reporting every problem at once.
    ///
    /// Passes when an initial state is set and every state referenced by a
    /// table entry, final marker, global rule, or the cancel state is declared.
    pub fn validate(&self) -> Result<(), EngineError> {
        accumulate(self.checks())
    }

    pub(crate) fn checks(&self) -> Vec<Check> {
        let mut checks: Vec<Check> = Vec::new();

        checks.push(match &self.initial {
            None => Validation::fail(ConfigError::MissingInitialState),
            Some(id) => self.declared(id),
        });

        for id in &self.finals {
            checks.push(self.declared(id));
        }

        if let Some(id) = &self.cancel_state {
            checks.push(self.declared(id));
        }

        for config in self.states.values() {
            for (action, target) in &config.transitions {
                let check = if self.contains(target) {
                    Validation::success(())
                } else {
                    Validation::fail(ConfigError::UnknownTarget {
                        from: config.id.clone(),
                        action: action.clone(),
                        target: target.clone(),
                    })
                };
                checks.push(check);
            }
        }

        for rule in &self.rules {
            let check = if self.contains(&rule.from) && self.contains(&rule.to) {
                Validation::success(())
            } else {
                Validation::fail(ConfigError::UnknownRuleState {
                    from: rule.from.clone(),
                    to: rule.to.clone(),
                    action: rule.action.clone(),
                })
            };
            checks.push(check);
        }
        checks
    }

    pub(crate) fn declared(&self, id: &StateId) -> Check {
        if self.contains(id) {
            Validation::success(())
        } else {
            Validation::fail(ConfigError::UnknownState(id.clone()))
        }
    }
}

/// Fold individual checks into one result carrying every failure.
pub(crate) fn accumulate(checks: Vec<Check>) -> Result<(), EngineError> {
    match Validation::all_vec(checks) {
        Validation::Success(_) => Ok(()),
        Validation::Failure(errors) => Err(EngineError::InvalidDefinition(
            errors.iter().cloned().collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Action;

    fn linear() -> FlowDefinition {
        let mut def = FlowDefinition::new();
        def.add_state(StateConfig::new("welcome").with_transition(Action::Next, "license"))
            .unwrap();
        def.add_state(StateConfig::new("license").with_transition(Action::Next, "complete"))
            .unwrap();
        def.add_state(StateConfig::new("complete")).unwrap();
        def.set_initial_state("welcome").unwrap();
        def.add_final_state("complete").unwrap();
        def
    }

    #[test]
    fn duplicate_state_is_rejected() {
        let mut def = linear();
        let err = def.add_state(StateConfig::new("welcome")).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateState("welcome".into()));
    }

    #[test]
    fn empty_id_is_rejected() {
        let mut def = FlowDefinition::new();
        assert_eq!(
            def.add_state(StateConfig::new("")).unwrap_err(),
            ConfigError::EmptyStateId
        );
    }

    #[test]
    fn initial_and_final_must_be_declared() {
        let mut def = FlowDefinition::new();
        assert!(matches!(
            def.set_initial_state("ghost"),
            Err(ConfigError::UnknownState(_))
        ));
        assert!(matches!(
            def.add_final_state("ghost"),
            Err(ConfigError::UnknownState(_))
        ));
    }

    #[test]
    fn rules_require_declared_endpoints() {
        let mut def = linear();
        let err = def
            .add_transition(GlobalRule::new("license", "nowhere", "retry"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRuleState { .. }));
        assert!(def.rules().is_empty());
    }

    #[test]
    fn valid_definition_passes() {
        assert!(linear().validate().is_ok());
    }

    #[test]
    fn validate_accumulates_all_problems() {
        let mut def = FlowDefinition::new();
        def.add_state(StateConfig::new("a").with_transition(Action::Next, "missing"))
            .unwrap();
        def.add_state(StateConfig::new("b").with_transition(Action::Skip, "gone"))
            .unwrap();

        match def.validate() {
            Err(EngineError::InvalidDefinition(errors)) => {
                assert_eq!(errors.len(), 3);
                assert!(errors.contains(&ConfigError::MissingInitialState));
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, ConfigError::UnknownTarget { target, .. } if target == "missing")));
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, ConfigError::UnknownTarget { target, .. } if target == "gone")));
            }
            other => panic!("Expected invalid definition, got {other:?}"),
        }
    }

    #[test]
    fn route_prefers_table_over_rules() {
        let mut def = linear();
        def.add_transition(GlobalRule::new("welcome", "complete", Action::Next).priority(10))
            .unwrap();
        let data = DataBag::new();
        assert_eq!(def.route(&"welcome".into(), &Action::Next, &data).unwrap(), "license");
        assert!(matches!(
            def.route(&"complete".into(), &Action::Next, &data),
            Err(EngineError::NoTarget { .. })
        ));
    }

    #[test]
    fn route_skip_falls_back_to_next() {
        let def = linear();
        let target = def.route_skip(&"license".into(), &DataBag::new()).unwrap();
        assert_eq!(target, "complete");
    }

    #[test]
    fn states_keep_declaration_order() {
        let def = linear();
        let ids: Vec<_> = def.state_ids().map(StateId::as_str).collect();
        assert_eq!(ids, vec!["welcome", "license", "complete"]);
    }
}
