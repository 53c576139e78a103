//! Two-level wizard engine.

use super::composite::CompositeState;
use super::config::{MainStateConfig, SubStateConfig};
use crate::core::{Action, DataBag, GlobalRule, History, StateId};
use crate::engine::{
    accumulate, Callbacks, Check, ConfigError, EngineError, FlowDefinition, TransitionEvent,
    COMPLETED_AT_KEY,
};
use crate::pipeline::{DryRunLog, EngineOptions, Pipeline, Stage};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use stillwater::validation::Validation;
use uuid::Uuid;

/// Fired after the active sub-state changes.
pub type SubStateCallback = Arc<dyn Fn(&CompositeState) + Send + Sync>;

const START_ACTION: &str = "start";
const NAVIGATE_ACTION: &str = "navigate";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pass {
    Forward { validate: bool },
    Back,
}

const VALIDATED: Pass = Pass::Forward { validate: true };

#[derive(Clone, Debug, Default)]
struct SubStates {
    states: IndexMap<StateId, SubStateConfig>,
    initial: Option<StateId>,
    require_completion: bool,
}

struct Checkpoint {
    current: Option<CompositeState>,
    history: History<CompositeState>,
    completed_at: Option<DateTime<Utc>>,
}

/// Two-level wizard engine: main states (screens) containing sub-states
/// (interaction modes).
///
/// Main-state moves run the same protocol as [`crate::engine::Engine`],
/// wrapping the active sub-state's exit hook and the new initial
/// sub-state's enter hook around the main-state hooks. History records
/// composite positions and never repeats the current one.
///
/// # Example
///
/// ```rust
/// use wizflow::core::{Action, StateConfig};
/// use wizflow::hierarchy::{HierarchicalEngine, MainStateConfig, SubStateConfig};
///
/// let mut engine = HierarchicalEngine::new();
/// engine
///     .add_main_state(
///         MainStateConfig::new(StateConfig::new("setup").with_transition(Action::Next, "done"))
///             .with_sub_state(SubStateConfig::new("basic").allow("more").auto_transition_to("advanced"))
///             .with_sub_state(SubStateConfig::new("advanced")),
///     )
///     .unwrap();
/// engine.add_main_state(StateConfig::new("done")).unwrap();
/// engine.set_initial_state("setup").unwrap();
/// engine.validate().unwrap();
///
/// engine.start().unwrap();
/// assert_eq!(engine.handle_sub_action("more").unwrap().to_string(), "setup/advanced");
/// assert_eq!(engine.next().unwrap().to_string(), "done");
/// ```
pub struct HierarchicalEngine {
    id: Uuid,
    definition: FlowDefinition,
    sub_states: IndexMap<StateId, SubStates>,
    callbacks: Callbacks,
    on_sub_state_changed: Option<SubStateCallback>,
    pipeline: Pipeline,
    current: Option<CompositeState>,
    history: History<CompositeState>,
    data: DataBag,
    completed_at: Option<DateTime<Utc>>,
}

impl Default for HierarchicalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for HierarchicalEngine {
    fn clone(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition: self.definition.clone(),
            sub_states: self.sub_states.clone(),
            callbacks: self.callbacks.clone(),
            on_sub_state_changed: self.on_sub_state_changed.clone(),
            pipeline: self.pipeline.clone(),
            current: self.current.clone(),
            history: self.history.clone(),
            data: self.data.clone(),
            completed_at: self.completed_at,
        }
    }
}

impl std::fmt::Debug for HierarchicalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchicalEngine")
            .field("id", &self.id)
            .field("current", &self.current)
            .field("main_states", &self.definition.len())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl HierarchicalEngine {
    /// Empty engine with default options.
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    /// Empty engine with the given options.
    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition: FlowDefinition::new(),
            sub_states: IndexMap::new(),
            callbacks: Callbacks::default(),
            on_sub_state_changed: None,
            history: History::new(options.max_history),
            pipeline: Pipeline::new(options),
            current: None,
            data: DataBag::new(),
            completed_at: None,
        }
    }

    /// Session id used in tracing output.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current strict/dry-run flags and history bound.
    pub fn options(&self) -> &EngineOptions {
        self.pipeline.options()
    }

    /// Honor (true) or bypass (false) validators.
    pub fn set_strict(&mut self, strict: bool) {
        self.pipeline.set_strict(strict);
    }

    /// Suppress hooks and log every attempt instead.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.pipeline.set_dry_run(dry_run);
    }

    /// Replace every engine-wide callback.
    pub fn set_callbacks(&mut self, callbacks: Callbacks) {
        self.callbacks = callbacks;
    }

    /// Mutable access to the engine-wide callbacks.
    pub fn callbacks_mut(&mut self) -> &mut Callbacks {
        &mut self.callbacks
    }

    /// Register the sub-state change notification.
    pub fn on_sub_state_changed<F>(&mut self, callback: F)
    where
        F: Fn(&CompositeState) + Send + Sync + 'static,
    {
        self.on_sub_state_changed = Some(Arc::new(callback));
    }

    /// Main-state declarations.
    pub fn definition(&self) -> &FlowDefinition {
        &self.definition
    }

    // ---- declarations -------------------------------------------------

    /// Register a screen together with any sub-states it already carries.
    pub fn add_main_state(&mut self, config: impl Into<MainStateConfig>) -> Result<(), EngineError> {
        let config = config.into();
        self.pipeline
            .record(|| format!("add_main_state {}", config.id()));

        if let Some(initial) = &config.initial_sub_state {
            if !config.sub_states.contains_key(initial) {
                return Err(ConfigError::UnknownSubState {
                    main_state: config.id().clone(),
                    sub_state: initial.clone(),
                }
                .into());
            }
        }
        if config.sub_states.keys().any(StateId::is_empty) {
            return Err(ConfigError::EmptyStateId.into());
        }

        let MainStateConfig {
            state,
            sub_states,
            initial_sub_state,
            require_sub_completion,
        } = config;
        let id = state.id.clone();
        self.definition.add_state(state)?;
        self.sub_states.insert(
            id,
            SubStates {
                states: sub_states,
                initial: initial_sub_state,
                require_completion: require_sub_completion,
            },
        );
        Ok(())
    }

    /// Attach a sub-state to an existing main state. The first one attached
    /// becomes the initial sub-state.
    pub fn add_sub_state(
        &mut self,
        main_state: impl Into<StateId>,
        sub: SubStateConfig,
    ) -> Result<(), EngineError> {
        let main_state = main_state.into();
        self.pipeline
            .record(|| format!("add_sub_state {main_state}/{}", sub.id));

        if sub.id.is_empty() {
            return Err(ConfigError::EmptyStateId.into());
        }
        let subs = self
            .sub_states
            .get_mut(&main_state)
            .ok_or_else(|| ConfigError::UnknownMainState(main_state.clone()))?;
        if subs.states.contains_key(&sub.id) {
            return Err(ConfigError::DuplicateSubState {
                main_state,
                sub_state: sub.id,
            }
            .into());
        }
        if subs.initial.is_none() {
            subs.initial = Some(sub.id.clone());
        }
        subs.states.insert(sub.id.clone(), sub);
        Ok(())
    }

    /// Override which sub-state a main state enters first.
    pub fn set_initial_sub_state(
        &mut self,
        main_state: impl Into<StateId>,
        sub_state: impl Into<StateId>,
    ) -> Result<(), EngineError> {
        let main_state = main_state.into();
        let sub_state = sub_state.into();
        let subs = self
            .sub_states
            .get_mut(&main_state)
            .ok_or_else(|| ConfigError::UnknownMainState(main_state.clone()))?;
        if !subs.states.contains_key(&sub_state) {
            return Err(ConfigError::UnknownSubState {
                main_state,
                sub_state,
            }
            .into());
        }
        subs.initial = Some(sub_state);
        Ok(())
    }

    /// Whether `next` waits for the active sub-state to complete.
    pub fn set_require_sub_completion(
        &mut self,
        main_state: impl Into<StateId>,
        required: bool,
    ) -> Result<(), EngineError> {
        let main_state = main_state.into();
        let subs = self
            .sub_states
            .get_mut(&main_state)
            .ok_or(ConfigError::UnknownMainState(main_state))?;
        subs.require_completion = required;
        Ok(())
    }

    /// Set the main state `start` enters.
    pub fn set_initial_state(&mut self, id: impl Into<StateId>) -> Result<(), EngineError> {
        let id = id.into();
        self.pipeline.record(|| format!("set_initial_state {id}"));
        Ok(self.definition.set_initial_state(id)?)
    }

    /// Mark a main state as final.
    pub fn add_final_state(&mut self, id: impl Into<StateId>) -> Result<(), EngineError> {
        let id = id.into();
        self.pipeline.record(|| format!("add_final_state {id}"));
        Ok(self.definition.add_final_state(id)?)
    }

    /// Add a global rule between main states.
    pub fn add_transition(&mut self, rule: GlobalRule) -> Result<(), EngineError> {
        self.pipeline
            .record(|| format!("add_transition {} -> {} [{}]", rule.from, rule.to, rule.action));
        Ok(self.definition.add_transition(rule)?)
    }

    /// Check main-state declarations plus every sub-state reference.
    pub fn validate(&mut self) -> Result<(), EngineError> {
        self.pipeline.record(|| "validate".to_string());
        let mut checks: Vec<Check> = self.definition.checks();
        for (main_state, subs) in &self.sub_states {
            let references = subs.initial.iter().chain(
                subs.states
                    .values()
                    .filter_map(|sub| sub.auto_transition.as_ref()),
            );
            for sub_state in references {
                checks.push(if subs.states.contains_key(sub_state) {
                    Validation::success(())
                } else {
                    Validation::fail(ConfigError::UnknownSubState {
                        main_state: main_state.clone(),
                        sub_state: sub_state.clone(),
                    })
                });
            }
        }
        accumulate(checks)
    }

    // ---- navigation ---------------------------------------------------

    /// Enter the initial main state and its initial sub-state.
    pub fn start(&mut self) -> Result<CompositeState, EngineError> {
        let initial = self
            .definition
            .initial_state()
            .cloned()
            .ok_or(ConfigError::MissingInitialState)?;
        self.pipeline.record(|| "start".to_string());

        let saved = self.checkpoint();
        self.current = None;
        self.history.clear();
        self.completed_at = None;

        let target = self.entry_position(initial);
        let result = self.move_main(target, Action::custom(START_ACTION), VALIDATED);
        if result.is_err() {
            self.restore(saved);
        }
        result
    }

    /// Jump straight to a main state through the full transition protocol.
    pub fn navigate_to_main_state(
        &mut self,
        main_state: impl Into<StateId>,
    ) -> Result<CompositeState, EngineError> {
        let main_state = main_state.into();
        self.require_current()?;
        let target = self.entry_position(main_state);
        self.move_main(target, Action::custom(NAVIGATE_ACTION), VALIDATED)
    }

    /// Switch the active sub-state of the current main state.
    ///
    /// The sub-state being left is validated by its own validator; the main
    /// state's validators are not consulted.
    pub fn navigate_to_sub_state(
        &mut self,
        sub_state: impl Into<StateId>,
    ) -> Result<CompositeState, EngineError> {
        let sub_state = sub_state.into();
        let current = self.require_current()?;
        if self.sub_config(&current.main, &sub_state).is_none() {
            return Err(ConfigError::UnknownSubState {
                main_state: current.main,
                sub_state,
            }
            .into());
        }
        self.move_sub(current.at_sub(Some(sub_state)), VALIDATED)
    }

    /// Apply a sub-action to the active sub-state, following its
    /// auto-transition when one is configured.
    pub fn handle_sub_action(&mut self, action: &str) -> Result<CompositeState, EngineError> {
        let current = self.require_current()?;
        let sub_state = current.sub.clone().ok_or_else(|| EngineError::NoSubState {
            state: current.main.clone(),
        })?;
        let config = self
            .sub_config(&current.main, &sub_state)
            .ok_or_else(|| ConfigError::UnknownSubState {
                main_state: current.main.clone(),
                sub_state: sub_state.clone(),
            })?;
        if !config.is_allowed(action) {
            return Err(EngineError::SubActionNotAllowed {
                state: current.main,
                sub_state,
                action: action.to_string(),
            });
        }

        let target = config
            .auto_transition_fn
            .as_ref()
            .and_then(|auto| auto(&self.data))
            .or_else(|| config.auto_transition.clone());
        self.pipeline
            .record(|| format!("sub_action {action} at {current}"));
        tracing::debug!(session = %self.id, state = %current, action, "sub-action accepted");

        match target {
            Some(target) => self.navigate_to_sub_state(target),
            None => Ok(current),
        }
    }

    /// Whether the active sub-state's completion predicate passes.
    /// True when there is no active sub-state or no predicate.
    pub fn can_complete_current_sub_state(&self) -> bool {
        let Some(current) = self.current.as_ref() else {
            return false;
        };
        let Some(sub_state) = current.sub.as_ref() else {
            return true;
        };
        self.sub_config(&current.main, sub_state)
            .and_then(|sub| sub.can_complete.as_ref())
            .is_none_or(|guard| guard.check(&self.data))
    }

    /// Main-state `next`, refused while a mandatory sub-state is incomplete.
    pub fn next(&mut self) -> Result<CompositeState, EngineError> {
        let current = self.require_current()?;
        let config = self.definition.require(&current.main)?;
        if !config.can_go_next {
            return Err(not_allowed(&current.main, Action::Next));
        }
        let validator = config.validate_next.clone();
        self.pipeline.record(|| format!("next from {current}"));

        self.check_sub_completion(&current)?;
        let subject = position_id(&current);
        if let Err(err) =
            self.pipeline
                .validate(&subject, Stage::ValidateNext, validator.as_ref(), &self.data)
        {
            tracing::info!(session = %self.id, state = %current, error = %err, "next rejected by validation");
            self.report_validation_error(&err);
            return Err(err);
        }

        let target = self.definition.route_next(&current.main, &self.data)?;
        let target = self.entry_position(target);
        self.move_main(target, Action::Next, VALIDATED)
    }

    /// Return to the previous composite position without validation.
    pub fn back(&mut self) -> Result<CompositeState, EngineError> {
        let current = self.require_current()?;
        let config = self.definition.require(&current.main)?;
        if !config.can_go_back {
            return Err(not_allowed(&current.main, Action::Back));
        }
        let target = self
            .history
            .previous()
            .cloned()
            .ok_or(EngineError::InsufficientHistory)?;
        self.pipeline.record(|| format!("back from {current}"));

        if target.main == current.main {
            self.move_sub(target, Pass::Back)
        } else {
            self.move_main(target, Action::Back, Pass::Back)
        }
    }

    /// Follow the main state's `skip` route without validation.
    pub fn skip(&mut self) -> Result<CompositeState, EngineError> {
        let current = self.require_current()?;
        let config = self.definition.require(&current.main)?;
        if !config.can_skip {
            return Err(not_allowed(&current.main, Action::Skip));
        }
        self.pipeline.record(|| format!("skip from {current}"));
        let target = self.definition.route_skip(&current.main, &self.data)?;
        let target = self.entry_position(target);
        self.move_main(target, Action::Skip, Pass::Forward { validate: false })
    }

    /// Report cancellation without moving.
    pub fn cancel(&mut self) -> Result<(), EngineError> {
        let current = self.require_current()?;
        let config = self.definition.require(&current.main)?;
        if !config.can_cancel {
            return Err(not_allowed(&current.main, Action::Cancel));
        }
        self.pipeline.record(|| format!("cancel at {current}"));
        tracing::info!(session = %self.id, state = %current, "cancel requested");
        if let Some(callback) = self.callbacks.on_cancel.clone() {
            let snapshot = self.data.snapshot();
            self.pipeline
                .notify(&current, Stage::Cancel, || callback(&current.main, &snapshot));
        }
        Ok(())
    }

    /// Main-state transition for any action; built-ins delegate to their operations.
    pub fn transition(&mut self, action: impl Into<Action>) -> Result<CompositeState, EngineError> {
        match action.into() {
            Action::Next => self.next(),
            Action::Back => self.back(),
            Action::Skip => self.skip(),
            action => {
                let current = self.require_current()?;
                let config = self.definition.require(&current.main)?;
                if !config.allows(&action) {
                    return Err(not_allowed(&current.main, action));
                }
                self.pipeline
                    .record(|| format!("transition {action} from {current}"));
                let target = self.definition.route(&current.main, &action, &self.data)?;
                let target = self.entry_position(target);
                self.move_main(target, action, VALIDATED)
            }
        }
    }

    /// Whether `action` is permitted and resolves to a target.
    pub fn can_transition(&self, action: &Action) -> bool {
        let Some(current) = self.current.as_ref() else {
            return false;
        };
        let Some(config) = self.definition.state(&current.main) else {
            return false;
        };
        if !config.allows(action) {
            return false;
        }
        match action {
            Action::Back => self.history.len() > 1,
            Action::Cancel => true,
            Action::Next => {
                self.sub_completion_satisfied(current)
                    && self.definition.route_next(&current.main, &self.data).is_ok()
            }
            Action::Skip => self.definition.route_skip(&current.main, &self.data).is_ok(),
            custom => self.definition.route(&current.main, custom, &self.data).is_ok(),
        }
    }

    /// Actions `can_transition` accepts from the current main state.
    pub fn available_actions(&self) -> Vec<Action> {
        let Some(current) = self.current.as_ref() else {
            return Vec::new();
        };
        let mut actions: Vec<Action> = [Action::Next, Action::Back, Action::Skip, Action::Cancel]
            .into_iter()
            .filter(|action| self.can_transition(action))
            .collect();
        let mut custom: Vec<Action> = self
            .definition
            .state(&current.main)
            .map(|config| {
                config
                    .transitions
                    .keys()
                    .filter(|action| !action.is_builtin())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        custom.extend(
            self.definition
                .rules()
                .iter()
                .filter(|rule| rule.from == current.main && !rule.action.is_builtin())
                .map(|rule| rule.action.clone()),
        );
        custom.sort();
        custom.dedup();
        actions.extend(custom.into_iter().filter(|action| self.can_transition(action)));
        actions
    }

    /// Sub-actions the active sub-state accepts, in name order.
    pub fn available_sub_actions(&self) -> Vec<String> {
        self.current
            .as_ref()
            .and_then(|current| {
                let sub_state = current.sub.as_ref()?;
                self.sub_config(&current.main, sub_state)
            })
            .map(|sub| sub.allowed_actions.iter().cloned().collect())
            .unwrap_or_default()
    }

    // ---- data ---------------------------------------------------------

    /// Write a value, firing the data-change hooks. Returns the previous value.
    pub fn set_data(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        self.pipeline.record(|| format!("set_data {key}={value}"));
        let previous = self.data.set(key.clone(), value.clone());

        let subject = self
            .current
            .clone()
            .unwrap_or_else(|| CompositeState::new("-"));
        let state_hook = self
            .definition
            .state(&subject.main)
            .and_then(|config| config.on_data_change.clone());
        if let Some(hook) = state_hook {
            self.pipeline
                .notify(&subject, Stage::DataChange, || hook(key.as_str(), &value));
        }
        if let Some(callback) = self.callbacks.on_data_changed.clone() {
            self.pipeline
                .notify(&subject, Stage::DataChange, || callback(key.as_str(), &value));
        }
        previous
    }

    /// Read one value from the data bag.
    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Snapshot of the whole data bag.
    pub fn get_all_data(&self) -> BTreeMap<String, Value> {
        self.data.snapshot()
    }

    /// Borrow the data bag.
    pub fn data(&self) -> &DataBag {
        &self.data
    }

    // ---- inspection ---------------------------------------------------

    /// Current composite position.
    pub fn current_state(&self) -> Option<&CompositeState> {
        self.current.as_ref()
    }

    /// Main state of the current position.
    pub fn current_main_state(&self) -> Option<&StateId> {
        self.current.as_ref().map(|current| &current.main)
    }

    /// Active sub-state, if any.
    pub fn current_sub_state(&self) -> Option<&StateId> {
        self.current.as_ref().and_then(|current| current.sub.as_ref())
    }

    /// Whether the current main state is final.
    pub fn is_final(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| self.definition.is_final(&current.main))
    }

    /// Visited composite positions, oldest first.
    pub fn history(&self) -> Vec<CompositeState> {
        self.history.entries()
    }

    /// Positions that redo would revisit, most recent last.
    pub fn future(&self) -> Vec<CompositeState> {
        self.history.future().to_vec()
    }

    /// When a final state was first reached.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Entries recorded while in dry-run mode.
    pub fn dry_run_log(&self) -> &DryRunLog {
        self.pipeline.log()
    }

    /// Drop every dry-run log entry.
    pub fn clear_dry_run_log(&mut self) {
        self.pipeline.clear_log();
    }

    /// Clear position, history, and data, keeping declarations.
    pub fn reset(&mut self) {
        self.pipeline.record(|| "reset".to_string());
        tracing::debug!(session = %self.id, "engine reset");
        self.current = None;
        self.history.clear();
        self.data.clear();
        self.completed_at = None;
    }

    // ---- protocol -----------------------------------------------------

    fn require_current(&self) -> Result<CompositeState, EngineError> {
        self.current.clone().ok_or(EngineError::NotStarted)
    }

    fn sub_config(&self, main_state: &StateId, sub_state: &StateId) -> Option<&SubStateConfig> {
        self.sub_states
            .get(main_state)
            .and_then(|subs| subs.states.get(sub_state))
    }

    /// Position a forward move into `main_state` lands on.
    fn entry_position(&self, main_state: StateId) -> CompositeState {
        let sub = self
            .sub_states
            .get(&main_state)
            .and_then(|subs| subs.initial.clone());
        CompositeState {
            main: main_state,
            sub,
        }
    }

    fn sub_completion_satisfied(&self, current: &CompositeState) -> bool {
        let required = self
            .sub_states
            .get(&current.main)
            .is_some_and(|subs| subs.require_completion);
        !required || self.can_complete_current_sub_state()
    }

    fn check_sub_completion(&mut self, current: &CompositeState) -> Result<(), EngineError> {
        if self.pipeline.is_dry_run() {
            self.pipeline
                .record(|| format!("skip can_complete {current}"));
            return Ok(());
        }
        if self.sub_completion_satisfied(current) {
            return Ok(());
        }
        Err(EngineError::SubStateIncomplete {
            state: current.main.clone(),
            sub_state: current.sub.clone().unwrap_or_default(),
        })
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            current: self.current.clone(),
            history: self.history.clone(),
            completed_at: self.completed_at,
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.current = checkpoint.current;
        self.history = checkpoint.history;
        self.completed_at = checkpoint.completed_at;
    }

    /// Record a forward position unless it repeats the current entry.
    fn advance_history(&mut self, position: &CompositeState) {
        if self.history.current() != Some(position) {
            self.history.push(position.clone());
        }
    }

    fn move_main(
        &mut self,
        target: CompositeState,
        action: Action,
        pass: Pass,
    ) -> Result<CompositeState, EngineError> {
        if !self.definition.contains(&target.main) {
            return Err(ConfigError::UnknownMainState(target.main).into());
        }
        let event = TransitionEvent {
            from: self.current.as_ref().map(|current| current.main.clone()),
            to: target.main.clone(),
            action,
        };
        self.pipeline.record(|| format!("transition {event}"));

        let saved = self.checkpoint();
        self.data.begin();
        match self.run_main_protocol(&event, &target, pass) {
            Ok(()) => {
                self.data.commit();
                tracing::debug!(
                    session = %self.id,
                    from = ?event.from,
                    to = %target,
                    action = %event.action,
                    "transition committed"
                );
                if let Some(callback) = self.callbacks.after_transition.clone() {
                    self.pipeline
                        .notify(&target, Stage::AfterTransition, || callback(&event));
                }
                if let Some(callback) = self.callbacks.on_state_changed.clone() {
                    self.pipeline
                        .notify(&target, Stage::StateChanged, || callback(&target.main));
                }
                Ok(target)
            }
            Err(err) => self.roll_back(saved, &format!("{event}"), err),
        }
    }

    fn run_main_protocol(
        &mut self,
        event: &TransitionEvent,
        target: &CompositeState,
        pass: Pass,
    ) -> Result<(), EngineError> {
        let validate = pass == VALIDATED;
        let subject = self
            .current
            .as_ref()
            .map(position_id)
            .unwrap_or_else(|| position_id(target));

        if let Some(callback) = self.callbacks.before_transition.clone() {
            self.pipeline
                .invoke(&subject, Stage::BeforeTransition, || callback(event))?;
        }

        if let Some(source) = self.current.clone() {
            let config = self.definition.require(&source.main)?;
            let exit_validator = config.validate_exit.clone();
            let exit_hook = config.on_exit.clone();
            let sub_exit_hook = source
                .sub
                .as_ref()
                .and_then(|sub| self.sub_config(&source.main, sub))
                .and_then(|sub| sub.on_exit.clone());

            if validate {
                self.pipeline.validate(
                    &source.main,
                    Stage::ValidateExit,
                    exit_validator.as_ref(),
                    &self.data,
                )?;
            }
            if let Some(callback) = self.callbacks.on_leave.clone() {
                self.pipeline.invoke(&source.main, Stage::Leave, || {
                    callback(&source.main, &self.data)
                })?;
            }
            if let Some(hook) = sub_exit_hook {
                self.pipeline
                    .invoke(&subject, Stage::SubExitHook, || hook(&mut self.data))?;
            }
            if let Some(hook) = exit_hook {
                self.pipeline
                    .invoke(&source.main, Stage::ExitHook, || hook(&mut self.data))?;
            }
        }

        if let Some(callback) = self.callbacks.on_transition.clone() {
            self.pipeline
                .notify(target, Stage::Transition, || callback(event));
        }

        match pass {
            Pass::Back => {
                self.history.step_back();
            }
            Pass::Forward { .. } => self.advance_history(target),
        }
        self.current = Some(target.clone());

        let config = self.definition.require(&target.main)?;
        let gate = config.entry_gate.clone();
        let entry_validator = config.validate_entry.clone();
        let enter_hook = config.on_enter.clone();
        let sub_enter_hook = target
            .sub
            .as_ref()
            .and_then(|sub| self.sub_config(&target.main, sub))
            .and_then(|sub| sub.on_enter.clone());

        if pass != Pass::Back {
            if let Some(gate) = gate {
                self.pipeline
                    .gate(&target.main, || gate.check(&self.data))?;
            }
        }
        if validate {
            self.pipeline.validate(
                &target.main,
                Stage::ValidateEntry,
                entry_validator.as_ref(),
                &self.data,
            )?;
        }
        if let Some(callback) = self.callbacks.on_enter.clone() {
            self.pipeline.invoke(&target.main, Stage::Enter, || {
                callback(&target.main, &mut self.data)
            })?;
        }
        if let Some(hook) = enter_hook {
            self.pipeline
                .invoke(&target.main, Stage::EnterHook, || hook(&mut self.data))?;
        }
        if let Some(hook) = sub_enter_hook {
            let entered = position_id(target);
            self.pipeline
                .invoke(&entered, Stage::SubEnterHook, || hook(&mut self.data))?;
        }

        if self.definition.is_final(&target.main) && self.completed_at.is_none() {
            let at = if self.pipeline.is_dry_run() {
                DateTime::<Utc>::UNIX_EPOCH
            } else {
                Utc::now()
            };
            self.completed_at = Some(at);
            self.data
                .set(COMPLETED_AT_KEY, Value::String(at.to_rfc3339()));
        }
        Ok(())
    }

    fn move_sub(&mut self, target: CompositeState, pass: Pass) -> Result<CompositeState, EngineError> {
        let current = self.require_current()?;
        if target == current {
            return Ok(current);
        }
        let label = format!("{current} -> {target}");
        self.pipeline.record(|| format!("sub_transition {label}"));

        let saved = self.checkpoint();
        self.data.begin();
        match self.run_sub_protocol(&current, &target, pass) {
            Ok(()) => {
                self.data.commit();
                tracing::debug!(session = %self.id, from = %current, to = %target, "sub-state changed");
                if let Some(callback) = self.on_sub_state_changed.clone() {
                    self.pipeline
                        .notify(&target, Stage::StateChanged, || callback(&target));
                }
                Ok(target)
            }
            Err(err) => self.roll_back(saved, &label, err),
        }
    }

    fn run_sub_protocol(
        &mut self,
        source: &CompositeState,
        target: &CompositeState,
        pass: Pass,
    ) -> Result<(), EngineError> {
        let leaving = source
            .sub
            .as_ref()
            .and_then(|sub| self.sub_config(&source.main, sub))
            .cloned();
        let entering = target
            .sub
            .as_ref()
            .and_then(|sub| self.sub_config(&target.main, sub))
            .and_then(|sub| sub.on_enter.clone());
        let source_id = position_id(source);

        if let Some(leaving) = leaving {
            if pass == VALIDATED {
                self.pipeline.validate(
                    &source_id,
                    Stage::SubValidate,
                    leaving.validate.as_ref(),
                    &self.data,
                )?;
            }
            if let Some(hook) = leaving.on_exit {
                self.pipeline
                    .invoke(&source_id, Stage::SubExitHook, || hook(&mut self.data))?;
            }
        }

        match pass {
            Pass::Back => {
                self.history.step_back();
            }
            Pass::Forward { .. } => self.advance_history(target),
        }
        self.current = Some(target.clone());

        if let Some(hook) = entering {
            let target_id = position_id(target);
            self.pipeline
                .invoke(&target_id, Stage::SubEnterHook, || hook(&mut self.data))?;
        }
        Ok(())
    }

    fn roll_back(
        &mut self,
        saved: Checkpoint,
        label: &str,
        err: EngineError,
    ) -> Result<CompositeState, EngineError> {
        let undone = self.data.rollback();
        self.restore(saved);
        self.pipeline.record(|| format!("rollback {label}: {err}"));
        tracing::warn!(
            session = %self.id,
            transition = label,
            error = %err,
            undone_writes = undone,
            "transition rolled back"
        );
        if err.is_validation() {
            self.report_validation_error(&err);
        }
        Err(err)
    }

    fn report_validation_error(&mut self, err: &EngineError) {
        let EngineError::Validation { state, message, .. } = err else {
            return;
        };
        if let Some(callback) = self.callbacks.on_validation_error.clone() {
            self.pipeline
                .notify(state, Stage::ValidationError, || callback(state, message));
        }
    }
}

/// Identifier used for a composite position in errors and the dry-run log.
fn position_id(position: &CompositeState) -> StateId {
    StateId::new(position.to_string())
}

fn not_allowed(state: &StateId, action: Action) -> EngineError {
    EngineError::ActionNotAllowed {
        state: state.clone(),
        action,
    }
}
