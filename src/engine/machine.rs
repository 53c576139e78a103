//! Flat wizard engine.

use super::callbacks::{Callbacks, TransitionEvent};
use super::definition::FlowDefinition;
use super::error::{ConfigError, EngineError};
use crate::core::{Action, DataBag, GlobalRule, History, StateConfig, StateId};
use crate::pipeline::{DryRunLog, EngineOptions, Pipeline, Stage};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Data-bag key holding the completion timestamp once a final state is reached.
pub const COMPLETED_AT_KEY: &str = "completed_at";

const START_ACTION: &str = "start";

/// How a move updates history and which checks it runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pass {
    Forward { validate: bool },
    Back,
}

/// Position-related state restored when a transition is rolled back.
struct Checkpoint {
    current: Option<StateId>,
    history: History<StateId>,
    completed_at: Option<DateTime<Utc>>,
}

/// Deterministic engine driving one sequential wizard session.
///
/// # Example
///
/// ```rust
/// use wizflow::core::{Action, StateConfig};
/// use wizflow::engine::Engine;
///
/// let mut engine = Engine::new();
/// engine.add_state(StateConfig::new("welcome").with_transition(Action::Next, "done")).unwrap();
/// engine.add_state(StateConfig::new("done")).unwrap();
/// engine.set_initial_state("welcome").unwrap();
/// engine.add_final_state("done").unwrap();
/// engine.validate().unwrap();
///
/// engine.start().unwrap();
/// assert_eq!(engine.next().unwrap(), "done");
/// assert!(engine.is_final());
/// ```
pub struct Engine {
    id: Uuid,
    definition: FlowDefinition,
    callbacks: Callbacks,
    pipeline: Pipeline,
    current: Option<StateId>,
    history: History<StateId>,
    data: DataBag,
    completed_at: Option<DateTime<Utc>>,
    validated: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Engine {
    /// Copies definition, position, data, and log into a new session id.
    fn clone(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition: self.definition.clone(),
            callbacks: self.callbacks.clone(),
            pipeline: self.pipeline.clone(),
            current: self.current.clone(),
            history: self.history.clone(),
            data: self.data.clone(),
            completed_at: self.completed_at,
            validated: self.validated,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("current", &self.current)
            .field("states", &self.definition.len())
            .field("history", &self.history.len())
            .field("options", self.pipeline.options())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Empty engine with default options.
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    /// Empty engine with the given options.
    pub fn with_options(options: EngineOptions) -> Self {
        Self::from_definition(FlowDefinition::new(), options)
    }

    /// Build an engine over an existing definition. Call `validate` before `start`.
    pub fn from_definition(definition: FlowDefinition, options: EngineOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition,
            callbacks: Callbacks::default(),
            history: History::new(options.max_history),
            pipeline: Pipeline::new(options),
            current: None,
            data: DataBag::new(),
            completed_at: None,
            validated: false,
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

    /// Change the history bound, dropping the oldest entries.
    pub fn set_max_history(&mut self, max_history: usize) {
        self.pipeline.set_max_history(max_history);
        self.history.set_max_len(max_history);
    }

    /// Replace every engine-wide callback.
    pub fn set_callbacks(&mut self, callbacks: Callbacks) {
        self.callbacks = callbacks;
    }

    /// Mutable access to the engine-wide callbacks.
    pub fn callbacks_mut(&mut self) -> &mut Callbacks {
        &mut self.callbacks
    }

    /// Declarations this engine runs.
    pub fn definition(&self) -> &FlowDefinition {
        &self.definition
    }

    // ---- declarations -------------------------------------------------

    /// Declare a state. Ids must be unique and non-empty.
    pub fn add_state(&mut self, config: StateConfig) -> Result<(), EngineError> {
        self.pipeline.record(|| format!("add_state {}", config.id));
        self.definition.add_state(config)?;
        self.validated = false;
        Ok(())
    }

    /// Set the state `start` enters.
    pub fn set_initial_state(&mut self, id: impl Into<StateId>) -> Result<(), EngineError> {
        let id = id.into();
        self.pipeline.record(|| format!("set_initial_state {id}"));
        self.definition.set_initial_state(id)?;
        self.validated = false;
        Ok(())
    }

    /// Mark a state as final.
    pub fn add_final_state(&mut self, id: impl Into<StateId>) -> Result<(), EngineError> {
        let id = id.into();
        self.pipeline.record(|| format!("add_final_state {id}"));
        self.definition.add_final_state(id)?;
        self.validated = false;
        Ok(())
    }

    /// Cancellation target written into spliced custom states.
    pub fn set_cancel_state(&mut self, id: impl Into<StateId>) -> Result<(), EngineError> {
        let id = id.into();
        self.pipeline.record(|| format!("set_cancel_state {id}"));
        self.definition.set_cancel_state(id)?;
        Ok(())
    }

    /// Add a global rule.
    pub fn add_transition(&mut self, rule: GlobalRule) -> Result<(), EngineError> {
        self.pipeline.record(|| {
            format!(
                "add_transition {} -> {} [{}] priority={}",
                rule.from, rule.to, rule.action, rule.priority
            )
        });
        self.definition.add_transition(rule)?;
        self.validated = false;
        Ok(())
    }

    /// Check the definition, reporting every problem at once.
    pub fn validate(&mut self) -> Result<(), EngineError> {
        self.pipeline.record(|| "validate".to_string());
        self.definition.validate()?;
        self.validated = true;
        Ok(())
    }

    /// Whether `validate` passed since the last declaration change.
    pub fn is_validated(&self) -> bool {
        self.validated
    }

    // ---- navigation ---------------------------------------------------

    /// Clear the current position and enter the initial state.
    pub fn start(&mut self) -> Result<StateId, EngineError> {
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

        let result = self.transition_to(
            initial,
            Action::custom(START_ACTION),
            Pass::Forward { validate: true },
        );
        if result.is_err() {
            self.restore(saved);
        }
        result
    }

    /// Validate the current state and follow its `next` route.
    ///
    /// Target precedence: dynamic next-state function, static `next`
    /// entry, then the best matching global rule.
    pub fn next(&mut self) -> Result<StateId, EngineError> {
        let current = self.require_current()?;
        let config = self.definition.require(&current)?;
        if !config.can_go_next {
            return Err(not_allowed(&current, Action::Next));
        }
        let validator = config.validate_next.clone();
        self.pipeline.record(|| format!("next from {current}"));

        if let Err(err) =
            self.pipeline
                .validate(&current, Stage::ValidateNext, validator.as_ref(), &self.data)
        {
            tracing::info!(session = %self.id, state = %current, error = %err, "next rejected by validation");
            self.report_validation_error(&err);
            return Err(err);
        }

        let target = self.resolve_next(&current)?;
        self.transition_to(target, Action::Next, Pass::Forward { validate: true })
    }

    /// Return to the previous history entry.
    ///
    /// Back navigation skips every validator and entry gate; only a hook
    /// or notification rejecting the move can stop it.
    pub fn back(&mut self) -> Result<StateId, EngineError> {
        let current = self.require_current()?;
        let config = self.definition.require(&current)?;
        if !config.can_go_back {
            return Err(not_allowed(&current, Action::Back));
        }
        let target = self
            .history
            .previous()
            .cloned()
            .ok_or(EngineError::InsufficientHistory)?;
        self.pipeline.record(|| format!("back from {current}"));
        self.transition_to(target, Action::Back, Pass::Back)
    }

    /// Follow the `skip` route (falling back to `next`) without validation.
    pub fn skip(&mut self) -> Result<StateId, EngineError> {
        let current = self.require_current()?;
        let config = self.definition.require(&current)?;
        if !config.can_skip {
            return Err(not_allowed(&current, Action::Skip));
        }
        self.pipeline.record(|| format!("skip from {current}"));
        let target = self.resolve_skip(&current)?;
        self.transition_to(target, Action::Skip, Pass::Forward { validate: false })
    }

    /// Report cancellation to the collaborator. The position does not change.
    pub fn cancel(&mut self) -> Result<(), EngineError> {
        let current = self.require_current()?;
        let config = self.definition.require(&current)?;
        if !config.can_cancel {
            return Err(not_allowed(&current, Action::Cancel));
        }
        self.pipeline.record(|| format!("cancel at {current}"));
        tracing::info!(session = %self.id, state = %current, "cancel requested");

        if let Some(callback) = self.callbacks.on_cancel.clone() {
            let snapshot = self.data.snapshot();
            self.pipeline
                .notify(&current, Stage::Cancel, || callback(&current, &snapshot));
        }
        Ok(())
    }

    /// Generic transition for any action.
    ///
    /// The built-in `next`, `back`, and `skip` delegate to their dedicated
    /// operations. Every other action resolves through the state's table and
    /// then global rules; the dynamic next-state function is reserved for `next`.
    pub fn transition(&mut self, action: impl Into<Action>) -> Result<StateId, EngineError> {
        let action = action.into();
        match action {
            Action::Next => self.next(),
            Action::Back => self.back(),
            Action::Skip => self.skip(),
            action => {
                let current = self.require_current()?;
                let config = self.definition.require(&current)?;
                if !config.allows(&action) {
                    return Err(not_allowed(&current, action));
                }
                self.pipeline
                    .record(|| format!("transition {action} from {current}"));
                let target = self.resolve_target(&current, &action)?;
                self.transition_to(target, action, Pass::Forward { validate: true })
            }
        }
    }

    /// Whether `action` is currently permitted and has somewhere to go.
    pub fn can_transition(&self, action: &Action) -> bool {
        let Some(current) = self.current.as_ref() else {
            return false;
        };
        let Some(config) = self.definition.state(current) else {
            return false;
        };
        if !config.allows(action) {
            return false;
        }
        match action {
            Action::Back => self.history.len() > 1,
            Action::Cancel => true,
            Action::Next => self.resolve_next(current).is_ok(),
            Action::Skip => self.resolve_skip(current).is_ok(),
            custom => self.resolve_target(current, custom).is_ok(),
        }
    }

    /// Built-in actions first, then custom actions in name order.
    pub fn available_actions(&self) -> Vec<Action> {
        let Some(current) = self.current.as_ref() else {
            return Vec::new();
        };
        let mut actions: Vec<Action> = [Action::Next, Action::Back, Action::Skip, Action::Cancel]
            .into_iter()
            .filter(|action| self.can_transition(action))
            .collect();

        let mut custom: BTreeSet<Action> = BTreeSet::new();
        if let Some(config) = self.definition.state(current) {
            custom.extend(config.transitions.keys().filter(|a| !a.is_builtin()).cloned());
        }
        custom.extend(
            self.definition
                .rules()
                .iter()
                .filter(|rule| rule.from == *current && !rule.action.is_builtin())
                .map(|rule| rule.action.clone()),
        );
        actions.extend(custom.into_iter().filter(|action| self.can_transition(action)));
        actions
    }

    // ---- data ---------------------------------------------------------

    /// Write to the data bag and notify the current state's data-change hook.
    pub fn set_data(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        self.pipeline.record(|| format!("set_data {key}={value}"));
        let previous = self.data.set(key.clone(), value.clone());

        let subject = self
            .current
            .clone()
            .unwrap_or_else(|| StateId::from("-"));
        let state_hook = self
            .definition
            .state(&subject)
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

    /// Current state, once started.
    pub fn current_state(&self) -> Option<&StateId> {
        self.current.as_ref()
    }

    /// Whether `start` has succeeded.
    pub fn is_started(&self) -> bool {
        self.current.is_some()
    }

    /// Whether the current state is final.
    pub fn is_final(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| self.definition.is_final(current))
    }

    /// Visited states, oldest first; the last entry is the current state.
    pub fn history(&self) -> Vec<StateId> {
        self.history.entries()
    }

    /// States undone by `back`, most recently undone last.
    pub fn future(&self) -> Vec<StateId> {
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

    /// Clear position, history, data, and completion. Declarations are kept.
    pub fn reset(&mut self) {
        self.pipeline.record(|| "reset".to_string());
        tracing::debug!(session = %self.id, "engine reset");
        self.current = None;
        self.history.clear();
        self.data.clear();
        self.completed_at = None;
    }

    /// Fresh dry-run engine over the same definition, with empty data, history, and log.
    pub fn dry_run_copy(&self) -> Engine {
        let mut options = self.options().clone();
        options.dry_run = true;
        let mut copy = Engine::from_definition(self.definition.clone(), options);
        copy.callbacks = self.callbacks.clone();
        copy.validated = self.validated;
        copy
    }

    /// Take over the session of an engine built from an older definition.
    ///
    /// Position, data, history with its redo stack, flags, dry-run log, and
    /// callbacks all move across. History entries whose state no longer
    /// exists are dropped; the position is kept only when the state is still
    /// declared.
    pub(crate) fn carry_over(&mut self, previous: &Engine) {
        self.data = previous.data.clone();
        self.completed_at = previous.completed_at;
        self.pipeline = previous.pipeline.clone();
        self.callbacks = previous.callbacks.clone();
        self.history = previous.history.clone();
        let definition = &self.definition;
        self.history.retain(|state| definition.contains(state));
        self.current = previous
            .current
            .clone()
            .filter(|state| self.definition.contains(state));
        tracing::debug!(
            session = %self.id,
            from_session = %previous.id,
            current = ?self.current,
            "session carried over"
        );
    }

    // ---- protocol -----------------------------------------------------

    fn require_current(&self) -> Result<StateId, EngineError> {
        self.current.clone().ok_or(EngineError::NotStarted)
    }

    fn resolve_next(&self, current: &StateId) -> Result<StateId, EngineError> {
        self.definition.route_next(current, &self.data)
    }

    fn resolve_skip(&self, current: &StateId) -> Result<StateId, EngineError> {
        self.definition.route_skip(current, &self.data)
    }

    fn resolve_target(&self, current: &StateId, action: &Action) -> Result<StateId, EngineError> {
        self.definition.route(current, action, &self.data)
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

    /// Run the transition protocol into `target`, rolling everything back on failure.
    fn transition_to(
        &mut self,
        target: StateId,
        action: Action,
        pass: Pass,
    ) -> Result<StateId, EngineError> {
        if !self.definition.contains(&target) {
            return Err(ConfigError::UnknownState(target).into());
        }
        let event = TransitionEvent {
            from: self.current.clone(),
            to: target,
            action,
        };
        self.pipeline.record(|| format!("transition {event}"));

        let saved = self.checkpoint();
        self.data.begin();
        match self.run_protocol(&event, pass) {
            Ok(()) => {
                self.data.commit();
                tracing::debug!(
                    session = %self.id,
                    from = ?event.from,
                    to = %event.to,
                    action = %event.action,
                    "transition committed"
                );
                self.finish(&event);
                Ok(event.to)
            }
            Err(err) => {
                let undone = self.data.rollback();
                self.restore(saved);
                self.pipeline.record(|| format!("rollback {event}: {err}"));
                tracing::warn!(
                    session = %self.id,
                    %event,
                    error = %err,
                    undone_writes = undone,
                    "transition rolled back"
                );
                if err.is_validation() {
                    self.report_validation_error(&err);
                }
                Err(err)
            }
        }
    }

    fn run_protocol(&mut self, event: &TransitionEvent, pass: Pass) -> Result<(), EngineError> {
        let validate = pass == Pass::Forward { validate: true };
        let subject = event.from.as_ref().unwrap_or(&event.to);

        if let Some(callback) = self.callbacks.before_transition.clone() {
            self.pipeline
                .invoke(subject, Stage::BeforeTransition, || callback(event))?;
        }

        if let Some(source) = &event.from {
            let config = self.definition.require(source)?;
            let exit_validator = config.validate_exit.clone();
            let exit_hook = config.on_exit.clone();

            if validate {
                self.pipeline.validate(
                    source,
                    Stage::ValidateExit,
                    exit_validator.as_ref(),
                    &self.data,
                )?;
            }
            if let Some(callback) = self.callbacks.on_leave.clone() {
                self.pipeline
                    .invoke(source, Stage::Leave, || callback(source, &self.data))?;
            }
            if let Some(hook) = exit_hook {
                self.pipeline
                    .invoke(source, Stage::ExitHook, || hook(&mut self.data))?;
            }
        }

        if let Some(callback) = self.callbacks.on_transition.clone() {
            self.pipeline
                .notify(&event.to, Stage::Transition, || callback(event));
        }

        match pass {
            Pass::Back => {
                self.history.step_back();
            }
            Pass::Forward { .. } => self.history.push(event.to.clone()),
        }
        self.current = Some(event.to.clone());

        let config = self.definition.require(&event.to)?;
        let gate = config.entry_gate.clone();
        let entry_validator = config.validate_entry.clone();
        let enter_hook = config.on_enter.clone();

        if pass != Pass::Back {
            if let Some(gate) = gate {
                self.pipeline.gate(&event.to, || gate.check(&self.data))?;
            }
        }
        if validate {
            self.pipeline.validate(
                &event.to,
                Stage::ValidateEntry,
                entry_validator.as_ref(),
                &self.data,
            )?;
        }
        if let Some(callback) = self.callbacks.on_enter.clone() {
            self.pipeline
                .invoke(&event.to, Stage::Enter, || callback(&event.to, &mut self.data))?;
        }
        if let Some(hook) = enter_hook {
            self.pipeline
                .invoke(&event.to, Stage::EnterHook, || hook(&mut self.data))?;
        }

        if self.definition.is_final(&event.to) && self.completed_at.is_none() {
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

    fn finish(&mut self, event: &TransitionEvent) {
        if let Some(callback) = self.callbacks.after_transition.clone() {
            self.pipeline
                .notify(&event.to, Stage::AfterTransition, || callback(event));
        }
        if let Some(callback) = self.callbacks.on_state_changed.clone() {
            self.pipeline
                .notify(&event.to, Stage::StateChanged, || callback(&event.to));
        }
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

fn not_allowed(state: &StateId, action: Action) -> EngineError {
    EngineError::ActionNotAllowed {
        state: state.clone(),
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Guard, HookError};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn installer() -> Engine {
        let mut engine = Engine::new();
        engine
            .add_state(StateConfig::new("welcome").with_transition(Action::Next, "license"))
            .unwrap();
        let mut license = StateConfig::new("license").with_transition(Action::Next, "install");
        license.validate_next = Some(Arc::new(|data: &DataBag| {
            if data.get_bool("accepted") == Some(true) {
                Ok(())
            } else {
                Err(HookError::new("license must be accepted"))
            }
        }));
        engine.add_state(license).unwrap();
        engine
            .add_state(StateConfig::new("install").with_transition(Action::Next, "complete"))
            .unwrap();
        engine.add_state(StateConfig::new("complete")).unwrap();
        engine.set_initial_state("welcome").unwrap();
        engine.add_final_state("complete").unwrap();
        engine.validate().unwrap();
        engine
    }

    #[test]
    fn start_enters_initial_state() {
        let mut engine = installer();
        assert_eq!(engine.start().unwrap(), "welcome");
        assert_eq!(engine.history(), vec![StateId::from("welcome")]);
    }

    #[test]
    fn operations_before_start_fail() {
        let mut engine = installer();
        assert_eq!(engine.next().unwrap_err(), EngineError::NotStarted);
        assert!(!engine.can_transition(&Action::Next));
        assert!(engine.available_actions().is_empty());
    }

    #[test]
    fn start_without_initial_state_is_config_error() {
        let mut engine = Engine::new();
        engine.add_state(StateConfig::new("a")).unwrap();
        let err = engine.start().unwrap_err();
        assert_eq!(err, EngineError::Config(ConfigError::MissingInitialState));
    }

    #[test]
    fn failed_validation_keeps_position() {
        let mut engine = installer();
        engine.start().unwrap();
        engine.next().unwrap();
        engine.set_data("accepted", json!(false));

        let err = engine.next().unwrap_err();
        assert!(err.is_validation());
        assert_eq!(engine.current_state().unwrap(), "license");
        assert_eq!(engine.history().len(), 2);
    }

    #[test]
    fn accepted_license_reaches_completion() {
        let mut engine = installer();
        engine.start().unwrap();
        engine.next().unwrap();
        engine.set_data("accepted", json!(true));

        engine.next().unwrap();
        assert_eq!(engine.next().unwrap(), "complete");
        assert!(engine.is_final());
        assert!(engine.completed_at().is_some());
        assert!(engine.get_data(COMPLETED_AT_KEY).is_some());
    }

    #[test]
    fn validation_error_notification_fires() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut engine = installer();
        engine.callbacks_mut().on_validation_error = Some(Arc::new(move |state: &StateId, message: &str| {
            sink.lock().push(format!("{state}: {message}"));
        }));
        engine.start().unwrap();
        engine.next().unwrap();
        let _ = engine.next();

        assert_eq!(
            seen.lock().as_slice(),
            &["license: license must be accepted".to_string()]
        );
    }

    #[test]
    fn permissive_mode_ignores_validators() {
        let mut engine = installer();
        engine.set_strict(false);
        engine.start().unwrap();
        engine.next().unwrap();
        assert_eq!(engine.next().unwrap(), "install");
    }

    #[test]
    fn protocol_runs_in_order() {
        let calls = Arc::new(Mutex::new(Vec::<String>::new()));
        let mut engine = Engine::new();

        let log = calls.clone();
        let mut a = StateConfig::new("a").with_transition(Action::Next, "b");
        a.validate_exit = Some(Arc::new({
            let log = log.clone();
            move |_: &DataBag| {
                log.lock().push("validate_exit a".into());
                Ok(())
            }
        }));
        a.on_exit = Some(Arc::new({
            let log = log.clone();
            move |_: &mut DataBag| {
                log.lock().push("exit_hook a".into());
                Ok(())
            }
        }));
        let mut b = StateConfig::new("b");
        b.entry_gate = Some(Guard::new({
            let log = log.clone();
            move |_| {
                log.lock().push("gate b".into());
                true
            }
        }));
        b.validate_entry = Some(Arc::new({
            let log = log.clone();
            move |_: &DataBag| {
                log.lock().push("validate_entry b".into());
                Ok(())
            }
        }));
        b.on_enter = Some(Arc::new({
            let log = log.clone();
            move |_: &mut DataBag| {
                log.lock().push("enter_hook b".into());
                Ok(())
            }
        }));
        engine.add_state(a).unwrap();
        engine.add_state(b).unwrap();
        engine.set_initial_state("a").unwrap();

        let callbacks = Callbacks {
            before_transition: Some(Arc::new({
                let log = log.clone();
                move |event: &TransitionEvent| {
                    log.lock().push(format!("before {}", event.to));
                    Ok(())
                }
            })),
            on_leave: Some(Arc::new({
                let log = log.clone();
                move |state: &StateId, _: &DataBag| {
                    log.lock().push(format!("on_leave {state}"));
                    Ok(())
                }
            })),
            on_transition: Some(Arc::new({
                let log = log.clone();
                move |event: &TransitionEvent| log.lock().push(format!("on_transition {}", event.to))
            })),
            on_enter: Some(Arc::new({
                let log = log.clone();
                move |state: &StateId, _: &mut DataBag| {
                    log.lock().push(format!("on_enter {state}"));
                    Ok(())
                }
            })),
            after_transition: Some(Arc::new({
                let log = log.clone();
                move |event: &TransitionEvent| log.lock().push(format!("after {}", event.to))
            })),
            ..Callbacks::default()
        };
        engine.set_callbacks(callbacks);
        engine.start().unwrap();
        calls.lock().clear();

        engine.next().unwrap();
        assert_eq!(
            calls.lock().as_slice(),
            &[
                "before b",
                "validate_exit a",
                "on_leave a",
                "exit_hook a",
                "on_transition b",
                "gate b",
                "validate_entry b",
                "on_enter b",
                "enter_hook b",
                "after b",
            ]
        );
    }

    #[test]
    fn rejected_enter_rolls_back_position_history_and_data() {
        let mut engine = Engine::new();
        engine
            .add_state(StateConfig::new("a").with_transition(Action::Next, "b"))
            .unwrap();
        let mut b = StateConfig::new("b");
        b.on_enter = Some(Arc::new(|data: &mut DataBag| {
            data.set("written_by_b", json!(true));
            Err("disk full".into())
        }));
        engine.add_state(b).unwrap();
        engine.set_initial_state("a").unwrap();
        engine.start().unwrap();

        let err = engine.next().unwrap_err();
        assert!(matches!(err, EngineError::CallbackRejected { stage: Stage::EnterHook, .. }));
        assert_eq!(engine.current_state().unwrap(), "a");
        assert_eq!(engine.history().len(), 1);
        assert!(engine.get_data("written_by_b").is_none());
    }

    #[test]
    fn rejected_exit_restores_data_written_before_failing() {
        let mut engine = Engine::new();
        let mut a = StateConfig::new("a").with_transition(Action::Next, "b");
        a.on_exit = Some(Arc::new(|data: &mut DataBag| -> Result<(), HookError> {
            data.set("draft", json!("overwritten"));
            data.set("written_by_a", json!(true));
            Err("cannot leave".into())
        }));
        engine.add_state(a).unwrap();
        engine.add_state(StateConfig::new("b")).unwrap();
        engine.set_initial_state("a").unwrap();
        engine.start().unwrap();
        engine.set_data("draft", json!("kept"));
        let before = engine.get_all_data();

        let err = engine.next().unwrap_err();
        assert!(matches!(err, EngineError::CallbackRejected { stage: Stage::ExitHook, .. }));
        assert_eq!(engine.current_state().unwrap(), "a");
        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.get_all_data(), before);
    }

    #[test]
    fn rejected_before_transition_keeps_position() {
        let mut engine = installer();
        engine.start().unwrap();
        engine.set_callbacks(Callbacks {
            before_transition: Some(Arc::new(|_: &TransitionEvent| -> Result<(), HookError> {
                Err("locked".into())
            })),
            ..Callbacks::default()
        });

        let err = engine.next().unwrap_err();
        assert!(matches!(
            err,
            EngineError::CallbackRejected { stage: Stage::BeforeTransition, .. }
        ));
        assert_eq!(engine.current_state().unwrap(), "welcome");
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn closed_gate_rejects_entry() {
        let mut engine = Engine::new();
        engine
            .add_state(StateConfig::new("a").with_transition(Action::Next, "b"))
            .unwrap();
        let mut b = StateConfig::new("b");
        b.entry_gate = Some(Guard::has("ready"));
        engine.add_state(b).unwrap();
        engine.set_initial_state("a").unwrap();
        engine.start().unwrap();

        assert!(matches!(engine.next(), Err(EngineError::EntryRejected { .. })));
        engine.set_data("ready", json!(1));
        assert_eq!(engine.next().unwrap(), "b");
    }

    #[test]
    fn dynamic_next_overrides_table() {
        let mut engine = Engine::new();
        let mut choose = StateConfig::new("choose").with_transition(Action::Next, "express");
        choose.next_state = Some(Arc::new(|data: &DataBag| {
            (data.get_str("mode") == Some("custom")).then(|| StateId::from("custom"))
        }));
        engine.add_state(choose).unwrap();
        engine.add_state(StateConfig::new("express")).unwrap();
        engine.add_state(StateConfig::new("custom")).unwrap();
        engine.set_initial_state("choose").unwrap();

        engine.start().unwrap();
        engine.set_data("mode", json!("custom"));
        assert_eq!(engine.next().unwrap(), "custom");

        engine.start().unwrap();
        engine.set_data("mode", json!("express"));
        assert_eq!(engine.next().unwrap(), "express");
    }

    #[test]
    fn global_rule_used_when_table_has_no_entry() {
        let mut engine = Engine::new();
        engine.add_state(StateConfig::new("check")).unwrap();
        engine.add_state(StateConfig::new("ok")).unwrap();
        engine.add_state(StateConfig::new("retry")).unwrap();
        engine.set_initial_state("check").unwrap();
        engine
            .add_transition(
                GlobalRule::new("check", "ok", Action::Next).when(|d| d.get_bool("passed") == Some(true)),
            )
            .unwrap();
        engine
            .add_transition(GlobalRule::new("check", "retry", Action::Next).priority(-1))
            .unwrap();

        engine.start().unwrap();
        assert_eq!(engine.next().unwrap(), "retry");

        engine.start().unwrap();
        engine.set_data("passed", json!(true));
        assert_eq!(engine.next().unwrap(), "ok");
    }

    #[test]
    fn missing_target_is_reported() {
        let mut engine = Engine::new();
        engine.add_state(StateConfig::new("only")).unwrap();
        engine.set_initial_state("only").unwrap();
        engine.start().unwrap();
        assert!(matches!(engine.next(), Err(EngineError::NoTarget { .. })));
    }

    #[test]
    fn back_skips_validation_and_redo_restores_state() {
        let mut engine = installer();
        engine.start().unwrap();
        engine.next().unwrap();
        engine.set_data("accepted", json!(true));
        engine.next().unwrap();

        engine.set_data("accepted", json!(false));
        assert_eq!(engine.back().unwrap(), "license");
        assert_eq!(engine.future(), vec![StateId::from("install")]);

        engine.set_data("accepted", json!(true));
        assert_eq!(engine.next().unwrap(), "install");
        assert!(engine.future().is_empty());
    }

    #[test]
    fn back_requires_history() {
        let mut engine = installer();
        engine.start().unwrap();
        assert_eq!(engine.back().unwrap_err(), EngineError::InsufficientHistory);
        assert!(!engine.can_transition(&Action::Back));
    }

    #[test]
    fn back_respects_capability_flag() {
        let mut engine = Engine::new();
        engine
            .add_state(StateConfig::new("a").with_transition(Action::Next, "b"))
            .unwrap();
        let mut b = StateConfig::new("b");
        b.can_go_back = false;
        engine.add_state(b).unwrap();
        engine.set_initial_state("a").unwrap();
        engine.start().unwrap();
        engine.next().unwrap();
        assert!(matches!(engine.back(), Err(EngineError::ActionNotAllowed { .. })));
    }

    #[test]
    fn skip_bypasses_validation_and_falls_back_to_next() {
        let mut engine = installer();
        engine.start().unwrap();
        engine.next().unwrap();
        assert!(matches!(engine.skip(), Err(EngineError::ActionNotAllowed { .. })));

        let mut engine = Engine::new();
        let mut optional = StateConfig::new("optional").with_transition(Action::Next, "end");
        optional.can_skip = true;
        optional.validate_exit = Some(Arc::new(|_: &DataBag| Err("never valid".into())));
        engine.add_state(optional).unwrap();
        engine.add_state(StateConfig::new("end")).unwrap();
        engine.set_initial_state("optional").unwrap();
        engine.start().unwrap();

        assert!(engine.next().is_err());
        assert_eq!(engine.skip().unwrap(), "end");
    }

    #[test]
    fn cancel_reports_snapshot_without_moving() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let mut engine = installer();
        engine.callbacks_mut().on_cancel = Some(Arc::new(move |state: &StateId, data: &BTreeMap<String, Value>| {
            *sink.lock() = Some((state.clone(), data.clone()));
        }));
        engine.start().unwrap();
        engine.set_data("progress", json!(10));
        engine.cancel().unwrap();

        assert_eq!(engine.current_state().unwrap(), "welcome");
        let (state, data) = seen.lock().clone().unwrap();
        assert_eq!(state, "welcome");
        assert_eq!(data.get("progress"), Some(&json!(10)));
    }

    #[test]
    fn custom_action_uses_table_then_rules() {
        let mut engine = Engine::new();
        engine
            .add_state(StateConfig::new("failed").with_transition("retry", "check"))
            .unwrap();
        engine.add_state(StateConfig::new("check")).unwrap();
        engine.set_initial_state("failed").unwrap();
        engine.start().unwrap();

        assert!(engine.can_transition(&Action::custom("retry")));
        assert!(!engine.can_transition(&Action::custom("abort")));
        assert_eq!(engine.transition("retry").unwrap(), "check");
    }

    #[test]
    fn available_actions_lists_builtins_then_custom() {
        let mut engine = Engine::new();
        let mut a = StateConfig::new("a")
            .with_transition(Action::Next, "b")
            .with_transition("zeta", "b")
            .with_transition("alpha", "b");
        a.can_skip = true;
        engine.add_state(a).unwrap();
        engine.add_state(StateConfig::new("b")).unwrap();
        engine.set_initial_state("a").unwrap();
        engine.start().unwrap();

        assert_eq!(
            engine.available_actions(),
            vec![
                Action::Next,
                Action::Skip,
                Action::Cancel,
                Action::custom("alpha"),
                Action::custom("zeta"),
            ]
        );
    }

    #[test]
    fn history_is_bounded() {
        let mut engine = Engine::with_options(EngineOptions::default().with_max_history(3));
        let mut loop_state = StateConfig::new("a").with_transition(Action::Next, "b");
        loop_state.can_go_back = true;
        engine.add_state(loop_state).unwrap();
        engine
            .add_state(StateConfig::new("b").with_transition(Action::Next, "a"))
            .unwrap();
        engine.set_initial_state("a").unwrap();
        engine.start().unwrap();
        for _ in 0..10 {
            engine.next().unwrap();
        }
        assert_eq!(engine.history().len(), 3);
    }

    #[test]
    fn data_change_hook_sees_writes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut engine = Engine::new();
        let mut install = StateConfig::new("install");
        install.on_data_change = Some(Arc::new(move |key: &str, value: &Value| {
            sink.lock().push(format!("{key}={value}"));
        }));
        engine.add_state(install).unwrap();
        engine.set_initial_state("install").unwrap();
        engine.start().unwrap();

        assert_eq!(engine.set_data("progress", json!(50)), None);
        assert_eq!(engine.set_data("progress", json!(100)), Some(json!(50)));
        assert_eq!(seen.lock().as_slice(), &["progress=50", "progress=100"]);
    }

    #[test]
    fn reset_clears_session_but_keeps_definition() {
        let mut engine = installer();
        engine.start().unwrap();
        engine.set_data("accepted", json!(true));
        engine.reset();

        assert!(engine.current_state().is_none());
        assert!(engine.history().is_empty());
        assert!(engine.get_all_data().is_empty());
        assert_eq!(engine.start().unwrap(), "welcome");
    }

    #[test]
    fn clone_is_independent_session() {
        let mut engine = installer();
        engine.start().unwrap();
        let mut copy = engine.clone();
        assert_ne!(copy.id(), engine.id());

        copy.next().unwrap();
        assert_eq!(engine.current_state().unwrap(), "welcome");
        assert_eq!(copy.current_state().unwrap(), "license");
    }

    #[test]
    fn dry_run_uses_epoch_completion_and_skips_validators() {
        let mut engine = installer().dry_run_copy();
        engine.start().unwrap();
        engine.next().unwrap();
        engine.next().unwrap();
        engine.next().unwrap();

        assert!(engine.is_final());
        assert_eq!(engine.completed_at(), Some(DateTime::<Utc>::UNIX_EPOCH));
        assert!(engine.dry_run_log().contains("skip validate_next license"));
    }

    #[test]
    fn undeclared_dynamic_target_is_config_error() {
        let mut engine = Engine::new();
        let mut a = StateConfig::new("a");
        a.next_state = Some(Arc::new(|_: &DataBag| Some(StateId::from("ghost"))));
        engine.add_state(a).unwrap();
        engine.set_initial_state("a").unwrap();
        engine.start().unwrap();

        assert_eq!(
            engine.next().unwrap_err(),
            EngineError::Config(ConfigError::UnknownState("ghost".into()))
        );
        assert_eq!(engine.current_state().unwrap(), "a");
    }
}
