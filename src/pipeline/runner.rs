//! Gatekeeper for every validator, gate, hook, and notification call.
//!
//! Both engines route each invocation through a `Pipeline`, which is the
//! single place that consults the strict and dry-run flags.

use super::log::DryRunLog;
use super::options::EngineOptions;
use crate::core::{DataBag, HookError, StateId, Validator};
use crate::engine::EngineError;
use std::fmt;

/// Point in the transition protocol a call belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    BeforeTransition,
    ValidateNext,
    ValidateExit,
    Leave,
    ExitHook,
    Transition,
    EntryGate,
    ValidateEntry,
    Enter,
    EnterHook,
    AfterTransition,
    StateChanged,
    DataChange,
    Cancel,
    ValidationError,
    SubValidate,
    SubExitHook,
    SubEnterHook,
}

impl Stage {
    /// Name used in log entries and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeTransition => "before_transition",
            Self::ValidateNext => "validate_next",
            Self::ValidateExit => "validate_exit",
            Self::Leave => "on_leave",
            Self::ExitHook => "exit_hook",
            Self::Transition => "on_transition",
            Self::EntryGate => "entry_gate",
            Self::ValidateEntry => "validate_entry",
            Self::Enter => "on_enter",
            Self::EnterHook => "enter_hook",
            Self::AfterTransition => "after_transition",
            Self::StateChanged => "on_state_changed",
            Self::DataChange => "on_data_change",
            Self::Cancel => "on_cancel",
            Self::ValidationError => "on_validation_error",
            Self::SubValidate => "sub_validate",
            Self::SubExitHook => "sub_exit_hook",
            Self::SubEnterHook => "sub_enter_hook",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict/dry-run flags plus the dry-run log.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    options: EngineOptions,
    log: DryRunLog,
}

impl Pipeline {
    /// Runner with an empty log.
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            log: DryRunLog::new(),
        }
    }

    /// Current flags.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Whether hooks are suppressed.
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Whether validators are honored.
    pub fn is_strict(&self) -> bool {
        self.options.strict
    }

    /// Toggle dry-run mode.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.options.dry_run = dry_run;
    }

    /// Toggle strict mode.
    pub fn set_strict(&mut self, strict: bool) {
        self.options.strict = strict;
    }

    pub(crate) fn set_max_history(&mut self, max_history: usize) {
        self.options.max_history = max_history;
    }

    /// Entries recorded so far.
    pub fn log(&self) -> &DryRunLog {
        &self.log
    }

    /// Drop every log entry.
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Append to the dry-run log. The entry is only built in dry-run mode.
    pub fn record<F>(&mut self, entry: F)
    where
        F: FnOnce() -> String,
    {
        if self.options.dry_run {
            self.log.record(entry());
        }
    }

    /// Run a validator if one is set, honoring both flags.
    pub fn validate(
        &mut self,
        state: &StateId,
        stage: Stage,
        validator: Option<&Validator>,
        data: &DataBag,
    ) -> Result<(), EngineError> {
        match validator {
            Some(validator) => self.check(state, stage, || validator(data)),
            None => Ok(()),
        }
    }

    /// Run an arbitrary validation closure under the strict/dry-run rules.
    pub fn check<F>(&mut self, state: &StateId, stage: Stage, check: F) -> Result<(), EngineError>
    where
        F: FnOnce() -> Result<(), HookError>,
    {
        if self.options.dry_run {
            self.log.record(format!("skip {stage} {state}"));
            return Ok(());
        }
        if !self.options.strict {
            tracing::trace!(%state, %stage, "validation bypassed");
            return Ok(());
        }
        check().map_err(|err| EngineError::Validation {
            state: state.clone(),
            stage,
            message: err.message().to_string(),
        })
    }

    /// Run a hook that may reject the transition. Skipped in dry-run.
    pub fn invoke<F>(&mut self, state: &StateId, stage: Stage, hook: F) -> Result<(), EngineError>
    where
        F: FnOnce() -> Result<(), HookError>,
    {
        if self.options.dry_run {
            self.log.record(format!("skip {stage} {state}"));
            return Ok(());
        }
        hook().map_err(|err| EngineError::CallbackRejected {
            state: state.clone(),
            stage,
            message: err.message().to_string(),
        })
    }

    /// Fire a notification that cannot reject. Skipped in dry-run.
    pub fn notify<S, F>(&mut self, subject: &S, stage: Stage, notification: F)
    where
        S: fmt::Display + ?Sized,
        F: FnOnce(),
    {
        if self.options.dry_run {
            self.log.record(format!("skip {stage} {subject}"));
            return;
        }
        notification();
    }

    /// Evaluate an entry gate. Skipped in dry-run.
    pub fn gate<F>(&mut self, state: &StateId, gate: F) -> Result<(), EngineError>
    where
        F: FnOnce() -> bool,
    {
        if self.options.dry_run {
            self.log.record(format!("skip {} {state}", Stage::EntryGate));
            return Ok(());
        }
        if gate() {
            Ok(())
        } else {
            Err(EngineError::EntryRejected {
                state: state.clone(),
            })
        }
    }
}
