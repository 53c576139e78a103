//! End-to-end wizard sessions across the public API.

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;
use wizflow::builder::{FlowBuilder, StateBuilder};
use wizflow::core::{Action, DataBag, Guard, HookError, StateConfig, StateId};
use wizflow::custom::{custom_data_key, CustomStateHandler, FlowController, InsertionPoint};
use wizflow::engine::{Callbacks, Engine, EngineError, FlowDefinition, COMPLETED_AT_KEY};
use wizflow::hierarchy::{CompositeState, HierarchicalEngine, MainStateConfig, SubStateConfig};
use wizflow::pipeline::EngineOptions;
use wizflow::session::{Completion, Session};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn license_gate(data: &DataBag) -> Result<(), HookError> {
    match data.get_bool("accepted") {
        Some(true) => Ok(()),
        _ => Err("license must be accepted".into()),
    }
}

fn installer() -> Engine {
    FlowBuilder::new()
        .state(StateBuilder::new("welcome").next("license"))
        .state(
            StateBuilder::new("license")
                .next("install")
                .validate_next(license_gate),
        )
        .state(StateBuilder::new("install").next("complete"))
        .state(StateBuilder::new("complete"))
        .initial("welcome")
        .final_state("complete")
        .build()
        .unwrap()
}

fn installer_definition() -> FlowDefinition {
    let mut def = FlowDefinition::new();
    def.add_state(StateConfig::new("welcome").with_transition(Action::Next, "license"))
        .unwrap();
    let mut license = StateConfig::new("license").with_transition(Action::Next, "install");
    license.validate_next = Some(Arc::new(license_gate));
    def.add_state(license).unwrap();
    def.add_state(StateConfig::new("install").with_transition(Action::Next, "complete"))
        .unwrap();
    def.add_state(StateConfig::new("complete")).unwrap();
    def.set_initial_state("welcome").unwrap();
    def.add_final_state("complete").unwrap();
    def
}

#[test]
fn license_flow_completes_once_accepted() {
    init_tracing();
    let rejections = Arc::new(AtomicUsize::new(0));
    let counter = rejections.clone();

    let mut engine = installer();
    engine.set_callbacks(Callbacks {
        on_validation_error: Some(Arc::new(move |state: &StateId, message: &str| {
            assert_eq!(state, "license");
            assert_eq!(message, "license must be accepted");
            counter.fetch_add(1, Ordering::SeqCst);
        })),
        ..Callbacks::default()
    });

    assert_eq!(engine.start().unwrap(), "welcome");
    assert_eq!(engine.next().unwrap(), "license");

    engine.set_data("accepted", json!(false));
    match engine.next() {
        Err(EngineError::Validation { state, .. }) => assert_eq!(state, "license"),
        other => panic!("Expected validation failure, got {other:?}"),
    }
    assert_eq!(engine.current_state().unwrap(), "license");
    assert_eq!(rejections.load(Ordering::SeqCst), 1);

    engine.set_data("accepted", json!(true));
    assert_eq!(engine.next().unwrap(), "install");
    assert_eq!(engine.next().unwrap(), "complete");

    assert!(engine.is_final());
    assert!(engine.completed_at().is_some());
    assert!(engine.get_data(COMPLETED_AT_KEY).is_some());
    let history: Vec<String> = engine.history().iter().map(ToString::to_string).collect();
    assert_eq!(history, vec!["welcome", "license", "install", "complete"]);
}

#[test]
fn back_returns_along_history() {
    let mut engine = installer();
    engine.start().unwrap();
    engine.next().unwrap();
    engine.set_data("accepted", json!(true));
    engine.next().unwrap();

    assert_eq!(engine.back().unwrap(), "license");
    assert_eq!(engine.back().unwrap(), "welcome");
    assert!(matches!(engine.back(), Err(EngineError::InsufficientHistory)));
    assert_eq!(engine.get_data("accepted"), Some(&json!(true)));
}

#[test]
fn dry_run_reports_protocol_without_side_effects() {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();

    let mut engine = installer();
    engine.set_callbacks(Callbacks {
        on_state_changed: Some(Arc::new(move |_: &StateId| {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
        ..Callbacks::default()
    });
    let mut rehearsal = engine.dry_run_copy();

    rehearsal.start().unwrap();
    rehearsal.next().unwrap();
    assert_eq!(rehearsal.next().unwrap(), "install");
    rehearsal.next().unwrap();

    assert!(rehearsal.is_final());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(!rehearsal.dry_run_log().is_empty());
    assert!(engine.current_state().is_none());
}

struct Telemetry;

impl CustomStateHandler for Telemetry {
    fn state_id(&self) -> StateId {
        "telemetry".into()
    }

    fn insertion_point(&self) -> InsertionPoint {
        InsertionPoint::between("license", "install")
    }

    fn enter(&self, data: &mut DataBag) -> Result<(), HookError> {
        data.set("visited", json!(true));
        Ok(())
    }

    fn validate(&self, data: &DataBag) -> Result<(), HookError> {
        match data.get_bool("accepted") {
            Some(true) => Ok(()),
            _ => Err("telemetry needs an accepted license".into()),
        }
    }
}

#[test]
fn custom_state_is_visited_between_anchors() {
    init_tracing();
    let mut controller =
        FlowController::new(installer_definition(), EngineOptions::default()).unwrap();
    controller.engine_mut().start().unwrap();
    controller.engine_mut().next().unwrap();

    controller.register(Telemetry).unwrap();
    let engine = controller.engine_mut();
    assert_eq!(engine.current_state().unwrap(), "license");

    engine.set_data("accepted", json!(true));
    assert_eq!(engine.next().unwrap(), "telemetry");
    assert_eq!(engine.next().unwrap(), "install");
    assert_eq!(engine.next().unwrap(), "complete");

    let key = custom_data_key(&StateId::from("telemetry"));
    assert_eq!(engine.get_data(&key), Some(&json!({ "visited": true })));
    assert_eq!(engine.get_data("visited"), None);
}

#[test]
fn duplicate_custom_state_leaves_flow_unchanged() {
    let mut controller =
        FlowController::new(installer_definition(), EngineOptions::default()).unwrap();
    controller.register(Telemetry).unwrap();
    assert!(controller.register(Telemetry).is_err());
    assert_eq!(controller.registry().len(), 1);
    assert_eq!(controller.engine().definition().len(), 5);
}

fn settings_flow() -> HierarchicalEngine {
    let mut engine = HierarchicalEngine::new();
    engine
        .add_main_state(StateConfig::new("intro").with_transition(Action::Next, "settings"))
        .unwrap();
    engine
        .add_main_state(
            MainStateConfig::new(
                StateConfig::new("settings").with_transition(Action::Next, "summary"),
            )
            .with_sub_state(SubStateConfig::new("browse").allow("edit").auto_transition_to("edit"))
            .with_sub_state(
                SubStateConfig::new("edit")
                    .allow("save")
                    .auto_transition_to("browse")
                    .complete_when(Guard::has("theme")),
            )
            .require_sub_completion(),
        )
        .unwrap();
    engine.add_main_state(StateConfig::new("summary")).unwrap();
    engine.set_initial_state("intro").unwrap();
    engine.add_final_state("summary").unwrap();
    engine.validate().unwrap();
    engine
}

#[test]
fn hierarchical_flow_moves_through_sub_states() {
    let mut engine = settings_flow();
    engine.start().unwrap();

    let entered = engine.next().unwrap();
    assert_eq!(entered, CompositeState::with_sub("settings", "browse"));

    let editing = engine.handle_sub_action("edit").unwrap();
    assert_eq!(editing.to_string(), "settings/edit");
    assert!(!engine.can_complete_current_sub_state());
    assert!(matches!(
        engine.next(),
        Err(EngineError::SubStateIncomplete { .. })
    ));
    assert!(matches!(
        engine.handle_sub_action("edit"),
        Err(EngineError::SubActionNotAllowed { .. })
    ));

    engine.set_data("theme", json!("dark"));
    assert_eq!(engine.next().unwrap(), CompositeState::new("summary"));
    assert!(engine.is_final());

    assert_eq!(engine.back().unwrap(), CompositeState::with_sub("settings", "edit"));
}

#[test]
fn session_applies_worker_completions_in_order() {
    init_tracing();
    let session = Session::new(installer());
    session.start().unwrap();
    session.set_data("accepted", json!(true));

    let workers: Vec<_> = (0..3)
        .map(|_| {
            let sender = session.completion_channel();
            let watcher = session.clone();
            thread::spawn(move || {
                let _ = watcher.current_state();
                sender.send(Completion::Next).unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(session.drain_completions().unwrap(), 3);
    assert_eq!(session.current_state().unwrap(), "complete");
    assert!(session.is_final());

    session.completion_channel().send(Completion::Next).unwrap();
    assert!(session.drain_completions().is_err());
}
