//! Wizflow: a deterministic state-machine engine for wizard-style flows
//!
//! A flow is a table of named states, each a plain capability record:
//! flags for the built-in actions, optional validators and hooks, and a
//! static action -> target table. Engines drive one session over such a
//! table, keeping a bounded history, a shared data bag, and strict
//! all-or-nothing transitions.
//!
//! # Core Concepts
//!
//! - **Engine**: flat engine with `next`, `back`, `skip`, `cancel`, and custom actions
//! - **HierarchicalEngine**: main states (screens) containing sub-states (modes)
//! - **Custom states**: externally registered states spliced between two existing ones
//! - **Pipeline**: strict and dry-run handling for every validator and hook call
//! - **Session**: thread-safe engine handle with a worker completion channel
//!
//! # Example
//!
//! ```rust
//! use wizflow::builder::{FlowBuilder, StateBuilder};
//! use serde_json::json;
//!
//! let mut engine = FlowBuilder::new()
//!     .state(StateBuilder::new("welcome").next("license"))
//!     .state(
//!         StateBuilder::new("license")
//!             .next("install")
//!             .validate_next(|data| match data.get_bool("accepted") {
//!                 Some(true) => Ok(()),
//!                 _ => Err("license must be accepted".into()),
//!             }),
//!     )
//!     .state(StateBuilder::new("install").next("complete"))
//!     .state(StateBuilder::new("complete"))
//!     .initial("welcome")
//!     .final_state("complete")
//!     .build()
//!     .unwrap();
//!
//! engine.start().unwrap();
//! engine.next().unwrap();
//! assert!(engine.next().is_err());
//! assert_eq!(engine.current_state().unwrap(), "license");
//!
//! engine.set_data("accepted", json!(true));
//! engine.next().unwrap();
//! engine.next().unwrap();
//! assert!(engine.is_final());
//! ```

pub mod builder;
pub mod core;
pub mod custom;
pub mod engine;
pub mod hierarchy;
pub mod pipeline;
pub mod session;

// Re-export commonly used types
pub use builder::{BuildError, FlowBuilder, StateBuilder};
pub use core::{Action, DataBag, Guard, GlobalRule, HookError, StateConfig, StateId};
pub use custom::{CustomStateHandler, CustomStateRegistry, FlowController, InsertionPoint};
pub use engine::{Callbacks, ConfigError, Engine, EngineError, FlowDefinition};
pub use hierarchy::{CompositeState, HierarchicalEngine, MainStateConfig, SubStateConfig};
pub use pipeline::{DryRunLog, EngineOptions};
pub use session::{Completion, Flow, Session};
