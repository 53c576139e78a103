//! Validation and dry-run pipeline.
//!
//! Cross-cutting logic invoked by both the flat and the hierarchical
//! engine. It decides, for every point of the transition protocol, whether
//! a validator, gate, hook, or notification actually runs:
//!
//! - **Strict mode** off: validators are not called at all.
//! - **Dry-run** on: validators, gates, hooks, and notifications are all
//!   skipped, and every attempted operation is appended to a
//!   timestamp-free log so two runs of the same script compare equal.
//!
//! # Example
//!
//! ```rust
//! use wizflow::pipeline::{EngineOptions, Pipeline, Stage};
//!
//! let mut pipeline = Pipeline::new(EngineOptions::dry_run());
//! pipeline.notify("welcome", Stage::Enter, || unreachable!());
//! assert_eq!(pipeline.log().entries(), &["skip on_enter welcome"]);
//! ```

mod log;
mod options;
mod runner;

pub use log::DryRunLog;
pub use options::EngineOptions;
pub use runner::{Pipeline, Stage};
