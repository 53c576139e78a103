//! Custom states contributed from outside the flow definition.
//!
//! Handlers register with a [`CustomStateRegistry`] under an
//! [`InsertionPoint`]. [`splice`] rebuilds a flow definition with every
//! handler chained in, and a [`FlowController`] keeps a live engine in step
//! with the registry.

mod controller;
mod handler;
mod registry;
mod splice;

pub use controller::FlowController;
pub use handler::{CustomStateHandler, InsertionPoint};
pub use registry::CustomStateRegistry;
pub use splice::{custom_data_key, merged_view, splice};
