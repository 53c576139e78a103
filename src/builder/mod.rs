//! Builder API for ergonomic flow construction.
//!
//! Fluent builders and a macro over the imperative `add_state` /
//! `add_transition` calls. They add no semantics of their own.

pub mod error;
pub mod flow;
pub mod macros;
pub mod state;

pub use error::BuildError;
pub use flow::FlowBuilder;
pub use state::StateBuilder;

use crate::core::StateId;
use crate::engine::Engine;

/// Build a linear flow visiting `steps` in order, ending in a final state.
///
/// # Example
///
/// ```
/// use wizflow::builder::linear_flow;
///
/// let mut engine = linear_flow(["welcome", "install", "done"]).unwrap();
/// engine.start().unwrap();
/// engine.next().unwrap();
/// assert_eq!(engine.next().unwrap(), "done");
/// assert!(engine.is_final());
/// ```
pub fn linear_flow<I, S>(steps: I) -> Result<Engine, BuildError>
where
    I: IntoIterator<Item = S>,
    S: Into<StateId>,
{
    let steps: Vec<StateId> = steps.into_iter().map(Into::into).collect();
    let (first, last) = match (steps.first(), steps.last()) {
        (Some(first), Some(last)) => (first.clone(), last.clone()),
        _ => return Err(BuildError::NoStates),
    };

    let mut builder = FlowBuilder::new();
    if steps.len() == 1 {
        builder = builder.state(StateBuilder::new(first.clone()));
    }
    for pair in steps.windows(2) {
        builder = builder.edge(pair[0].clone(), pair[1].clone());
    }
    builder.initial(first).final_state(last).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_flow_requires_steps() {
        let result = linear_flow(Vec::<&str>::new());
        assert!(matches!(result, Err(BuildError::NoStates)));
    }

    #[test]
    fn single_step_flow_is_immediately_final() {
        let mut engine = linear_flow(["only"]).unwrap();
        engine.start().unwrap();
        assert!(engine.is_final());
    }
}
