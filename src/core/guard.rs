//! Guard predicates over the shared data bag.
//!
//! Guards are pure boolean functions. The engine uses them as entry gates
//! on states and as conditions on global transition rules.

use super::data::DataBag;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Pure predicate that decides whether a move is allowed.
///
/// # Example
///
/// ```rust
/// use wizflow::core::{DataBag, Guard};
/// use serde_json::json;
///
/// let accepted = Guard::new(|data: &DataBag| data.get_bool("accepted") == Some(true));
///
/// let mut data = DataBag::new();
/// assert!(!accepted.check(&data));
///
/// data.set("accepted", json!(true));
/// assert!(accepted.check(&data));
/// ```
#[derive(Clone)]
pub struct Guard {
    predicate: Arc<dyn Fn(&DataBag) -> bool + Send + Sync>,
}

impl Guard {
    /// Create a guard from a pure predicate function.
    ///
    /// The predicate must be deterministic and thread-safe (Send + Sync).
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&DataBag) -> bool + Send + Sync + 'static,
    {
        Guard {
            predicate: Arc::new(predicate),
        }
    }

    /// Guard that passes when `key` holds exactly `expected`.
    pub fn equals(key: impl Into<String>, expected: Value) -> Self {
        let key = key.into();
        Guard::new(move |data| data.get(&key) == Some(&expected))
    }

    /// Guard that passes when `key` is present in the bag.
    pub fn has(key: impl Into<String>) -> Self {
        let key = key.into();
        Guard::new(move |data| data.contains(&key))
    }

    /// Evaluate against `data`.
    pub fn check(&self, data: &DataBag) -> bool {
        (self.predicate)(data)
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Guard(..)")
    }
}
