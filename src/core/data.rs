//! Shared key-value data bag.
//!
//! One bag lives for the lifetime of an engine and is visible to every
//! state. While a transition is in flight the bag journals each write with
//! the value it replaced, so a rejected transition can restore the bag to
//! exactly what it was before the attempt.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Ordered mapping from string keys to arbitrary JSON values.
///
/// # Example
///
/// ```rust
/// use wizflow::core::DataBag;
/// use serde_json::json;
///
/// let mut data = DataBag::new();
/// assert_eq!(data.set("accepted", json!(false)), None);
/// assert_eq!(data.set("accepted", json!(true)), Some(json!(false)));
/// assert_eq!(data.get_bool("accepted"), Some(true));
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DataBag {
    values: BTreeMap<String, Value>,
    #[serde(skip)]
    journal: Option<Vec<(String, Option<Value>)>>,
}

impl DataBag {
    /// Empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Boolean value for `key`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    /// String value for `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Integer value for `key`.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    /// Whether `key` is set.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Write a value, returning the one it replaced.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        let previous = self.values.insert(key.clone(), value);
        if let Some(journal) = self.journal.as_mut() {
            journal.push((key, previous.clone()));
        }
        previous
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let previous = self.values.remove(key);
        if previous.is_some() {
            if let Some(journal) = self.journal.as_mut() {
                journal.push((key.to_string(), previous.clone()));
            }
        }
        previous
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no key is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Owned copy of every entry, in key order.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.clone()
    }

    /// Remove every key.
    pub fn clear(&mut self) {
        self.values.clear();
        self.journal = None;
    }

    /// Start journaling writes. Any journal already open is discarded.
    pub(crate) fn begin(&mut self) {
        self.journal = Some(Vec::new());
    }

    /// Keep every journaled write and stop journaling.
    pub(crate) fn commit(&mut self) {
        self.journal = None;
    }

    /// Undo every journaled write in reverse order and stop journaling.
    ///
    /// Returns the number of writes that were undone.
    pub(crate) fn rollback(&mut self) -> usize {
        let Some(journal) = self.journal.take() else {
            return 0;
        };
        let undone = journal.len();
        for (key, previous) in journal.into_iter().rev() {
            match previous {
                Some(value) => {
                    self.values.insert(key, value);
                }
                None => {
                    self.values.remove(&key);
                }
            }
        }
        undone
    }
}

impl PartialEq for DataBag {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl From<BTreeMap<String, Value>> for DataBag {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self {
            values,
            journal: None,
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for DataBag {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::from(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect::<BTreeMap<_, _>>(),
        )
    }
}
