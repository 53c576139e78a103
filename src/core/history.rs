//! Bounded navigation history with a redo stack.
//!
//! The last history entry is always the current position. Stepping back
//! moves it onto the future stack; a forward move to the entry on top of
//! the future stack pops it again (redo), while any other forward move
//! clears the future.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of entries kept before the oldest are dropped.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Ordered, bounded sequence of visited positions.
///
/// # Example
///
/// ```rust
/// use wizflow::core::History;
///
/// let mut history: History<String> = History::new(3);
/// for step in ["a", "b", "c", "d"] {
///     history.push(step);
/// }
/// assert_eq!(history.entries(), vec!["b", "c", "d"]);
///
/// assert_eq!(history.step_back().as_deref(), Some("c"));
/// assert_eq!(history.future(), &["d"]);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: Deserialize<'de>"
))]
pub struct History<T> {
    entries: VecDeque<T>,
    future: Vec<T>,
    max_len: usize,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl<T> History<T> {
    /// Create an empty history holding at most `max_len` entries (minimum 1).
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            future: Vec::new(),
            max_len: max_len.max(1),
        }
    }

    /// Number of past entries, current included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries kept.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// The current position.
    pub fn current(&self) -> Option<&T> {
        self.entries.back()
    }

    /// The entry `step_back` would return to.
    pub fn previous(&self) -> Option<&T> {
        self.entries
            .len()
            .checked_sub(2)
            .and_then(|index| self.entries.get(index))
    }

    /// Entries redo would revisit, most recent last.
    pub fn future(&self) -> &[T] {
        &self.future
    }

    /// Change the bound, dropping the oldest entries if needed.
    pub fn set_max_len(&mut self, max_len: usize) {
        self.max_len = max_len.max(1);
        self.trim();
    }

    /// Forget past and future.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.future.clear();
    }

    /// Drop every entry, past or future, for which `keep` returns false.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.entries.retain(|item| keep(item));
        self.future.retain(|item| keep(item));
    }

    fn trim(&mut self) {
        while self.entries.len() > self.max_len {
            self.entries.pop_front();
        }
    }
}

impl<T: Clone + PartialEq> History<T> {
    /// Record a forward move.
    ///
    /// Re-issuing the move that was last undone consumes it from the future
    /// stack; any other target clears the future.
    pub fn push(&mut self, item: impl Into<T>) {
        let item = item.into();
        if self.future.last() == Some(&item) {
            self.future.pop();
        } else {
            self.future.clear();
        }
        self.entries.push_back(item);
        self.trim();
    }

    /// Move the current entry onto the future stack and return the new current.
    ///
    /// Returns `None` without changing anything when fewer than two entries exist.
    pub fn step_back(&mut self) -> Option<T> {
        if self.entries.len() < 2 {
            return None;
        }
        let undone = self.entries.pop_back()?;
        self.future.push(undone);
        self.entries.back().cloned()
    }

    /// Past entries, oldest first.
    pub fn entries(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}
