//! Named triggers that select the next state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named trigger matched against a state's table, then against global rules.
///
/// The four built-in names parse into their own variants, so
/// `Action::from("next") == Action::Next`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Next,
    Back,
    Skip,
    Cancel,
    Custom(String),
}

impl Action {
    /// Custom action named `name`.
    pub fn custom(name: impl Into<String>) -> Self {
        Self::from(name.into())
    }

    /// Action name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Next => "next",
            Self::Back => "back",
            Self::Skip => "skip",
            Self::Cancel => "cancel",
            Self::Custom(name) => name,
        }
    }

    /// Whether this is next, back, skip, or cancel.
    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        match value.as_str() {
            "next" => Self::Next,
            "back" => Self::Back,
            "skip" => Self::Skip,
            "cancel" => Self::Cancel,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for Action {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Action> for String {
    fn from(value: Action) -> Self {
        match value {
            Action::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_parse_to_variants() {
        assert_eq!(Action::from("next"), Action::Next);
        assert_eq!(Action::from("back"), Action::Back);
        assert_eq!(Action::from("skip"), Action::Skip);
        assert_eq!(Action::from("cancel"), Action::Cancel);
        assert_eq!(Action::custom("next"), Action::Next);
    }

    #[test]
    fn custom_names_are_preserved() {
        let action = Action::custom("retry");
        assert_eq!(action.as_str(), "retry");
        assert!(!action.is_builtin());
        assert!(Action::Next.is_builtin());
    }

    #[test]
    fn action_serializes_as_name() {
        let json = serde_json::to_string(&Action::Skip).unwrap();
        assert_eq!(json, "\"skip\"");
        let custom: Action = serde_json::from_str("\"retry\"").unwrap();
        assert_eq!(custom, Action::custom("retry"));
    }

    #[test]
    fn builtin_actions_order_before_custom() {
        let mut actions = vec![
            Action::custom("apply"),
            Action::Cancel,
            Action::Next,
            Action::Skip,
            Action::Back,
        ];
        actions.sort();
        assert_eq!(
            actions,
            vec![
                Action::Next,
                Action::Back,
                Action::Skip,
                Action::Cancel,
                Action::custom("apply"),
            ]
        );
    }
}
