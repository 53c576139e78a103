//! Global transition rules for routing not tied to one state's table.

use super::action::Action;
use super::data::DataBag;
use super::guard::Guard;
use super::state::StateId;

/// `(from, to, action, condition, priority)` routing rule.
///
/// Rules are consulted after the current state's own table. Among the rules
/// whose condition passes, the highest priority wins; ties go to the rule
/// declared first.
#[derive(Clone, Debug)]
pub struct GlobalRule {
    pub from: StateId,
    pub to: StateId,
    pub action: Action,
    pub condition: Option<Guard>,
    pub priority: i32,
}

impl GlobalRule {
    /// Unconditional rule with priority 0.
    pub fn new(from: impl Into<StateId>, to: impl Into<StateId>, action: impl Into<Action>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            action: action.into(),
            condition: None,
            priority: 0,
        }
    }

    /// Only match while `predicate` passes.
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&DataBag) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Guard::new(predicate));
        self
    }

    /// Higher priorities win over lower ones.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether this rule fires for `action` from `from` with the given data.
    pub fn matches(&self, from: &StateId, action: &Action, data: &DataBag) -> bool {
        self.from == *from
            && self.action == *action
            && self.condition.as_ref().is_none_or(|c| c.check(data))
    }
}

/// Pick the winning rule target for `(from, action)`.
pub(crate) fn resolve<'a>(
    rules: &'a [GlobalRule],
    from: &StateId,
    action: &Action,
    data: &DataBag,
) -> Option<&'a StateId> {
    rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| rule.matches(from, action, data))
        .max_by_key(|(index, rule)| (rule.priority, std::cmp::Reverse(*index)))
        .map(|(_, rule)| &rule.to)
}
