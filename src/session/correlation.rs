//! Identifier correlation: conversation items and responses → tasks.
//!
//! A binding is written on first sight of an identifier and never
//! reassigned.  Lookups that miss fall back to the caller-supplied current
//! task, because the server does not put identifiers on every early event.
//!
//! A task owns at most one item and one response.  An unknown identifier is
//! therefore never attributed to a current task that already owns a
//! different identifier of the same kind; such a lookup is [`Resolution::Stale`].

use std::collections::HashMap;

use super::task::TaskId;

/// Outcome of resolving an inbound identifier to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The identifier was bound to this task.
    Bound(TaskId),
    /// No binding; attributed to the most recently created task.
    Fallback(TaskId),
    /// No binding, and the current task already owns another identifier
    /// of this kind.  The event belongs to an older task whose binding was
    /// pruned or never recorded.
    Stale,
    /// No binding and no task has been created yet.
    Unattached,
}

impl Resolution {
    pub fn task_id(&self) -> Option<TaskId> {
        match *self {
            Resolution::Bound(id) | Resolution::Fallback(id) => Some(id),
            Resolution::Stale | Resolution::Unattached => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolution::Fallback(_))
    }
}

#[derive(Debug, Default)]
pub struct CorrelationMap {
    items: HashMap<String, TaskId>,
    responses: HashMap<String, TaskId>,
    /// Bindings of every task below this id have been dropped.
    pruned_below: Option<TaskId>,
}

impl CorrelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `item_id` to `task`.  Returns `false` if it was already bound.
    pub fn bind_item(&mut self, item_id: &str, task: TaskId) -> bool {
        bind(&mut self.items, item_id, task)
    }

    /// Bind `response_id` to `task`.  Returns `false` if it was already bound.
    pub fn bind_response(&mut self, response_id: &str, task: TaskId) -> bool {
        bind(&mut self.responses, response_id, task)
    }

    pub fn item_task(&self, item_id: &str) -> Option<TaskId> {
        self.items.get(item_id).copied()
    }

    pub fn response_task(&self, response_id: &str) -> Option<TaskId> {
        self.responses.get(response_id).copied()
    }

    pub fn resolve_item(&self, item_id: Option<&str>, current: Option<TaskId>) -> Resolution {
        resolve(&self.items, item_id, current)
    }

    pub fn resolve_response(
        &self,
        response_id: Option<&str>,
        current: Option<TaskId>,
    ) -> Resolution {
        resolve(&self.responses, response_id, current)
    }

    /// Drop every binding that points at a task older than `floor`.
    pub fn prune_before(&mut self, floor: TaskId) -> usize {
        let before = self.len();
        self.items.retain(|_, task| *task >= floor);
        self.responses.retain(|_, task| *task >= floor);
        self.pruned_below = self.pruned_below.max(Some(floor));
        before - self.len()
    }

    /// Lowest task id whose bindings are still kept, once any were pruned.
    pub fn pruned_below(&self) -> Option<TaskId> {
        self.pruned_below
    }

    /// Total bindings across both maps.
    pub fn len(&self) -> usize {
        self.items.len() + self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn bind(map: &mut HashMap<String, TaskId>, key: &str, task: TaskId) -> bool {
    if map.contains_key(key) {
        return false;
    }
    map.insert(key.to_owned(), task);
    true
}

fn resolve(map: &HashMap<String, TaskId>, key: Option<&str>, current: Option<TaskId>) -> Resolution {
    if let Some(task) = key.and_then(|k| map.get(k)) {
        return Resolution::Bound(*task);
    }
    match current {
        None => Resolution::Unattached,
        Some(task) if key.is_some() && map.values().any(|owner| *owner == task) => {
            Resolution::Stale
        }
        Some(task) => Resolution::Fallback(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_binding_wins() {
        let mut map = CorrelationMap::new();
        assert!(map.bind_item("it1", TaskId(1)));
        assert!(!map.bind_item("it1", TaskId(2)));
        assert_eq!(map.item_task("it1"), Some(TaskId(1)));
    }

    #[test]
    fn bound_identifier_ignores_current_task() {
        let mut map = CorrelationMap::new();
        map.bind_response("r1", TaskId(1));

        for current in 2..20 {
            assert_eq!(
                map.resolve_response(Some("r1"), Some(TaskId(current))),
                Resolution::Bound(TaskId(1))
            );
        }
    }

    #[test]
    fn unknown_or_missing_identifier_falls_back() {
        let map = CorrelationMap::new();
        assert_eq!(
            map.resolve_item(Some("nope"), Some(TaskId(4))),
            Resolution::Fallback(TaskId(4))
        );
        assert_eq!(
            map.resolve_item(None, Some(TaskId(4))),
            Resolution::Fallback(TaskId(4))
        );
    }

    #[test]
    fn no_task_means_unattached() {
        let map = CorrelationMap::new();
        let res = map.resolve_response(Some("r9"), None);
        assert_eq!(res, Resolution::Unattached);
        assert_eq!(res.task_id(), None);
    }

    #[test]
    fn item_and_response_namespaces_are_separate() {
        let mut map = CorrelationMap::new();
        map.bind_item("x", TaskId(1));
        assert!(map.bind_response("x", TaskId(2)));
        assert_eq!(map.item_task("x"), Some(TaskId(1)));
        assert_eq!(map.response_task("x"), Some(TaskId(2)));
    }

    #[test]
    fn prune_drops_old_bindings_only() {
        let mut map = CorrelationMap::new();
        map.bind_item("a", TaskId(1));
        map.bind_response("ra", TaskId(1));
        map.bind_item("b", TaskId(5));

        assert_eq!(map.prune_before(TaskId(3)), 2);
        assert_eq!(map.item_task("a"), None);
        assert_eq!(map.item_task("b"), Some(TaskId(5)));
        assert_eq!(map.len(), 1);
        assert_eq!(map.pruned_below(), Some(TaskId(3)));

        // The floor never moves backwards.
        map.prune_before(TaskId(2));
        assert_eq!(map.pruned_below(), Some(TaskId(3)));
    }

    #[test]
    fn unknown_identifier_is_stale_when_current_task_owns_another() {
        let mut map = CorrelationMap::new();
        map.bind_item("it5", TaskId(5));
        map.bind_response("r5", TaskId(5));

        let res = map.resolve_item(Some("it1"), Some(TaskId(5)));
        assert_eq!(res, Resolution::Stale);
        assert_eq!(res.task_id(), None);
        assert_eq!(
            map.resolve_response(Some("r1"), Some(TaskId(5))),
            Resolution::Stale
        );

        // Without an identifier the event can still only be the current task's.
        assert_eq!(
            map.resolve_item(None, Some(TaskId(5))),
            Resolution::Fallback(TaskId(5))
        );
        // A newer task with nothing bound yet remains the fallback target.
        assert_eq!(
            map.resolve_item(Some("it6"), Some(TaskId(6))),
            Resolution::Fallback(TaskId(6))
        );
    }
}
