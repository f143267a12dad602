//! Task registry and id allocator with bounded retention.
//!
//! Tasks live in a `BTreeMap` keyed by id, so the oldest task is always the
//! first entry.  After every creation the registry evicts from the front
//! until it is back under its cap, whether or not those tasks completed.

use std::collections::BTreeMap;

use super::task::{Task, TaskId, Trigger};

#[derive(Debug)]
pub struct TaskRegistry {
    tasks: BTreeMap<TaskId, Task>,
    next_id: u64,
    last_task_id: Option<TaskId>,
    cap: usize,
}

impl TaskRegistry {
    /// Create an empty registry retaining at most `cap` tasks (minimum 1).
    pub fn new(cap: usize) -> Self {
        Self {
            tasks: BTreeMap::new(),
            next_id: 1,
            last_task_id: None,
            cap: cap.max(1),
        }
    }

    /// Allocate the next id, insert a `Created` task and make it current.
    ///
    /// Returns the new id and every task evicted to restore the cap.
    pub fn create(&mut self, trigger: Trigger) -> (TaskId, Vec<Task>) {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.insert(id, Task::new(id, trigger));
        self.last_task_id = Some(id);
        let evicted = self.evict_over_cap();
        (id, evicted)
    }

    /// Remove the lowest ids until `len() <= cap`.
    pub fn evict_over_cap(&mut self) -> Vec<Task> {
        let mut evicted = Vec::new();
        while self.tasks.len() > self.cap {
            match self.tasks.pop_first() {
                Some((_, task)) => evicted.push(task),
                None => break,
            }
        }
        evicted
    }

    /// Most recently created task id, `None` before the first creation.
    pub fn last_task_id(&self) -> Option<TaskId> {
        self.last_task_id
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Retained tasks in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_increasing() {
        let mut reg = TaskRegistry::new(10);
        let ids: Vec<TaskId> = (0..25)
            .map(|i| {
                let trigger = if i % 3 == 0 {
                    Trigger::Timeout
                } else {
                    Trigger::VoiceBoundary
                };
                reg.create(trigger).0
            })
            .collect();

        for (n, id) in ids.iter().enumerate() {
            assert_eq!(id.0, n as u64 + 1);
        }
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn last_task_id_tracks_creation() {
        let mut reg = TaskRegistry::new(3);
        assert_eq!(reg.last_task_id(), None);
        let (a, _) = reg.create(Trigger::VoiceBoundary);
        assert_eq!(reg.last_task_id(), Some(a));
        let (b, _) = reg.create(Trigger::Timeout);
        assert_eq!(reg.last_task_id(), Some(b));
    }

    #[test]
    fn eleven_creations_with_cap_ten_evict_the_first() {
        let mut reg = TaskRegistry::new(10);
        let mut evicted = Vec::new();
        for _ in 0..11 {
            let (_, gone) = reg.create(Trigger::VoiceBoundary);
            evicted.extend(gone);
        }

        assert_eq!(reg.len(), 10);
        assert!(!reg.contains(TaskId(1)));
        for n in 2..=11 {
            assert!(reg.contains(TaskId(n)), "task #{n} should be retained");
        }
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, TaskId(1));
    }

    #[test]
    fn size_never_exceeds_cap() {
        let mut reg = TaskRegistry::new(4);
        for _ in 0..50 {
            reg.create(Trigger::Timeout);
            assert!(reg.len() <= reg.cap());
        }
        let ids: Vec<u64> = reg.iter().map(|t| t.id.0).collect();
        assert_eq!(ids, vec![47, 48, 49, 50]);
    }

    #[test]
    fn eviction_ignores_completion_status() {
        let mut reg = TaskRegistry::new(1);
        let (first, _) = reg.create(Trigger::VoiceBoundary);
        assert!(!reg.get(first).unwrap().is_completed());

        let (_, evicted) = reg.create(Trigger::VoiceBoundary);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, first);
    }

    #[test]
    fn zero_cap_is_raised_to_one() {
        let mut reg = TaskRegistry::new(0);
        reg.create(Trigger::VoiceBoundary);
        assert_eq!(reg.cap(), 1);
        assert_eq!(reg.len(), 1);
    }
}
