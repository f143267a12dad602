//! Test sink that records every callback in order.

use std::sync::Mutex;

use super::{DisplaySink, UnattachedText};
use crate::session::{TaskId, TaskStatus, Trigger};

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Add(TaskId, Trigger),
    Status(TaskId, TaskStatus),
    Source(TaskId, String),
    Complete(TaskId, String, String),
    Evict(TaskId),
    SpeechStarted,
    Delta(String),
    Unattached(UnattachedText, String),
    Error(String),
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl DisplaySink for RecordingSink {
    fn add_task(&self, id: TaskId, trigger: Trigger) {
        self.push(SinkEvent::Add(id, trigger));
    }

    fn update_task_status(&self, id: TaskId, status: TaskStatus) {
        self.push(SinkEvent::Status(id, status));
    }

    fn set_task_source(&self, id: TaskId, source: &str) {
        self.push(SinkEvent::Source(id, source.into()));
    }

    fn complete_task(&self, id: TaskId, source: &str, translation: &str) {
        self.push(SinkEvent::Complete(id, source.into(), translation.into()));
    }

    fn evict_task(&self, id: TaskId) {
        self.push(SinkEvent::Evict(id));
    }

    fn speech_started(&self) {
        self.push(SinkEvent::SpeechStarted);
    }

    fn translation_delta(&self, delta: &str) {
        self.push(SinkEvent::Delta(delta.into()));
    }

    fn show_unattached(&self, kind: UnattachedText, text: &str) {
        self.push(SinkEvent::Unattached(kind, text.into()));
    }

    fn show_error(&self, message: &str) {
        self.push(SinkEvent::Error(message.into()));
    }
}
