//! Display sink: where task progress and results are shown.
//!
//! # Overview
//!
//! The session engine reports every task transition to a [`DisplaySink`].
//! Callbacks arrive in the order the engine applied them, which is also the
//! order they must be rendered in.
//!
//! ```text
//!   SessionEngine ──add_task / update_task_status / set_task_source──▶ sink
//!                 ──complete_task(id, source, translation)───────────▶ sink
//!                 ──evict_task(id)───────────────────────────────────▶ sink
//! ```
//!
//! [`TerminalDisplay`] is the production renderer.  `RecordingSink`
//! (available under `#[cfg(test)]`) captures calls for assertions.

pub mod terminal;

#[cfg(test)]
pub mod recording;

pub use terminal::{CompletedResult, TerminalDisplay};

use crate::session::{TaskId, TaskStatus, Trigger};

// ---------------------------------------------------------------------------
// UnattachedText
// ---------------------------------------------------------------------------

/// Kind of text that arrived with no task to attach it to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnattachedText {
    Transcript,
    Translation,
}

impl UnattachedText {
    pub fn label(&self) -> &'static str {
        match self {
            UnattachedText::Transcript => "transcript",
            UnattachedText::Translation => "translation",
        }
    }
}

// ---------------------------------------------------------------------------
// DisplaySink trait
// ---------------------------------------------------------------------------

/// Receiver of task lifecycle updates.
///
/// Implementors must be `Send + Sync`; the engine shares them as
/// `Arc<dyn DisplaySink>`.  Calls are made while the engine lock is held, so
/// implementations must not block for long and must never call back into the
/// engine.
pub trait DisplaySink: Send + Sync {
    /// A task was opened.
    fn add_task(&self, id: TaskId, trigger: Trigger);

    fn update_task_status(&self, id: TaskId, status: TaskStatus);

    /// The task's source transcript arrived.
    fn set_task_source(&self, id: TaskId, source: &str);

    /// Final pair.  `source` is the unavailable marker when no transcript
    /// arrived in time.
    fn complete_task(&self, id: TaskId, source: &str, translation: &str);

    /// The engine dropped the task to stay within its cap.  Sent for every
    /// evicted task, completed or not.
    fn evict_task(&self, _id: TaskId) {}

    fn speech_started(&self) {}

    /// A streamed fragment of the translation in progress.
    fn translation_delta(&self, _delta: &str) {}

    fn show_unattached(&self, _kind: UnattachedText, _text: &str) {}

    fn show_error(&self, _message: &str) {}
}
