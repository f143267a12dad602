//! Translation task model.
//!
//! A [`Task`] follows one utterance from its boundary trigger through
//! transcription to translation:
//!
//! ```text
//! Created ──item created──▶ SourcePending ──transcript──▶ SourceCaptured
//!    │                            │                             │
//!    └────────────────────────────┴──────── translation ────────┤
//!                                                               ▼
//!                     (source missing) TranslationPending ──▶ Completed
//! ```

use std::fmt;

use chrono::{DateTime, Local};

/// Shown in place of a transcript that never arrived.
pub const SOURCE_UNAVAILABLE: &str = "(source unavailable)";

// ---------------------------------------------------------------------------
// TaskId
// ---------------------------------------------------------------------------

/// Session-unique, strictly increasing task identifier.  The first id is 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// Why a task boundary occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Server VAD reported the end of speech.
    VoiceBoundary,
    /// The force-commit interval elapsed with unsent audio pending.
    Timeout,
}

impl Trigger {
    pub fn label(&self) -> &'static str {
        match self {
            Trigger::VoiceBoundary => "speech ended",
            Trigger::Timeout => "forced commit",
        }
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Lifecycle position of a task.  Variants are ordered by progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskStatus {
    Created,
    SourcePending,
    SourceCaptured,
    TranslationPending,
    Completed,
}

impl TaskStatus {
    /// A short human-readable label for the status display.
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Created => "waiting for audio item",
            TaskStatus::SourcePending => "transcribing",
            TaskStatus::SourceCaptured => "translating",
            TaskStatus::TranslationPending => "waiting for transcript",
            TaskStatus::Completed => "done",
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// One utterance-to-translation round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub trigger: Trigger,
    pub status: TaskStatus,
    /// Transcript of the utterance; set at most once.
    pub source_text: Option<String>,
    /// Final translation; set at most once.
    pub translation_text: Option<String>,
    pub created_at: DateTime<Local>,
}

impl Task {
    pub fn new(id: TaskId, trigger: Trigger) -> Self {
        Self {
            id,
            trigger,
            status: TaskStatus::Created,
            source_text: None,
            translation_text: None,
            created_at: Local::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Advance to `status` if it is further along than the current one.
    ///
    /// Returns `true` when the status changed.
    pub fn advance(&mut self, status: TaskStatus) -> bool {
        if status > self.status {
            self.status = status;
            true
        } else {
            false
        }
    }

    /// Source text for display, substituting [`SOURCE_UNAVAILABLE`].
    pub fn source_or_marker(&self) -> &str {
        self.source_text.as_deref().unwrap_or(SOURCE_UNAVAILABLE)
    }
}
