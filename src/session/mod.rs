//! Session correlation engine.
//!
//! Turns the interleaved realtime event stream into ordered translation
//! tasks, each pairing one source transcript with one translation.
//!
//! ```text
//!  receive loop ──dispatch──▶ SessionEngine ──▶ DisplaySink
//!                                 ▲
//!  audio loop ──record_audio_sent─┤
//!                                 │
//!  TriggerScheduler ──poll_force_commit──▶ Transport (commit + response)
//! ```

pub mod correlation;
pub mod engine;
pub mod registry;
pub mod scheduler;
pub mod shutdown;
pub mod task;

pub use correlation::{CorrelationMap, Resolution};
pub use engine::{Dispatch, EngineConfig, EngineStats, SessionEngine};
pub use registry::TaskRegistry;
pub use scheduler::{CommitClock, TickOutcome, TriggerScheduler};
pub use shutdown::ShutdownSignal;
pub use task::{Task, TaskId, TaskStatus, Trigger, SOURCE_UNAVAILABLE};
