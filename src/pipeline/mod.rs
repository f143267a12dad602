//! Session pipeline for the realtime translator.
//!
//! # Architecture
//!
//! ```text
//! Microphone ─▶ MicrophoneSource ─▶ audio loop ──append──┐
//!                                                        ▼
//!                     TriggerScheduler ──commit──▶ Transport (WebSocket)
//!                                                        │
//!                               Inbound text frames ◀────┘
//!                                        │
//!                                        ▼
//!                              receive loop ─▶ SessionEngine ─▶ DisplaySink
//! ```
//!
//! All three activities stop when the shared [`ShutdownSignal`] fires.

pub mod runner;

pub use crate::session::ShutdownSignal;
pub use runner::{PipelineError, SessionRunner};
