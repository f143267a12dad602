//! Realtime speech translator.
//!
//! Streams microphone audio to a realtime speech service and pairs each
//! utterance's transcript with its translation.  The core is the
//! [`session`] correlation engine; the other modules are its adapters.

pub mod audio;
pub mod config;
pub mod display;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod transport;
