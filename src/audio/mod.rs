//! Audio input: microphone capture → mono → resample → PCM16 frames.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (std mpsc)
//!            → MicrophoneSource: downmix_to_mono → resample_linear → f32_to_pcm16
//!            → send loop: validate_frame → pcm16_to_base64 → input_audio_buffer.append
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::mpsc;
//! use realtime_translator::audio::{AudioCapture, AudioSource, MicrophoneSource};
//!
//! let (tx, rx) = mpsc::channel();
//! let capture = AudioCapture::new().unwrap();
//! let _handle = capture.start(tx).unwrap(); // dropping the handle stops capture
//!
//! let mut source = MicrophoneSource::new(rx, 24_000, 1024);
//! if let Some(frame) = source.next_chunk() {
//!     println!("{} bytes of PCM16", frame.len());
//! }
//! ```

pub mod capture;
pub mod encode;
pub mod resample;
pub mod source;

pub use capture::{AudioCapture, AudioChunk, CaptureError, StreamHandle};
pub use encode::{f32_to_pcm16, pcm16_to_base64, validate_frame, FrameError};
pub use resample::{downmix_to_mono, resample_linear};
pub use source::{AudioSource, MicrophoneSource};

#[cfg(test)]
pub use source::ScriptedSource;
