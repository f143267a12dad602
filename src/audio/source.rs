//! Audio sources feeding the send loop.
//!
//! An [`AudioSource`] is polled, never awaited: `next_chunk` returns the
//! next ready PCM16 frame or `None` when nothing is buffered, and the send
//! loop sleeps briefly before polling again.

use std::sync::mpsc::{Receiver, TryRecvError};

use super::capture::AudioChunk;
use super::encode::f32_to_pcm16;
use super::resample::{downmix_to_mono, resample_linear};

/// Non-blocking supplier of PCM16 little-endian mono frames.
pub trait AudioSource: Send {
    fn next_chunk(&mut self) -> Option<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// MicrophoneSource
// ---------------------------------------------------------------------------

/// Converts captured device buffers into fixed-size wire frames.
///
/// Device buffers are downmixed, resampled to `target_rate` and accumulated
/// until `frame_samples` mono samples are available.
pub struct MicrophoneSource {
    rx: Receiver<AudioChunk>,
    target_rate: u32,
    frame_samples: usize,
    pending: Vec<f32>,
    disconnected: bool,
}

impl MicrophoneSource {
    pub fn new(rx: Receiver<AudioChunk>, target_rate: u32, frame_samples: usize) -> Self {
        Self {
            rx,
            target_rate,
            frame_samples: frame_samples.max(1),
            pending: Vec::new(),
            disconnected: false,
        }
    }

    /// Byte length of every frame this source yields.
    pub fn frame_bytes(&self) -> usize {
        self.frame_samples * 2
    }

    fn drain_capture(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => {
                    let mono = downmix_to_mono(&chunk.samples, chunk.channels);
                    let converted = resample_linear(&mono, chunk.sample_rate, self.target_rate);
                    self.pending.extend_from_slice(&converted);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.disconnected {
                        log::warn!("audio: capture stream ended");
                        self.disconnected = true;
                    }
                    break;
                }
            }
        }
    }
}

impl AudioSource for MicrophoneSource {
    fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.drain_capture();
        if self.pending.len() < self.frame_samples {
            return None;
        }
        let frame: Vec<f32> = self.pending.drain(..self.frame_samples).collect();
        Some(f32_to_pcm16(&frame))
    }
}

// ---------------------------------------------------------------------------
// ScriptedSource (tests)
// ---------------------------------------------------------------------------

/// Yields a fixed list of frames, then nothing.
#[cfg(test)]
pub struct ScriptedSource {
    frames: std::collections::VecDeque<Vec<u8>>,
}

#[cfg(test)]
impl ScriptedSource {
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

#[cfg(test)]
impl AudioSource for ScriptedSource {
    fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.frames.pop_front()
    }
}
