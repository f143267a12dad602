//! PCM16 framing for the wire.
//!
//! Audio is sent as base64 of little-endian signed 16-bit mono samples.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("empty audio frame")]
    Empty,

    #[error("audio frame has odd length {0}; PCM16 needs whole samples")]
    OddLength(usize),

    #[error("audio frame is {actual} bytes, expected {expected}")]
    WrongSize { expected: usize, actual: usize },
}

/// Check a PCM16 frame before it is sent.
///
/// `expected` is the exact byte length when frames are fixed-size.
pub fn validate_frame(frame: &[u8], expected: Option<usize>) -> Result<(), FrameError> {
    if frame.is_empty() {
        return Err(FrameError::Empty);
    }
    if frame.len() % 2 != 0 {
        return Err(FrameError::OddLength(frame.len()));
    }
    match expected {
        Some(expected) if expected != frame.len() => Err(FrameError::WrongSize {
            expected,
            actual: frame.len(),
        }),
        _ => Ok(()),
    }
}

pub fn pcm16_to_base64(frame: &[u8]) -> String {
    STANDARD.encode(frame)
}

/// Convert `[-1.0, 1.0]` floats to PCM16 little-endian bytes, clamping
/// out-of-range input.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| {
            let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
            v.to_le_bytes()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_is_little_endian_and_clamped() {
        let bytes = f32_to_pcm16(&[0.0, 1.0, -1.0, 2.0]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..2], &[0, 0]);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[6], bytes[7]]), i16::MAX);
    }

    #[test]
    fn base64_of_known_bytes() {
        assert_eq!(pcm16_to_base64(&[0, 0, 0]), "AAAA");
        assert_eq!(pcm16_to_base64(&[0xff, 0x7f]), "/38=");
    }

    #[test]
    fn frame_validation() {
        assert_eq!(validate_frame(&[], None), Err(FrameError::Empty));
        assert_eq!(validate_frame(&[1, 2, 3], None), Err(FrameError::OddLength(3)));
        assert_eq!(
            validate_frame(&[0; 4], Some(2048)),
            Err(FrameError::WrongSize {
                expected: 2048,
                actual: 4
            })
        );
        assert!(validate_frame(&[0; 2048], Some(2048)).is_ok());
        assert!(validate_frame(&[0; 6], None).is_ok());
    }
}
