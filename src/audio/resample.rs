//! Channel downmix and sample-rate conversion.
//!
//! The realtime endpoint takes mono audio at one fixed rate (24 kHz by
//! default); input devices deliver whatever they natively run at.  Both
//! conversions here are allocation-per-call and stateless, so a chunk
//! boundary may introduce at most one sample of interpolation error.

/// Average interleaved channels down to mono.
///
/// `channels == 1` copies the input; `channels == 0` yields nothing.
///
/// ```rust
/// use realtime_translator::audio::downmix_to_mono;
///
/// let mono = downmix_to_mono(&[0.5, -0.5, 0.2, 0.4], 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Linear-interpolation resample from `source_rate` to `target_rate`.
///
/// Output length is `ceil(len * target / source)`.  Equal rates and empty
/// input are returned as-is.
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() || source_rate == 0 {
        return samples.to_vec();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let last = samples.len() - 1;

    (0..output_len)
        .map(|i| {
            let pos = i as f64 / ratio;
            let idx = pos as usize;
            if idx >= last {
                return samples[last];
            }
            let frac = (pos - idx as f64) as f32;
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        })
        .collect()
}
