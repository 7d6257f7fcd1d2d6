//! Channel mixdown and sample-rate conversion for device audio
//!
//! Capture devices rarely run at 16kHz mono natively, so the cpal backend
//! mixes interleaved frames down to mono and converts them to the rate the
//! live stream expects before they reach the capture pipeline.

/// Average interleaved frames down to a single channel
pub fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Convert mono audio from `source_rate` to `target_rate`
///
/// Integer downsampling ratios (e.g. 48kHz → 16kHz) average each group of
/// source samples. Any other ratio falls back to linear interpolation.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    // Guard against division by zero
    if target_rate == 0 || source_rate == 0 {
        log::warn!(
            "Invalid sample rate (source: {}, target: {}), returning original",
            source_rate,
            target_rate
        );
        return samples.to_vec();
    }

    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }

    if source_rate > target_rate && source_rate % target_rate == 0 {
        let ratio = (source_rate / target_rate) as usize;
        return samples
            .chunks(ratio)
            .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
            .collect();
    }

    let step = source_rate as f64 / target_rate as f64;
    let out_len = (samples.len() as u64 * target_rate as u64 / source_rate as u64) as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(last)];
            let b = samples[(idx + 1).min(last)];
            a + (b - a) * frac
        })
        .collect()
}
