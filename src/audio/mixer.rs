//! Software voice mixer behind the cpal output stream
//!
//! cpal only offers a pull callback, so timed playback is implemented here:
//! every scheduled voice has a start frame on the device clock, and
//! [`Mixer::render`] sums whatever voices overlap the requested block. The
//! device clock is the number of frames rendered so far.

use std::collections::BTreeMap;

use super::device::{PlaybackBuffer, VoiceId};

#[derive(Debug)]
struct Voice {
    samples: Vec<f32>,
    source_rate: u32,
    start_frame: u64,
    end_frame: u64,
}

impl Voice {
    fn sample_at(&self, frame: u64, device_rate: u32) -> f32 {
        if frame < self.start_frame || frame >= self.end_frame {
            return 0.0;
        }
        let offset = frame - self.start_frame;
        let idx = (offset * self.source_rate as u64 / device_rate as u64) as usize;
        self.samples.get(idx).copied().unwrap_or(0.0)
    }
}

/// Timed voice mixer driven by the output callback
#[derive(Debug)]
pub struct Mixer {
    device_rate: u32,
    frames_rendered: u64,
    voices: BTreeMap<VoiceId, Voice>,
}

impl Mixer {
    pub fn new(device_rate: u32) -> Self {
        Self {
            device_rate: device_rate.max(1),
            frames_rendered: 0,
            voices: BTreeMap::new(),
        }
    }

    /// Device clock in seconds
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.device_rate as f64
    }

    /// Add a voice starting at `start_at` seconds. Start times in the past
    /// are moved to the current frame.
    pub fn add(&mut self, id: VoiceId, buffer: PlaybackBuffer, start_at: f64) {
        let requested = (start_at.max(0.0) * self.device_rate as f64).round() as u64;
        let start_frame = requested.max(self.frames_rendered);
        let source_rate = buffer.sample_rate.max(1);
        let length = (buffer.samples.len() as u64 * self.device_rate as u64)
            .div_ceil(source_rate as u64);

        self.voices.insert(
            id,
            Voice {
                samples: buffer.samples,
                source_rate,
                start_frame,
                end_frame: start_frame + length,
            },
        );
    }

    /// Remove a voice; returns whether it was present
    pub fn remove(&mut self, id: VoiceId) -> bool {
        self.voices.remove(&id).is_some()
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Render one interleaved block and advance the clock.
    ///
    /// Returns the voices that finished inside this block.
    pub fn render(&mut self, out: &mut [f32], channels: usize) -> Vec<VoiceId> {
        let channels = channels.max(1);
        let frames = out.len() / channels;

        for (i, frame) in out.chunks_mut(channels).enumerate() {
            let clock = self.frames_rendered + i as u64;
            let mixed: f32 = self
                .voices
                .values()
                .map(|v| v.sample_at(clock, self.device_rate))
                .sum();
            frame.fill(mixed.clamp(-1.0, 1.0));
        }

        self.frames_rendered += frames as u64;

        let now = self.frames_rendered;
        let finished: Vec<VoiceId> = self
            .voices
            .iter()
            .filter(|(_, v)| v.end_frame <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &finished {
            self.voices.remove(id);
        }
        finished
    }
}
