//! Gapless playback of the interviewer's audio
//!
//! Each inbound fragment is decoded and scheduled on the output device at
//! the playback cursor, then the cursor advances by the fragment's
//! duration. Fragments therefore play back-to-back in arrival order:
//!
//! ```text
//! cursor = max(cursor, device_now)
//! schedule(fragment, at = cursor)
//! cursor += fragment.duration
//! ```
//!
//! If fragments arrive slower than real time the cursor falls behind the
//! device clock and the next fragment starts "now", leaving an audible gap
//! but never overlapping. Scheduled voices are tracked in a pending set so
//! an interruption can stop all of them at once.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::protocol::MediaBlob;
use crate::audio::codec::{decode_samples, mime_sample_rate, DecodeError};
use crate::audio::{AudioError, OutputDevice, PlaybackBuffer, VoiceId, DEFAULT_PLAYBACK_RATE};
use crate::stats::StatsCollector;

#[derive(Debug, Clone, Copy)]
struct PendingVoice {
    start_at: f64,
    duration: f64,
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    /// Device clock (seconds)
    pub now: f64,
    /// Where the next fragment will start (seconds)
    pub cursor: f64,
    /// Scheduled voices that have not finished yet
    pub pending: usize,
    /// Device clock time at which all pending audio has played out
    pub drains_at: f64,
}

/// Owns the output device, the schedule cursor and the pending set
pub struct PlaybackScheduler {
    output: Option<Box<dyn OutputDevice>>,
    cursor: f64,
    pending: BTreeMap<VoiceId, PendingVoice>,
    next_voice: u64,
    default_rate: u32,
    stats: Arc<StatsCollector>,
}

impl PlaybackScheduler {
    pub fn new(output: Box<dyn OutputDevice>, stats: Arc<StatsCollector>) -> Self {
        Self {
            output: Some(output),
            cursor: 0.0,
            pending: BTreeMap::new(),
            next_voice: 0,
            default_rate: DEFAULT_PLAYBACK_RATE,
            stats,
        }
    }

    /// Rate assumed when a fragment's MIME tag carries no `rate=`
    pub fn with_default_rate(mut self, rate: u32) -> Self {
        self.default_rate = rate;
        self
    }

    /// Decode an inbound base64 PCM16 fragment and schedule it.
    ///
    /// Returns the start time, or `None` if nothing was scheduled (empty
    /// fragment or device failure). A decode error leaves the cursor and the
    /// pending set untouched.
    pub fn enqueue_encoded(&mut self, blob: &MediaBlob) -> Result<Option<f64>, DecodeError> {
        let rate = mime_sample_rate(&blob.mime_type).unwrap_or(self.default_rate);
        let samples = match decode_samples(&blob.data) {
            Ok(samples) => samples,
            Err(e) => {
                self.stats.fragment_rejected();
                self.stats.record_error("decode", &e.to_string(), None);
                return Err(e);
            }
        };

        if samples.is_empty() {
            log::debug!("Playback: ignoring empty fragment");
            return Ok(None);
        }

        match self.schedule(PlaybackBuffer::new(samples, rate)) {
            Ok(start) => Ok(Some(start)),
            Err(e) => {
                log::warn!("Playback: failed to schedule fragment: {}", e);
                self.stats.fragment_rejected();
                self.stats.record_error("device", &e.to_string(), None);
                Ok(None)
            }
        }
    }

    /// Schedule a decoded buffer at the cursor and advance it.
    pub fn schedule(&mut self, buffer: PlaybackBuffer) -> Result<f64, AudioError> {
        let output = self.output.as_mut().ok_or(AudioError::DeviceClosed)?;

        let now = output.current_time();
        let start_at = self.cursor.max(now);
        let duration = buffer.duration_secs();
        let voice = VoiceId(self.next_voice);

        output.schedule(voice, buffer, start_at)?;
        self.next_voice += 1;

        self.pending.insert(voice, PendingVoice { start_at, duration });
        self.cursor = start_at + duration;
        self.stats.fragment_scheduled(duration);

        log::debug!(
            "Playback: {} at {:.3}s ({:.3}s), cursor {:.3}s",
            voice,
            start_at,
            duration,
            self.cursor
        );
        Ok(start_at)
    }

    /// A voice finished playing naturally
    pub fn on_finished(&mut self, voice: VoiceId) {
        self.pending.remove(&voice);
    }

    /// Stop every pending voice and empty the set. Returns how many were stopped.
    pub fn stop_all(&mut self) -> usize {
        let stopped = self.pending.len();
        if let Some(output) = self.output.as_mut() {
            for voice in self.pending.keys() {
                output.stop(*voice);
            }
        }
        self.pending.clear();
        stopped
    }

    /// Move the cursor to the device clock. Returns the new cursor.
    pub fn reset_cursor(&mut self) -> f64 {
        self.cursor = self.current_time();
        self.cursor
    }

    /// Device clock in seconds (0 once closed)
    pub fn current_time(&self) -> f64 {
        self.output
            .as_ref()
            .map(|o| o.current_time())
            .unwrap_or(0.0)
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.output.is_none()
    }

    pub(crate) fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let drains_at = self
            .pending
            .values()
            .map(|v| v.start_at + v.duration)
            .fold(self.current_time(), f64::max);

        PlaybackSnapshot {
            now: self.current_time(),
            cursor: self.cursor,
            pending: self.pending.len(),
            drains_at,
        }
    }

    /// Stop everything, reset the cursor to zero and release the device.
    /// Later calls are no-ops.
    pub fn shutdown(&mut self) {
        let stopped = self.stop_all();
        self.cursor = 0.0;
        if let Some(output) = self.output.take() {
            output.close();
            log::info!("Playback: closed ({} voices stopped)", stopped);
        }
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
