//! Per-session statistics for the live voice engine
//!
//! Counters are updated from the audio thread, the sender task and the
//! inbound message loop, so they are plain atomics. A short history of
//! recent errors is kept behind a mutex for diagnostics.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum number of errors to retain in history
const MAX_ERROR_HISTORY: usize = 20;

/// Record of an error that occurred during a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Unix timestamp when error occurred (seconds)
    pub timestamp: u64,
    /// Category of error (e.g., "decode", "transport", "device")
    pub error_type: String,
    /// Human-readable error message
    pub message: String,
    /// Associated session ID, if applicable
    pub session_id: Option<String>,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub chunks_captured: u64,
    pub chunks_dropped: u64,
    pub chunks_sent: u64,
    pub fragments_scheduled: u64,
    pub fragments_rejected: u64,
    /// Total duration of scheduled response audio (seconds)
    pub scheduled_audio_secs: f64,
    pub interruptions: u64,
    pub transcript_lines: u64,
}

/// Lock-free counters shared by the pipelines of one session
#[derive(Debug, Default)]
pub struct StatsCollector {
    chunks_captured: AtomicU64,
    chunks_dropped: AtomicU64,
    chunks_sent: AtomicU64,
    fragments_scheduled: AtomicU64,
    fragments_rejected: AtomicU64,
    scheduled_audio_micros: AtomicU64,
    interruptions: AtomicU64,
    transcript_lines: AtomicU64,
    errors: Mutex<VecDeque<ErrorRecord>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_captured(&self) {
        self.chunks_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_dropped(&self) {
        self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_sent(&self) -> u64 {
        self.chunks_sent.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn fragment_scheduled(&self, duration_secs: f64) {
        self.fragments_scheduled.fetch_add(1, Ordering::Relaxed);
        self.scheduled_audio_micros
            .fetch_add((duration_secs * 1_000_000.0) as u64, Ordering::Relaxed);
    }

    pub fn fragment_rejected(&self) {
        self.fragments_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn interrupted(&self) {
        self.interruptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transcript_line(&self) {
        self.transcript_lines.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error (newest first, bounded)
    pub fn record_error(&self, error_type: &str, message: &str, session_id: Option<String>) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        errors.push_front(ErrorRecord {
            timestamp,
            error_type: error_type.to_string(),
            message: message.to_string(),
            session_id,
        });
        errors.truncate(MAX_ERROR_HISTORY);
    }

    /// Recent errors, newest first
    pub fn errors(&self) -> Vec<ErrorRecord> {
        let errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        errors.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            chunks_captured: self.chunks_captured.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            fragments_scheduled: self.fragments_scheduled.load(Ordering::Relaxed),
            fragments_rejected: self.fragments_rejected.load(Ordering::Relaxed),
            scheduled_audio_secs: self.scheduled_audio_micros.load(Ordering::Relaxed) as f64
                / 1_000_000.0,
            interruptions: self.interruptions.load(Ordering::Relaxed),
            transcript_lines: self.transcript_lines.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters and the error history for a new session
    pub fn reset(&self) {
        for counter in [
            &self.chunks_captured,
            &self.chunks_dropped,
            &self.chunks_sent,
            &self.fragments_scheduled,
            &self.fragments_rejected,
            &self.scheduled_audio_micros,
            &self.interruptions,
            &self.transcript_lines,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.errors.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
