//! Rolling transcript of a live session
//!
//! Only the most recent lines are kept: the interview view shows a short
//! window of the conversation, and older lines are dropped as new ones
//! arrive.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use super::protocol::Speaker;

/// Lines kept by default
pub const DEFAULT_TRANSCRIPT_WINDOW: usize = 5;

/// One transcript fragment attributed to a speaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptLine {
    pub speaker: Speaker,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl std::fmt::Display for TranscriptLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.speaker.label(), self.text)
    }
}

/// Bounded transcript window, oldest line dropped first
#[derive(Debug, Clone)]
pub struct TranscriptLog {
    lines: VecDeque<TranscriptLine>,
    capacity: usize,
    total: u64,
}

impl Default for TranscriptLog {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSCRIPT_WINDOW)
    }
}

impl TranscriptLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }

    /// Append a fragment. Blank fragments are ignored and return `None`.
    pub fn push(&mut self, speaker: Speaker, text: &str) -> Option<TranscriptLine> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let line = TranscriptLine {
            speaker,
            text: text.to_string(),
            received_at: Utc::now(),
        };

        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.clone());
        self.total += 1;

        if self.total % 20 == 0 {
            log::debug!("TranscriptLog: {} lines received", self.total);
        }
        Some(line)
    }

    /// Current window, oldest first
    pub fn lines(&self) -> Vec<TranscriptLine> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines received since the last reset, including dropped ones
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.total = 0;
    }
}
