//! Barge-in handling
//!
//! When the user talks over the interviewer the server sends
//! `interrupted`. Everything queued for playback is stale at that point and
//! must go silent immediately, and the next response starts from "now".

use serde::Serialize;

use super::playback::PlaybackScheduler;

/// What an interruption did
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BargeIn {
    /// Voices that were scheduled or playing and got stopped
    pub stopped: usize,
    /// Cursor after the reset (device clock, seconds)
    pub resumed_at: f64,
}

/// Stop all pending playback and move the cursor to the device clock.
///
/// Runs under the scheduler lock, so no fragment can be scheduled between
/// the stop and the cursor reset.
pub fn barge_in(scheduler: &mut PlaybackScheduler) -> BargeIn {
    let stopped = scheduler.stop_all();
    let resumed_at = scheduler.reset_cursor();
    scheduler.stats().interrupted();

    log::info!(
        "Interrupt: stopped {} voices, playback resumes at {:.3}s",
        stopped,
        resumed_at
    );

    BargeIn {
        stopped,
        resumed_at,
    }
}
