//! Realtime voice session engine for mock-interview practice
//!
//! Microphone audio is framed and streamed to the Gemini Live API while the
//! interviewer's spoken answers are played back gaplessly on the speaker.
//!
//! # Architecture
//!
//! ```text
//! Mic (cpal) ──▶ CaptureFramer (4096 @ 16kHz) ──▶ bounded queue ──▶ sender task
//!                                                                      │
//!                                                                      ▼
//!                                                              LiveTransport
//!                                                               (WebSocket)
//!                                                                      │
//!                          ┌──────────────── inbound loop ◀────────────┘
//!                          ▼
//!     transcripts ──▶ TranscriptLog     audio ──▶ PlaybackScheduler ──▶ Speaker
//!                                       interrupted ──▶ barge_in
//! ```
//!
//! # Failure Strategy
//!
//! - No retry or reconnect for the live stream
//! - Malformed audio fragments are skipped, playback continues
//! - Remote close or transport error tears the session down to `Idle`

mod capture;
mod client;
mod context;
mod interrupt;
mod playback;
mod protocol;
mod session;
mod transcript;

pub use capture::{
    run_sender, CaptureFramer, CapturePipeline, OutboundChunk, CAPTURE_FRAME_SAMPLES,
    DEFAULT_QUEUE_CAPACITY,
};
pub use client::{GeminiLiveTransport, LiveSink, LiveStream, LiveTransport};
pub use context::SessionContext;
pub use interrupt::{barge_in, BargeIn};
pub use playback::{PlaybackScheduler, PlaybackSnapshot};
pub use protocol::{
    ClientMessage, InboundEvent, MediaBlob, ServerMessage, SetupConfig, Speaker,
    DEFAULT_LIVE_MODEL, DEFAULT_VOICE, LIVE_API_URL,
};
pub use session::{LiveConfig, SessionStatus, VoiceSession};
pub use transcript::{TranscriptLine, TranscriptLog, DEFAULT_TRANSCRIPT_WINDOW};

use crate::audio::AudioError;

/// Transport-level errors of the Live WebSocket
#[derive(Debug, Clone)]
pub enum StreamingError {
    /// Gemini API key not configured
    MissingApiKey,
    /// Failed to establish WebSocket connection
    ConnectionFailed(String),
    /// Server rejected the session setup
    SetupRejected(String),
    /// WebSocket protocol error
    ProtocolError(String),
    /// Connection was closed unexpectedly
    Disconnected(String),
    /// Failed to send audio data
    SendFailed(String),
}

impl std::fmt::Display for StreamingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamingError::MissingApiKey => {
                write!(
                    f,
                    "Gemini API key not configured. Set GEMINI_API_KEY or run `kazilens key set`."
                )
            }
            StreamingError::ConnectionFailed(e) => {
                write!(f, "Failed to connect to Gemini Live API: {}", e)
            }
            StreamingError::SetupRejected(e) => write!(f, "Session setup rejected: {}", e),
            StreamingError::ProtocolError(e) => write!(f, "WebSocket protocol error: {}", e),
            StreamingError::Disconnected(e) => write!(f, "WebSocket disconnected: {}", e),
            StreamingError::SendFailed(e) => write!(f, "Failed to send audio: {}", e),
        }
    }
}

impl std::error::Error for StreamingError {}

/// Errors returned by [`VoiceSession::start`]
#[derive(Debug, Clone)]
pub enum SessionError {
    /// Microphone or speaker could not be acquired
    DeviceUnavailable(AudioError),
    /// The live stream could not be opened or dropped mid-session
    ConnectionError(StreamingError),
    /// A session is already connecting or active
    AlreadyStarted,
    /// `stop()` was called while the connection was being established
    Cancelled,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::DeviceUnavailable(e) => write!(f, "Audio device unavailable: {}", e),
            SessionError::ConnectionError(e) => write!(f, "Connection error: {}", e),
            SessionError::AlreadyStarted => write!(f, "A voice session is already running"),
            SessionError::Cancelled => write!(f, "Session start was cancelled"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::DeviceUnavailable(e) => Some(e),
            SessionError::ConnectionError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AudioError> for SessionError {
    fn from(e: AudioError) -> Self {
        SessionError::DeviceUnavailable(e)
    }
}

impl From<StreamingError> for SessionError {
    fn from(e: StreamingError) -> Self {
        SessionError::ConnectionError(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_error_display() {
        let err = StreamingError::MissingApiKey;
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let err = StreamingError::ConnectionFailed("timeout".to_string());
        assert!(err.to_string().contains("timeout"));

        let err = StreamingError::SetupRejected("invalid model".to_string());
        assert!(err.to_string().contains("invalid model"));
    }

    #[test]
    fn test_session_error_conversions() {
        let err: SessionError = AudioError::NoInputDevice.into();
        assert!(matches!(err, SessionError::DeviceUnavailable(_)));
        assert!(std::error::Error::source(&err).is_some());

        let err: SessionError = StreamingError::Disconnected("eof".to_string()).into();
        assert!(matches!(err, SessionError::ConnectionError(_)));
        assert!(err.to_string().contains("eof"));
    }
}
