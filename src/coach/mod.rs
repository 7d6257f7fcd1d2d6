//! Gemini career-coach endpoints
//!
//! This module provides:
//! - Resume analysis, job search, gap analysis and company lookup
//!   (`models/{model}:generateContent`)
//! - A multi-turn career-coach chat
//! - Retry with exponential backoff on HTTP 429
//!
//! These are plain request/response calls. The realtime interview lives in
//! [`crate::live`].

mod chat;
mod client;
mod retry;
mod types;

pub use chat::{greeting, CoachChat, COACH_ERROR_MESSAGE};
pub use client::{CoachModels, GeminiClient, GEMINI_API_BASE};
pub use retry::{call_with_retry, RetryPolicy};
pub use types::{
    ApplicationInsight, Content, EmploymentType, Job, JobFilters, LocationType, MatchStatus,
    ResumeAnalysis,
};

/// Errors that can occur while calling the coach endpoints
#[derive(Debug, Clone)]
pub enum CoachError {
    /// Gemini API key not configured
    MissingApiKey,
    /// Request never reached the API
    NetworkError(String),
    /// HTTP 429 from the API (retried)
    RateLimited(String),
    /// Still rate limited after all retries
    QuotaExceeded,
    /// Any other non-success status
    ApiError { status: u16, message: String },
    /// Response body was not what we asked for
    ParseError(String),
}

impl CoachError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            CoachError::RateLimited(_) | CoachError::ApiError { status: 429, .. }
        )
    }
}

impl std::fmt::Display for CoachError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoachError::MissingApiKey => write!(
                f,
                "Gemini API key not configured. Set GEMINI_API_KEY or run `kazilens key set`."
            ),
            CoachError::NetworkError(e) => write!(f, "Network error: {}", e),
            CoachError::RateLimited(e) => write!(f, "Rate limited: {}", e),
            CoachError::QuotaExceeded => write!(
                f,
                "Quota exceeded. The AI service is busy, please wait a minute and try again."
            ),
            CoachError::ApiError { status, message } => {
                write!(f, "API error {}: {}", status, message)
            }
            CoachError::ParseError(e) => write!(f, "Failed to parse response: {}", e),
        }
    }
}

impl std::error::Error for CoachError {}
