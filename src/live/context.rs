//! Interview context for a voice session

use crate::coach::ResumeAnalysis;

/// Role used when no resume analysis is available
const DEFAULT_ROLE: &str = "Professional";

/// What the interviewer knows about the candidate
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub analysis: Option<ResumeAnalysis>,
}

impl SessionContext {
    pub fn new(analysis: Option<ResumeAnalysis>) -> Self {
        Self { analysis }
    }

    /// Role the mock interview targets
    pub fn target_role(&self) -> &str {
        self.analysis
            .as_ref()
            .map(|a| a.parsed_role.trim())
            .filter(|role| !role.is_empty())
            .unwrap_or(DEFAULT_ROLE)
    }

    /// Interviewer persona sent once in the session setup
    pub fn system_instruction(&self) -> String {
        let background = self
            .analysis
            .as_ref()
            .and_then(|a| serde_json::to_string(a).ok())
            .unwrap_or_else(|| "not provided".to_string());

        format!(
            "You are a strict but fair interviewer at KaziLens AI. \
             The user's background: {}. \
             Conduct a high-stakes mock interview for the role of {}. \
             Keep your questions concise. Wait for them to answer. \
             Provide real-time feedback after they answer a few questions.",
            background,
            self.target_role()
        )
    }
}
