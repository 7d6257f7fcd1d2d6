//! Multi-turn career-coach chat

use super::client::GeminiClient;
use super::types::{Content, ResumeAnalysis};
use super::CoachError;

/// Shown to the user when a chat turn fails
pub const COACH_ERROR_MESSAGE: &str = "Error connecting to coach. Please try again.";

/// Opening message of a chat
pub fn greeting(analysis: Option<&ResumeAnalysis>) -> String {
    let name = analysis
        .map(|a| a.parsed_name.trim())
        .filter(|n| !n.is_empty())
        .unwrap_or("there");
    format!(
        "Hi {}! I'm your KaziLens Career Coach. How can I help you accelerate your job search today?",
        name
    )
}

fn system_instruction(analysis: Option<&ResumeAnalysis>) -> String {
    let background = analysis
        .and_then(|a| serde_json::to_string(a).ok())
        .unwrap_or_else(|| "not provided".to_string());
    format!(
        "You are a high-level career coach at KaziLens AI. \
         You have the user's resume analysis: {}. \
         Be professional, encouraging, and provide tactical advice for job applications, \
         networking, and salary negotiation.",
        background
    )
}

/// Chat session with the full history resent on every turn
pub struct CoachChat {
    client: GeminiClient,
    system_instruction: String,
    history: Vec<Content>,
}

impl CoachChat {
    pub fn new(client: GeminiClient, analysis: Option<&ResumeAnalysis>) -> Self {
        Self {
            client,
            system_instruction: system_instruction(analysis),
            history: Vec::new(),
        }
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// Send a user message and return the coach's reply.
    ///
    /// On failure the user message is dropped from the history so the
    /// conversation can simply be retried.
    pub async fn send(&mut self, message: &str) -> Result<String, CoachError> {
        self.history.push(Content::user(message));

        match self
            .client
            .chat(&self.system_instruction, &self.history)
            .await
        {
            Ok(reply) => {
                self.history.push(Content::model(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                log::warn!("Coach: chat turn failed: {}", e);
                self.history.pop();
                Err(e)
            }
        }
    }
}
