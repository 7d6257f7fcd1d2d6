//! Gemini `generateContent` client for the coach endpoints
//!
//! Request bodies and response parsing are plain functions so they can be
//! tested without the network; [`GeminiClient`] only adds HTTP and retry.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

use super::retry::{call_with_retry, RetryPolicy};
use super::types::{
    ApiErrorResponse, ApplicationInsight, Content, GenerateRequest, GenerateResponse,
    GenerationConfig, Job, JobFilters, ResumeAnalysis, ThinkingConfig,
};
use super::CoachError;

/// REST base URL of the Gemini API
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Request timeout for batch calls (grounded search and thinking are slow)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Number of openings requested from the structuring call
const JOB_COUNT: usize = 6;

/// Model used for each endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct CoachModels {
    pub analysis: String,
    pub search: String,
    pub insight: String,
    pub maps: String,
    pub chat: String,
}

impl Default for CoachModels {
    fn default() -> Self {
        Self {
            analysis: "gemini-3-pro-preview".to_string(),
            search: "gemini-3-flash-preview".to_string(),
            insight: "gemini-3-flash-preview".to_string(),
            maps: "gemini-2.5-flash".to_string(),
            chat: "gemini-3-pro-preview".to_string(),
        }
    }
}

/// Client for the batch coach endpoints
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
    models: CoachModels,
    retry: RetryPolicy,
    thinking_budget: u32,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, CoachError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(CoachError::MissingApiKey);
        }

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CoachError::NetworkError(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            base_url: GEMINI_API_BASE.to_string(),
            models: CoachModels::default(),
            retry: RetryPolicy::default(),
            thinking_budget: 32768,
        })
    }

    pub fn with_models(mut self, models: CoachModels) -> Self {
        self.models = models;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_thinking_budget(mut self, budget: u32) -> Self {
        self.thinking_budget = budget;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn models(&self) -> &CoachModels {
        &self.models
    }

    /// One `generateContent` call, no retry
    async fn generate(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, CoachError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        log::debug!("Coach: POST {}", url);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| CoachError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_status(status.as_u16(), &body));
        }

        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| CoachError::ParseError(e.to_string()))
    }

    /// `generate` wrapped in the retry policy, returning the response text
    async fn generate_text(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<String, CoachError> {
        call_with_retry(&self.retry, move || async move {
            self.generate(model, request).await.map(|r| r.text())
        })
        .await
    }

    /// Score a resume and extract name, role, skills and improvements
    pub async fn analyze_resume(&self, resume_text: &str) -> Result<ResumeAnalysis, CoachError> {
        log::info!("Coach: analyzing resume ({} chars)", resume_text.len());
        let request = analysis_request(resume_text, self.thinking_budget);
        let text = self.generate_text(&self.models.analysis, &request).await?;
        parse_json(&text)
    }

    /// Search the web for openings, then structure the results into jobs
    pub async fn fetch_jobs(
        &self,
        query: &str,
        location: &str,
        filters: &JobFilters,
    ) -> Result<Vec<Job>, CoachError> {
        log::info!("Coach: searching jobs for {:?} in {:?}", query, location);
        let model = self.models.search.as_str();
        let search = &job_search_request(query, location, filters);

        // Both calls retry together, as one logical operation
        let text = call_with_retry(&self.retry, move || async move {
            let found = self.generate(model, search).await?.text();
            let structuring = job_structuring_request(&found);
            self.generate(model, &structuring).await.map(|r| r.text())
        })
        .await?;

        let jobs: Vec<Job> = parse_json_or_empty(&text)?;
        log::info!("Coach: {} jobs found", jobs.len());
        Ok(jobs)
    }

    /// Gap analysis between a resume and a job
    pub async fn application_insights(
        &self,
        resume: &ResumeAnalysis,
        job: &Job,
    ) -> Result<ApplicationInsight, CoachError> {
        let request = insight_request(resume, job)?;
        let text = self.generate_text(&self.models.insight, &request).await?;
        parse_json(&text)
    }

    /// Office locations and culture summary, as free text
    pub async fn company_location(&self, company: &str) -> Result<String, CoachError> {
        let request = company_request(company);
        self.generate_text(&self.models.maps, &request).await
    }

    /// One coach chat turn over the full history
    pub async fn chat(
        &self,
        system_instruction: &str,
        history: &[Content],
    ) -> Result<String, CoachError> {
        let request = GenerateRequest {
            contents: history.to_vec(),
            system_instruction: Some(Content::system(system_instruction)),
            tools: Vec::new(),
            generation_config: None,
        };
        self.generate_text(&self.models.chat, &request).await
    }
}

// ============================================================================
// Request builders
// ============================================================================

fn json_config(schema: serde_json::Value) -> GenerationConfig {
    GenerationConfig {
        response_mime_type: Some("application/json".to_string()),
        response_schema: Some(schema),
        thinking_config: None,
    }
}

fn string_array() -> serde_json::Value {
    json!({"type": "ARRAY", "items": {"type": "STRING"}})
}

pub(crate) fn analysis_request(resume_text: &str, thinking_budget: u32) -> GenerateRequest {
    let prompt = format!(
        "Analyze the following resume text and provide a JSON response with structure:\n\
         {{\n  \"score\": number (0-100),\n  \"parsedName\": string,\n  \"parsedRole\": string,\n  \
         \"improvements\": string[] (exactly 3 bullet points),\n  \"skills\": string[],\n  \
         \"summary\": string\n}}\n\nResume content: {}",
        resume_text
    );

    let schema = json!({
        "type": "OBJECT",
        "properties": {
            "score": {"type": "NUMBER"},
            "parsedName": {"type": "STRING"},
            "parsedRole": {"type": "STRING"},
            "improvements": string_array(),
            "skills": string_array(),
            "summary": {"type": "STRING"}
        },
        "required": ["score", "parsedName", "parsedRole", "improvements", "skills", "summary"]
    });

    let mut config = json_config(schema);
    config.thinking_config = Some(ThinkingConfig { thinking_budget });

    GenerateRequest {
        contents: vec![Content::user(prompt)],
        system_instruction: None,
        tools: Vec::new(),
        generation_config: Some(config),
    }
}

pub(crate) fn job_search_request(
    query: &str,
    location: &str,
    filters: &JobFilters,
) -> GenerateRequest {
    let qualifiers = [
        filters.location_type.map(|t| t.as_str()),
        filters.employment_type.map(|t| t.as_str()),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");

    let subject = if qualifiers.is_empty() {
        "job openings".to_string()
    } else {
        format!("{} job openings", qualifiers)
    };

    let prompt = format!(
        "Search for {} for \"{}\" in \"{}\" or worldwide. \
         Prioritize listings from LinkedIn and company career pages.",
        subject, query, location
    );

    GenerateRequest {
        contents: vec![Content::user(prompt)],
        system_instruction: None,
        tools: vec![json!({"googleSearch": {}})],
        generation_config: None,
    }
}

pub(crate) fn job_structuring_request(search_results: &str) -> GenerateRequest {
    let prompt = format!(
        "Based on your search results, create a JSON list of {} job openings. \
         Include detailed requirements and company details.\nSearch Results: {}",
        JOB_COUNT, search_results
    );

    let schema = json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "id": {"type": "STRING"},
                "title": {"type": "STRING"},
                "company": {"type": "STRING"},
                "location": {"type": "STRING"},
                "salary": {"type": "STRING"},
                "description": {"type": "STRING"},
                "requirements": string_array(),
                "employmentType": {"type": "STRING"},
                "locationType": {"type": "STRING"},
                "sourceUrl": {"type": "STRING"},
                "companyDetails": {"type": "STRING"},
                "postedDate": {"type": "STRING"}
            }
        }
    });

    GenerateRequest {
        contents: vec![Content::user(prompt)],
        system_instruction: None,
        tools: Vec::new(),
        generation_config: Some(json_config(schema)),
    }
}

pub(crate) fn insight_request(
    resume: &ResumeAnalysis,
    job: &Job,
) -> Result<GenerateRequest, CoachError> {
    let resume_json =
        serde_json::to_string(resume).map_err(|e| CoachError::ParseError(e.to_string()))?;
    let job_json = serde_json::to_string(job).map_err(|e| CoachError::ParseError(e.to_string()))?;

    let prompt = format!(
        "Perform a detailed gap analysis between this resume and job requirements.\n\
         Resume: {}\nJob: {}",
        resume_json, job_json
    );

    let schema = json!({
        "type": "OBJECT",
        "properties": {
            "status": {"type": "STRING", "enum": ["Strong Match", "Potential Match", "Gaps Detected"]},
            "reasoning": {"type": "STRING"},
            "missingKeywords": string_array(),
            "tipsToWin": {"type": "STRING"}
        },
        "required": ["status", "reasoning", "missingKeywords", "tipsToWin"]
    });

    Ok(GenerateRequest {
        contents: vec![Content::user(prompt)],
        system_instruction: None,
        tools: Vec::new(),
        generation_config: Some(json_config(schema)),
    })
}

pub(crate) fn company_request(company: &str) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content::user(format!(
            "Find office locations and cultural summary for {}.",
            company
        ))],
        system_instruction: None,
        tools: vec![json!({"googleMaps": {}})],
        generation_config: None,
    }
}

// ============================================================================
// Response handling
// ============================================================================

fn error_from_status(status: u16, body: &str) -> CoachError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|r| r.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status {
        429 => CoachError::RateLimited(message),
        401 | 403 => CoachError::ApiError {
            status,
            message: format!("Invalid or unauthorized API key: {}", message),
        },
        _ => CoachError::ApiError { status, message },
    }
}

/// Strip a Markdown code fence the model sometimes wraps JSON in
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub(crate) fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, CoachError> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return Err(CoachError::ParseError("empty response".to_string()));
    }
    serde_json::from_str(body).map_err(|e| CoachError::ParseError(e.to_string()))
}

/// Like [`parse_json`], but an empty body means an empty list
fn parse_json_or_empty<T: DeserializeOwned>(text: &str) -> Result<Vec<T>, CoachError> {
    if strip_code_fence(text).is_empty() {
        return Ok(Vec::new());
    }
    parse_json(text)
}
