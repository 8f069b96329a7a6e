use std::time::Duration;

use async_trait::async_trait;
use firstprompt_common::GenerationError;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::instructions::{
    parse_prompts, parse_topics, prompts_instruction, suggested_prompts_schema, topics_instruction,
};
use crate::providers::{GenerationClient, GenerationResult, PromptRequest, TopicRequest};

const DEFAULT_MODEL: &str = "gemini-2.5-pro";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini `generateContent` provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    search_grounding: bool,
}

impl GeminiProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            search_grounding: true,
        }
    }

    /// Enable or disable the web search tool for topic generation.
    pub fn with_search_grounding(mut self, enabled: bool) -> Self {
        self.search_grounding = enabled;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn build_topics_request(&self, request: &TopicRequest) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent::user(topics_instruction(request))],
            tools: self
                .search_grounding
                .then(|| vec![serde_json::json!({ "google_search": {} })]),
            generation_config: None,
        }
    }

    fn build_prompts_request(&self, request: &PromptRequest) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent::user(prompts_instruction(request))],
            tools: None,
            generation_config: Some(GeminiGenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: suggested_prompts_schema(),
            }),
        }
    }

    async fn generate(&self, body: &GeminiRequest) -> GenerationResult<String> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GenerationError::from_reqwest(&e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::from_status(status, body));
        }

        let api_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| match GenerationError::from_reqwest(&e) {
                GenerationError::Timeout(msg) => GenerationError::Timeout(msg),
                _ => GenerationError::Malformed(format!("failed to parse gemini response: {e}")),
            })?;

        api_response.into_text()
    }
}

#[async_trait]
impl GenerationClient for GeminiProvider {
    fn provider_id(&self) -> &str {
        "gemini"
    }

    #[instrument(skip(self, request), fields(model, subject = %request.subject))]
    async fn generate_topics(&self, request: &TopicRequest) -> GenerationResult<Vec<String>> {
        tracing::Span::current().record("model", self.model.as_str());
        let text = self.generate(&self.build_topics_request(request)).await?;
        debug!("gemini topics response: {} bytes", text.len());
        parse_topics(&text, request.count)
    }

    #[instrument(skip(self, request), fields(model, language = %request.language))]
    async fn generate_suggested_prompts(
        &self,
        request: &PromptRequest,
    ) -> GenerationResult<Vec<String>> {
        tracing::Span::current().record("model", self.model.as_str());
        let text = self.generate(&self.build_prompts_request(request)).await?;
        debug!("gemini prompts response: {} bytes", text.len());
        parse_prompts(&text, request.count)
    }
}

// --- Gemini Wire Types (private) ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn user(text: String) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![GeminiPart { text: Some(text) }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

impl GeminiResponse {
    /// Concatenated text parts of the first candidate.
    fn into_text(self) -> GenerationResult<String> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(GenerationError::Malformed(format!(
                "gemini returned no candidates: {reason}"
            )));
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::Malformed(format!(
                "gemini candidate has no text (finish_reason={})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }
}
