use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use firstprompt_common::{Error, GenerationError, Result};
use firstprompt_config::GenerationConfig;
use serde::{Deserialize, Serialize};

use crate::gemini::GeminiProvider;

pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

/// Stateless request/response access to a generative model.
///
/// Implementations do not retry; a failed call surfaces as a
/// [`GenerationError`] and retry policy belongs to the caller.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Provider identifier (e.g. "gemini").
    fn provider_id(&self) -> &str;

    /// At most `request.count` topics, in the order the model listed them.
    async fn generate_topics(&self, request: &TopicRequest) -> GenerationResult<Vec<String>>;

    /// At most `request.count` prompts, written in `request.language`.
    async fn generate_suggested_prompts(
        &self,
        request: &PromptRequest,
    ) -> GenerationResult<Vec<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRequest {
    pub subject: String,
    pub grade: String,
    pub country: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub topic: String,
    pub country: String,
    pub grade: String,
    pub language: String,
    pub count: usize,
}

/// Build the configured provider.
pub fn build_client(config: &GenerationConfig) -> Result<Arc<dyn GenerationClient>> {
    match config.provider.as_str() {
        "gemini" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                Error::Config("generation.api_key (or GEMINI_API_KEY) is required".into())
            })?;
            let provider = GeminiProvider::new(
                api_key,
                Some(config.model.clone()),
                config.base_url.clone(),
                Duration::from_secs(config.timeout_secs),
            )
            .with_search_grounding(config.search_grounding);
            Ok(Arc::new(provider))
        }
        other => Err(Error::Config(format!(
            "unsupported generation provider: {other}"
        ))),
    }
}
