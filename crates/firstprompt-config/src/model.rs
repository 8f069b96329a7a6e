use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub warehouse: WarehouseConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: Some("info".to_string()),
            generation: GenerationConfig::default(),
            pipeline: PipelineConfig::default(),
            warehouse: WarehouseConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_topics_per_combination")]
    pub topics_per_combination: usize,

    #[serde(default = "default_prompts_per_topic")]
    pub prompts_per_topic: usize,

    /// Let the model ground topic lists in web search results.
    #[serde(default = "default_true")]
    pub search_grounding: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            timeout_secs: default_generation_timeout(),
            topics_per_combination: default_topics_per_combination(),
            prompts_per_topic: default_prompts_per_topic(),
            search_grounding: true,
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_generation_timeout() -> u64 {
    120
}

fn default_topics_per_combination() -> usize {
    15
}

fn default_prompts_per_topic() -> usize {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempts per item, including the first. 1 disables retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            progress_every: default_progress_every(),
        }
    }
}

fn default_concurrency() -> usize {
    20
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_progress_every() -> usize {
    25
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_project")]
    pub project: String,

    #[serde(default = "default_dataset")]
    pub dataset: String,

    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_warehouse_timeout")]
    pub timeout_secs: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            dataset: default_dataset(),
            access_token: None,
            base_url: None,
            timeout_secs: default_warehouse_timeout(),
        }
    }
}

fn default_project() -> String {
    "knowunity-data-prod".to_string()
}

fn default_dataset() -> String {
    "knowunity_backend_public".to_string()
}

fn default_warehouse_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/suggested_messages.db")
}

fn default_batch_size() -> usize {
    1000
}
