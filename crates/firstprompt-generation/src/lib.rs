pub mod gemini;
pub mod instructions;
pub mod providers;

pub use gemini::GeminiProvider;
pub use providers::{GenerationClient, GenerationResult, PromptRequest, TopicRequest, build_client};
