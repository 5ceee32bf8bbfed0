pub mod assessor;
pub mod providers;
pub mod retry;
pub mod streaming;

use pharmassist_core::config::ModelConfig;
use pharmassist_core::error::{PharmaError, Result};
use pharmassist_core::traits::LlmClient;

pub use assessor::{LlmAssessor, TimeoutCapability};
pub use providers::anthropic::AnthropicClient;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Providers served by the OpenAI-compatible chat completions client.
const OPENAI_COMPATIBLE: &[&str] = &[
    "openai",
    "azure",
    "ollama",
    "groq",
    "together",
    "openrouter",
    "vllm",
];

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "anthropic" | "claude" => Ok(Box::new(AnthropicClient::new())),
        p if OPENAI_COMPATIBLE.contains(&p) => Ok(Box::new(OpenAiClient::new())),
        other => Err(PharmaError::UnsupportedProvider(other.to_string())),
    }
}
