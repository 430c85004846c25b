//! LLM integration module.
//!
//! Every stage talks to a language model through the [`LlmClient`] trait.
//! The bundled [`ProxyClient`] speaks the OpenAI chat-completions protocol
//! to a backend proxy that holds the provider credentials.

#[cfg(feature = "ai")]
mod proxy;

#[cfg(feature = "ai")]
pub use proxy::ProxyClient;

use async_trait::async_trait;

use crate::workflow::DEFAULT_MODEL;

/// Default sampling temperature for stage prompts.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// A single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub model: String,
    pub temperature: f32,
    /// Ask the model for a JSON object response
    pub json: bool,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            json: false,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Request a JSON object response.
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// LLM error types.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[cfg(feature = "ai")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("No response from LLM")]
    NoResponse,

    #[error("Invalid LLM configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for LLM calls.
pub type LlmResult<T> = Result<T, LlmError>;

/// Trait for text-completion backends.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a prompt and return the raw response text.
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<String>;

    /// Get the backend name.
    fn name(&self) -> &str;
}
