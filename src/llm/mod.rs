//! LLM extraction boundary.
//!
//! The client is a constructor-injected trait object so tests substitute a
//! mock without touching any global state. Extraction calls are always
//! zero-temperature, and the production client consumes the response as a
//! stream so section-sized outputs are not capped by one blocking response.

pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

pub use openai::{OpenAiClient, OpenAiConfig};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication failed")]
    Authentication,

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed stream: {0}")]
    MalformedStream(String),

    #[error("model returned an empty completion")]
    EmptyCompletion,
}

/// A single text-completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    /// Generous but finite output ceiling; the streaming channel accumulates
    /// up to this many tokens.
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    /// Deterministic (temperature 0) request, the only mode extraction uses.
    pub fn deterministic(prompt: impl Into<String>) -> Self {
        CompletionRequest {
            system: None,
            prompt: prompt.into(),
            max_output_tokens: 16_384,
            temperature: 0.0,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = max;
        self
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Runs one completion and returns the accumulated output text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;

    fn name(&self) -> &str {
        "llm"
    }
}
