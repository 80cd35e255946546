use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CompletionRequest, LlmClient, LlmError};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// Override for OpenAI-compatible servers.
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        OpenAiConfig {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: model.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

/// Chat-completions client that requests `stream: true` and accumulates the
/// SSE deltas incrementally, so long section extractions are not bounded by
/// a single blocking response body.
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(OpenAiClient { client, config })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
            stream: true,
        };

        let url = format!("{}/chat/completions", self.config.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(LlmError::Authentication)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let detail = response.text().await.unwrap_or_default();
                return Err(LlmError::RateLimited(detail));
            }
            status if !status.is_success() => {
                let detail = response.text().await.unwrap_or_default();
                return Err(LlmError::MalformedStream(format!(
                    "HTTP {}: {}",
                    status, detail
                )));
            }
            _ => {}
        }

        // Accumulate `data:` lines from the SSE stream. Chunks can split a
        // line anywhere, so buffer until a newline before parsing.
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut output = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim_end_matches('\r').to_string();
                buffer.drain(..=newline);

                let Some(payload) = line.strip_prefix("data: ") else {
                    continue;
                };
                if payload == "[DONE]" {
                    buffer.clear();
                    break;
                }
                let parsed: StreamChunk = serde_json::from_str(payload)
                    .map_err(|e| LlmError::MalformedStream(format!("{}: {}", e, payload)))?;
                if let Some(delta) = parsed
                    .choices
                    .first()
                    .and_then(|c| c.delta.content.as_deref())
                {
                    output.push_str(delta);
                }
            }
        }

        if output.trim().is_empty() {
            return Err(LlmError::EmptyCompletion);
        }
        log::debug!(
            "Completion finished: {} chars accumulated from stream",
            output.len()
        );
        Ok(output)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_chunk_parses_a_content_delta() {
        let payload = r#"{"choices":[{"delta":{"content":"Risk "}}]}"#;
        let chunk: StreamChunk = serde_json::from_str(payload).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Risk "));
    }

    #[test]
    fn stream_chunk_tolerates_role_only_deltas() {
        let payload = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        let chunk: StreamChunk = serde_json::from_str(payload).unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
    }
}
