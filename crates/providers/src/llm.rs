//! OpenAI-compatible chat completions client.
//!
//! `chat` returns the whole reply; `chat_stream` requests `stream: true` and
//! yields content deltas parsed from the server-sent-event body.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use muse_core::prompt::ChatTurn;
use serde::Deserialize;

use crate::error::ProviderError;
use crate::http::{ensure_success, env_opt, env_u64, parse_response};

/// Stream of content deltas. Ends when the upstream body ends.
pub type TokenStream = BoxStream<'static, Result<String, ProviderError>>;

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Complete a conversation and return the assistant's reply.
    async fn chat(&self, messages: &[ChatTurn]) -> Result<String, ProviderError>;

    /// Complete a conversation, yielding the reply as it is generated.
    async fn chat_stream(&self, messages: &[ChatTurn]) -> Result<TokenStream, ProviderError>;

    /// `false` for the stand-in used when the service has no configuration.
    fn is_configured(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl LlmConfig {
    /// Load from the environment; `None` when `LLM_API_URL` or `LLM_API_KEY`
    /// is missing.
    ///
    /// | Variable           | Required | Default       |
    /// |--------------------|----------|---------------|
    /// | `LLM_API_URL`      | yes      | -             |
    /// | `LLM_API_KEY`      | yes      | -             |
    /// | `LLM_MODEL`        | no       | `gpt-4o-mini` |
    /// | `LLM_MAX_TOKENS`   | no       | `512`         |
    /// | `LLM_TEMPERATURE`  | no       | `0.8`         |
    /// | `LLM_TIMEOUT_SECS` | no       | `60`          |
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_url: env_opt("LLM_API_URL")?.trim_end_matches('/').to_string(),
            api_key: env_opt("LLM_API_KEY")?,
            model: env_opt("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".into()),
            max_tokens: env_u64("LLM_MAX_TOKENS", 512) as u32,
            temperature: env_opt("LLM_TEMPERATURE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.8),
            timeout: Duration::from_secs(env_u64("LLM_TIMEOUT_SECS", 60)),
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenAiChatClient {
    client: reqwest::Client,
    config: LlmConfig,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }

    fn request(&self, messages: &[ChatTurn], stream: bool) -> reqwest::RequestBuilder {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "stream": stream,
        });
        self.client
            .post(format!("{}/chat/completions", self.config.api_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
    }
}

#[async_trait]
impl LlmBackend for OpenAiChatClient {
    async fn chat(&self, messages: &[ChatTurn]) -> Result<String, ProviderError> {
        let response = self
            .request(messages, false)
            .timeout(self.config.timeout)
            .send()
            .await?;

        let completion: CompletionResponse = parse_response(response).await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("completion has no content".into()))
    }

    async fn chat_stream(&self, messages: &[ChatTurn]) -> Result<TokenStream, ProviderError> {
        // No total timeout here: a long reply keeps the body open.
        let response = self.request(messages, true).send().await?;
        let response = ensure_success(response).await?;

        let mut decoder = SseDecoder::default();
        let stream = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => decoder.push(&bytes).into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(ProviderError::from(e))],
            })
            .flat_map(futures::stream::iter);

        Ok(stream.boxed())
    }
}

// ---------------------------------------------------------------------------
// SSE decoding
// ---------------------------------------------------------------------------

/// Incremental decoder for a chat-completions event stream.
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters and events split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a chunk and return the content deltas of every completed line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut deltas = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(delta) = parse_delta(line.trim_end_matches(['\r', '\n'])) {
                deltas.push(delta);
            }
        }
        deltas
    }
}

/// Extract the content delta from one `data:` line, if it carries any.
pub fn parse_delta(line: &str) -> Option<String> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    let value: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed stream event");
            return None;
        }
    };
    value["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
