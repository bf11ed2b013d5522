//! Text-to-speech client (ElevenLabs-style REST API).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::http::{ensure_success, env_opt, env_u64};

#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Synthesize `text` and return MP3 bytes. `voice_id = None` uses the
    /// configured default voice.
    async fn synthesize(&self, text: &str, voice_id: Option<&str>) -> Result<Vec<u8>, ProviderError>;

    /// `false` for the stand-in used when the service has no configuration.
    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub api_url: String,
    pub api_key: String,
    pub default_voice: String,
    pub model: String,
    pub timeout: Duration,
}

impl SpeechConfig {
    /// Load from the environment; `None` when `TTS_API_URL` or `TTS_API_KEY`
    /// is missing.
    ///
    /// | Variable            | Required | Default                  |
    /// |---------------------|----------|--------------------------|
    /// | `TTS_API_URL`       | yes      | -                        |
    /// | `TTS_API_KEY`       | yes      | -                        |
    /// | `TTS_DEFAULT_VOICE` | no       | `21m00Tcm4TlvDq8ikWAM`   |
    /// | `TTS_MODEL`         | no       | `eleven_multilingual_v2` |
    /// | `TTS_TIMEOUT_SECS`  | no       | `60`                     |
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_url: env_opt("TTS_API_URL")?.trim_end_matches('/').to_string(),
            api_key: env_opt("TTS_API_KEY")?,
            default_voice: env_opt("TTS_DEFAULT_VOICE")
                .unwrap_or_else(|| "21m00Tcm4TlvDq8ikWAM".into()),
            model: env_opt("TTS_MODEL").unwrap_or_else(|| "eleven_multilingual_v2".into()),
            timeout: Duration::from_secs(env_u64("TTS_TIMEOUT_SECS", 60)),
        })
    }
}

pub struct TtsClient {
    client: reqwest::Client,
    config: SpeechConfig,
}

impl TtsClient {
    pub fn new(client: reqwest::Client, config: SpeechConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl SpeechBackend for TtsClient {
    async fn synthesize(&self, text: &str, voice_id: Option<&str>) -> Result<Vec<u8>, ProviderError> {
        let voice = voice_id
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(self.config.default_voice.as_str());
        let body = serde_json::json!({
            "text": text,
            "model_id": self.config.model,
        });

        let response = self
            .client
            .post(format!("{}/v1/text-to-speech/{voice}", self.config.api_url))
            .header("xi-api-key", &self.config.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await?;

        let audio = ensure_success(response).await?.bytes().await?;
        if audio.is_empty() {
            return Err(ProviderError::InvalidResponse("speech response was empty".into()));
        }
        tracing::debug!(voice, bytes = audio.len(), "Speech synthesized");
        Ok(audio.to_vec())
    }
}
