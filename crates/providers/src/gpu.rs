//! Serverless GPU inference client.
//!
//! Jobs are submitted asynchronously with `POST {base}/{endpoint}/run`,
//! carrying a webhook URL the provider calls with the final job status.
//! `GET {base}/{endpoint}/status/{job_id}` returns the same status document
//! and is used by the reconciler for jobs whose webhook never arrived.

use std::time::Duration;

use async_trait::async_trait;
use muse_core::generation::ProviderJobState;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::http::{env_opt, env_u64, parse_response};

/// The kinds of GPU work the platform runs, one endpoint each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuTask {
    Txt2Img,
    Upscale,
    Img2Video,
    TalkingAvatar,
}

impl GpuTask {
    pub fn as_str(self) -> &'static str {
        match self {
            GpuTask::Txt2Img => "txt2img",
            GpuTask::Upscale => "upscale",
            GpuTask::Img2Video => "img2video",
            GpuTask::TalkingAvatar => "talking_avatar",
        }
    }
}

/// Job input, serialized as the `input` object of the run request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GpuInput {
    Txt2Img {
        prompt: String,
        negative_prompt: String,
        width: i32,
        height: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        seed: Option<i64>,
    },
    Upscale {
        image_url: String,
        scale: i32,
    },
    Img2Video {
        image_url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
        duration_secs: i32,
    },
    TalkingAvatar {
        image_url: String,
        audio_url: String,
    },
}

impl GpuInput {
    pub fn task(&self) -> GpuTask {
        match self {
            GpuInput::Txt2Img { .. } => GpuTask::Txt2Img,
            GpuInput::Upscale { .. } => GpuTask::Upscale,
            GpuInput::Img2Video { .. } => GpuTask::Img2Video,
            GpuInput::TalkingAvatar { .. } => GpuTask::TalkingAvatar,
        }
    }
}

/// Job status document, as returned by run/status and posted to webhooks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuJob {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl GpuJob {
    /// Parsed job state; `None` for statuses we do not know.
    pub fn state(&self) -> Option<ProviderJobState> {
        ProviderJobState::parse(&self.status)
    }

    /// The media reference inside `output`: a URL or base64 data.
    pub fn output_ref(&self) -> Option<String> {
        self.output.as_ref().and_then(extract_output)
    }
}

/// Dig the media reference out of a worker's output value.
///
/// Workers return either a bare string, an object with one of the usual
/// keys, or a list whose first element is one of those.
pub fn extract_output(value: &serde_json::Value) -> Option<String> {
    const KEYS: [&str; 8] = [
        "image_url", "video_url", "url", "image", "video", "images", "videos", "output",
    ];
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Array(items) => items.first().and_then(extract_output),
        serde_json::Value::Object(map) => KEYS
            .iter()
            .filter_map(|k| map.get(*k))
            .find_map(extract_output),
        _ => None,
    }
}

#[async_trait]
pub trait GpuBackend: Send + Sync {
    /// Queue a job. The provider calls `webhook_url` when it finishes.
    async fn submit(&self, input: &GpuInput, webhook_url: &str) -> Result<GpuJob, ProviderError>;

    /// Fetch the current status of a job.
    async fn status(&self, task: GpuTask, job_id: &str) -> Result<GpuJob, ProviderError>;

    /// `false` for the stand-in used when the service has no configuration.
    fn is_configured(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GpuConfig {
    pub api_url: String,
    pub api_key: String,
    pub txt2img_endpoint: String,
    pub upscale_endpoint: String,
    pub img2video_endpoint: String,
    pub avatar_endpoint: String,
    pub timeout: Duration,
}

impl GpuConfig {
    /// Load from the environment; `None` when `GPU_API_URL` or `GPU_API_KEY`
    /// is missing.
    ///
    /// | Variable                 | Required | Default          |
    /// |--------------------------|----------|------------------|
    /// | `GPU_API_URL`            | yes      | -                |
    /// | `GPU_API_KEY`            | yes      | -                |
    /// | `GPU_ENDPOINT_TXT2IMG`   | no       | `txt2img`        |
    /// | `GPU_ENDPOINT_UPSCALE`   | no       | `upscale`        |
    /// | `GPU_ENDPOINT_IMG2VIDEO` | no       | `img2video`      |
    /// | `GPU_ENDPOINT_AVATAR`    | no       | `talking-avatar` |
    /// | `GPU_TIMEOUT_SECS`       | no       | `30`             |
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_url: env_opt("GPU_API_URL")?.trim_end_matches('/').to_string(),
            api_key: env_opt("GPU_API_KEY")?,
            txt2img_endpoint: env_opt("GPU_ENDPOINT_TXT2IMG").unwrap_or_else(|| "txt2img".into()),
            upscale_endpoint: env_opt("GPU_ENDPOINT_UPSCALE").unwrap_or_else(|| "upscale".into()),
            img2video_endpoint: env_opt("GPU_ENDPOINT_IMG2VIDEO")
                .unwrap_or_else(|| "img2video".into()),
            avatar_endpoint: env_opt("GPU_ENDPOINT_AVATAR")
                .unwrap_or_else(|| "talking-avatar".into()),
            timeout: Duration::from_secs(env_u64("GPU_TIMEOUT_SECS", 30)),
        })
    }

    pub fn endpoint(&self, task: GpuTask) -> &str {
        match task {
            GpuTask::Txt2Img => &self.txt2img_endpoint,
            GpuTask::Upscale => &self.upscale_endpoint,
            GpuTask::Img2Video => &self.img2video_endpoint,
            GpuTask::TalkingAvatar => &self.avatar_endpoint,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ServerlessGpuClient {
    client: reqwest::Client,
    config: GpuConfig,
}

impl ServerlessGpuClient {
    pub fn new(client: reqwest::Client, config: GpuConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, task: GpuTask, suffix: &str) -> String {
        format!("{}/{}/{}", self.config.api_url, self.config.endpoint(task), suffix)
    }
}

#[async_trait]
impl GpuBackend for ServerlessGpuClient {
    async fn submit(&self, input: &GpuInput, webhook_url: &str) -> Result<GpuJob, ProviderError> {
        let task = input.task();
        let body = serde_json::json!({
            "input": input,
            "webhook": webhook_url,
        });

        let response = self
            .client
            .post(self.url(task, "run"))
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await?;

        let job: GpuJob = parse_response(response).await?;
        tracing::debug!(task = task.as_str(), job_id = %job.id, "GPU job submitted");
        Ok(job)
    }

    async fn status(&self, task: GpuTask, job_id: &str) -> Result<GpuJob, ProviderError> {
        let response = self
            .client
            .get(self.url(task, &format!("status/{job_id}")))
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .send()
            .await?;

        parse_response(response).await
    }
}
