//! Stand-in for services without configuration.

use async_trait::async_trait;
use muse_core::prompt::ChatTurn;

use crate::error::ProviderError;
use crate::gpu::{GpuBackend, GpuInput, GpuJob, GpuTask};
use crate::llm::{LlmBackend, TokenStream};
use crate::speech::SpeechBackend;
use crate::storage::MediaStorage;

/// Fails every call with [`ProviderError::NotConfigured`] naming the service.
#[derive(Debug, Clone, Copy)]
pub struct Unconfigured(pub &'static str);

#[async_trait]
impl GpuBackend for Unconfigured {
    async fn submit(&self, _input: &GpuInput, _webhook_url: &str) -> Result<GpuJob, ProviderError> {
        Err(ProviderError::NotConfigured(self.0))
    }

    async fn status(&self, _task: GpuTask, _job_id: &str) -> Result<GpuJob, ProviderError> {
        Err(ProviderError::NotConfigured(self.0))
    }

    fn is_configured(&self) -> bool {
        false
    }
}

#[async_trait]
impl LlmBackend for Unconfigured {
    async fn chat(&self, _messages: &[ChatTurn]) -> Result<String, ProviderError> {
        Err(ProviderError::NotConfigured(self.0))
    }

    async fn chat_stream(&self, _messages: &[ChatTurn]) -> Result<TokenStream, ProviderError> {
        Err(ProviderError::NotConfigured(self.0))
    }

    fn is_configured(&self) -> bool {
        false
    }
}

#[async_trait]
impl SpeechBackend for Unconfigured {
    async fn synthesize(&self, _text: &str, _voice_id: Option<&str>) -> Result<Vec<u8>, ProviderError> {
        Err(ProviderError::NotConfigured(self.0))
    }

    fn is_configured(&self) -> bool {
        false
    }
}

#[async_trait]
impl MediaStorage for Unconfigured {
    async fn upload(
        &self,
        _path: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::NotConfigured(self.0))
    }

    async fn delete(&self, _path: &str) -> Result<(), ProviderError> {
        Err(ProviderError::NotConfigured(self.0))
    }

    fn is_configured(&self) -> bool {
        false
    }
}
