//! HTTP clients for the external inference and storage services.
//!
//! Each service sits behind an `async-trait` trait so the API can hold an
//! `Arc<dyn Trait>` and tests can substitute fakes:
//!
//! - [`GpuBackend`]: serverless GPU jobs (txt2img, upscale, img2video,
//!   talking avatar) with webhook completion and status polling.
//! - [`LlmBackend`]: OpenAI-compatible chat completions, plain and streamed.
//! - [`SpeechBackend`]: text-to-speech returning MP3 bytes.
//! - [`MediaStorage`]: CDN object storage for generated media.
//!
//! A service whose configuration is absent is represented by
//! [`Unconfigured`], which fails every call with
//! [`ProviderError::NotConfigured`].

pub mod error;
pub mod gpu;
mod http;
pub mod llm;
pub mod media;
pub mod speech;
pub mod storage;
pub mod unconfigured;

pub use error::ProviderError;
pub use gpu::{GpuBackend, GpuConfig, GpuInput, GpuJob, GpuTask, ServerlessGpuClient};
pub use llm::{LlmBackend, LlmConfig, OpenAiChatClient, TokenStream};
pub use media::{fetch_output, MediaBlob};
pub use speech::{SpeechBackend, SpeechConfig, TtsClient};
pub use storage::{BunnyStorage, MediaStorage, StorageConfig};
pub use unconfigured::Unconfigured;
