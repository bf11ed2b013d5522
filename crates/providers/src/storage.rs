//! CDN object storage (Bunny-style storage zone API).
//!
//! Objects are written with `PUT {storage_url}/{zone}/{path}` authenticated by
//! an `AccessKey` header and served from `{public_url}/{path}`.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::http::{ensure_success, env_opt, env_u64};

#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Store `bytes` at `path` and return its public URL.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String, ProviderError>;

    /// Remove the object at `path`. Missing objects are not an error.
    async fn delete(&self, path: &str) -> Result<(), ProviderError>;

    /// `false` for the stand-in used when the service has no configuration.
    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub storage_url: String,
    pub zone: String,
    pub access_key: String,
    pub public_url: String,
    pub timeout: Duration,
}

impl StorageConfig {
    /// Load from the environment; `None` unless all four CDN variables are
    /// set.
    ///
    /// | Variable           | Required | Default |
    /// |--------------------|----------|---------|
    /// | `CDN_STORAGE_URL`  | yes      | -       |
    /// | `CDN_STORAGE_ZONE` | yes      | -       |
    /// | `CDN_ACCESS_KEY`   | yes      | -       |
    /// | `CDN_PUBLIC_URL`   | yes      | -       |
    /// | `CDN_TIMEOUT_SECS` | no       | `60`    |
    pub fn from_env() -> Option<Self> {
        Some(Self {
            storage_url: env_opt("CDN_STORAGE_URL")?.trim_end_matches('/').to_string(),
            zone: env_opt("CDN_STORAGE_ZONE")?,
            access_key: env_opt("CDN_ACCESS_KEY")?,
            public_url: env_opt("CDN_PUBLIC_URL")?.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(env_u64("CDN_TIMEOUT_SECS", 60)),
        })
    }

    pub fn public_url_for(&self, path: &str) -> String {
        format!("{}/{}", self.public_url, path.trim_start_matches('/'))
    }
}

pub struct BunnyStorage {
    client: reqwest::Client,
    config: StorageConfig,
}

impl BunnyStorage {
    pub fn new(client: reqwest::Client, config: StorageConfig) -> Self {
        Self { client, config }
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.storage_url,
            self.config.zone,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl MediaStorage for BunnyStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ProviderError> {
        let size = bytes.len();
        let response = self
            .client
            .put(self.object_url(path))
            .header("AccessKey", &self.config.access_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .timeout(self.config.timeout)
            .body(bytes)
            .send()
            .await?;
        ensure_success(response).await?;

        tracing::debug!(path, size, "Media uploaded to CDN");
        Ok(self.config.public_url_for(path))
    }

    async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .delete(self.object_url(path))
            .header("AccessKey", &self.config.access_key)
            .timeout(self.config.timeout)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await?;
        Ok(())
    }
}
