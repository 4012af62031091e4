//! Client factory — one exclusive handle per started worker.

use std::sync::Arc;
use std::time::Duration;

use deskhive_config::AppConfig;
use deskhive_core::client::{WorkerClient, WorkerClientFactory};
use deskhive_core::error::ClientError;
use deskhive_core::worker::WorkerRole;
use tracing::debug;

use crate::anthropic::AnthropicClient;

/// Mints an [`AnthropicClient`] per worker start.
pub struct AnthropicFactory {
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl AnthropicFactory {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a factory from configuration. Returns `None` when no credential
    /// is configured — the supervisor then reports `NoCredential` on start
    /// instead of failing construction.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        config.api_key.as_ref().map(|key| {
            Self::new(key)
                .with_base_url(&config.api_base_url)
                .with_timeout(Duration::from_secs(config.client.request_timeout_secs))
        })
    }
}

impl WorkerClientFactory for AnthropicFactory {
    fn create(&self, role: WorkerRole) -> std::result::Result<Arc<dyn WorkerClient>, ClientError> {
        debug!(role = %role, "Minting Anthropic client");
        let client = AnthropicClient::new(&self.api_key)
            .with_base_url(&self.base_url)
            .with_timeout(self.timeout);
        Ok(Arc::new(client))
    }
}
