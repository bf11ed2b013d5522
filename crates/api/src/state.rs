use std::collections::HashMap;
use std::sync::Arc;

use muse_billing::PaymentProvider;
use muse_core::billing::PaymentProviderKind;
use muse_events::{EventBus, Mailer};
use muse_providers::{GpuBackend, LlmBackend, MediaStorage, SpeechBackend};

use crate::config::ServerConfig;

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheap to clone: everything is behind an `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    pub pool: muse_db::DbPool,
    pub config: Arc<ServerConfig>,
    pub event_bus: Arc<EventBus>,
    /// Shared client for downloading GPU outputs.
    pub http: reqwest::Client,
    pub gpu: Arc<dyn GpuBackend>,
    pub llm: Arc<dyn LlmBackend>,
    pub speech: Arc<dyn SpeechBackend>,
    pub storage: Arc<dyn MediaStorage>,
    pub mailer: Arc<dyn Mailer>,
    pub payments: Arc<PaymentProviders>,
}

/// The payment gateways that are configured, by kind.
#[derive(Default)]
pub struct PaymentProviders {
    providers: HashMap<PaymentProviderKind, Arc<dyn PaymentProvider>>,
}

impl PaymentProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn PaymentProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn get(&self, kind: PaymentProviderKind) -> Option<Arc<dyn PaymentProvider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<PaymentProviderKind> {
        self.providers.keys().copied().collect()
    }
}
