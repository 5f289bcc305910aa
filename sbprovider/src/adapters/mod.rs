//! Backend adapter families over the shared transport and retry core.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use sbcommon::IdGenerator;
use serde_json::Value;

use crate::{
    AdapterStats, LineStream, OperationHooks, ProviderConfig, ProviderError, RetryPolicy,
    Transport, execute_with_retry,
};

pub mod generic;

#[cfg(feature = "family-openai")]
pub mod openai;

#[cfg(feature = "family-anthropic")]
pub mod anthropic;

#[cfg(feature = "family-gemini")]
pub mod gemini;

pub use generic::GenericAdapter;

#[cfg(feature = "family-openai")]
pub use openai::OpenAiAdapter;

#[cfg(feature = "family-anthropic")]
pub use anthropic::AnthropicAdapter;

#[cfg(feature = "family-gemini")]
pub use gemini::GeminiAdapter;

/// State every adapter family shares: the registry-owned config, the
/// runtime-flippable enabled flag, the rotating credential, per-adapter
/// statistics, the transport, and the retry policy derived from the config.
pub(crate) struct AdapterState {
    pub config: ProviderConfig,
    enabled: AtomicBool,
    api_key: RwLock<String>,
    pub stats: Arc<AdapterStats>,
    pub transport: Arc<dyn Transport>,
    pub policy: RetryPolicy,
    pub hooks: Arc<dyn OperationHooks>,
    pub ids: Arc<IdGenerator>,
}

impl AdapterState {
    pub fn new(
        config: ProviderConfig,
        transport: Arc<dyn Transport>,
        hooks: Arc<dyn OperationHooks>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            api_key: RwLock::new(config.api_key.clone()),
            policy: RetryPolicy::new(config.max_retries),
            stats: Arc::new(AdapterStats::new()),
            config,
            transport,
            hooks,
            ids,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn api_key(&self) -> String {
        self.api_key
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_api_key(&self, api_key: String) {
        *self
            .api_key
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = api_key;
    }

    /// Requested model, or the configured default when the request leaves it
    /// empty.
    pub fn resolve_model(&self, requested: &str) -> String {
        if requested.trim().is_empty() {
            self.config.default_model.clone()
        } else {
            requested.to_string()
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn extra_headers(&self) -> Vec<(String, String)> {
        self.config
            .extra_headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub async fn post_with_retry(
        &self,
        operation: &str,
        url: String,
        headers: Vec<(String, String)>,
        body: Value,
    ) -> Result<String, ProviderError> {
        let hooks = FanoutHooks {
            stats: self.stats.as_ref(),
            external: self.hooks.as_ref(),
        };

        execute_with_retry(
            &self.config.name,
            operation,
            &self.policy,
            &hooks,
            |_attempt| {
                let url = url.clone();
                let headers = headers.clone();
                let body = body.clone();
                async move { self.transport.post(url, headers, body).await?.into_result() }
            },
            |delay| tokio::time::sleep(delay),
        )
        .await
    }

    /// Retries apply to opening the stream only; once the first line can
    /// arrive the stream is non-restartable.
    pub async fn open_stream_with_retry<'a>(
        &'a self,
        operation: &str,
        url: String,
        headers: Vec<(String, String)>,
        body: Value,
    ) -> Result<LineStream<'a>, ProviderError> {
        let hooks = FanoutHooks {
            stats: self.stats.as_ref(),
            external: self.hooks.as_ref(),
        };

        execute_with_retry(
            &self.config.name,
            operation,
            &self.policy,
            &hooks,
            |_attempt| {
                let url = url.clone();
                let headers = headers.clone();
                let body = body.clone();
                async move { self.transport.post_stream(url, headers, body).await }
            },
            |delay| tokio::time::sleep(delay),
        )
        .await
    }
}

/// Fans hook callbacks out to the adapter's stats and whatever external
/// hooks (tracing, metrics) were installed at registration.
struct FanoutHooks<'a> {
    stats: &'a AdapterStats,
    external: &'a dyn OperationHooks,
}

impl OperationHooks for FanoutHooks<'_> {
    fn on_attempt_start(&self, provider: &str, operation: &str, attempt: u32) {
        self.stats.on_attempt_start(provider, operation, attempt);
        self.external.on_attempt_start(provider, operation, attempt);
    }

    fn on_retry_scheduled(
        &self,
        provider: &str,
        operation: &str,
        attempt: u32,
        delay: Duration,
        error: &ProviderError,
    ) {
        self.stats
            .on_retry_scheduled(provider, operation, attempt, delay, error);
        self.external
            .on_retry_scheduled(provider, operation, attempt, delay, error);
    }

    fn on_success(&self, provider: &str, operation: &str, attempts: u32) {
        self.stats.on_success(provider, operation, attempts);
        self.external.on_success(provider, operation, attempts);
    }

    fn on_failure(&self, provider: &str, operation: &str, attempts: u32, error: &ProviderError) {
        self.stats.on_failure(provider, operation, attempts, error);
        self.external.on_failure(provider, operation, attempts, error);
    }
}
