//! Provider registry: adapter lifecycle, model-name routing, global tool
//! injection, call logging, and health aggregation.
//!
//! The registry is an explicit value owned by whatever constructs the
//! session and passed by reference to its consumers; there is no hidden
//! process-global table.
//!
//! ```rust
//! use sbprovider::ChatRegistry;
//!
//! let registry = ChatRegistry::new();
//! assert!(registry.is_empty());
//! assert_eq!(registry.len(), 0);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_stream::stream;
use futures_util::StreamExt;
use sbcommon::IdGenerator;
use serde::Serialize;

use crate::adapters::GenericAdapter;
use crate::{
    BoxedChunkStream, ChatProvider, ChatRequest, ChatResponse, ChunkKind, HttpTransport,
    NoopOperationHooks, OperationHooks, ProviderConfig, ProviderError, ProviderFamily,
    ResponseStatus, StatsSnapshot, StreamChunk, TokenUsage, ToolDefinition, Transport,
    VecChunkStream, DEFAULT_PROVIDER_MARKER,
};

#[cfg(feature = "family-anthropic")]
use crate::adapters::AnthropicAdapter;
#[cfg(feature = "family-gemini")]
use crate::adapters::GeminiAdapter;
#[cfg(feature = "family-openai")]
use crate::adapters::OpenAiAdapter;

const CALL_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallLogEntry {
    pub request_id: String,
    pub model: String,
    pub provider: String,
    pub status: ResponseStatus,
    pub duration: Duration,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    NoProviders,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub name: String,
    pub family: ProviderFamily,
    pub enabled: bool,
    pub models: Vec<String>,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub providers: Vec<ProviderHealth>,
}

pub struct ChatRegistry {
    providers: RwLock<HashMap<String, Arc<dyn ChatProvider>>>,
    model_index: RwLock<HashMap<String, String>>,
    default_provider: RwLock<Option<String>>,
    global_tools: RwLock<Vec<ToolDefinition>>,
    call_log: Mutex<VecDeque<CallLogEntry>>,
    hooks: Arc<dyn OperationHooks>,
    ids: Arc<IdGenerator>,
}

impl Default for ChatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            model_index: RwLock::new(HashMap::new()),
            default_provider: RwLock::new(None),
            global_tools: RwLock::new(Vec::new()),
            call_log: Mutex::new(VecDeque::new()),
            hooks: Arc::new(NoopOperationHooks),
            ids: Arc::new(IdGenerator::default()),
        }
    }

    /// Installs operation hooks (tracing, metrics) handed to every adapter
    /// registered afterwards.
    pub fn with_hooks(mut self, hooks: Arc<dyn OperationHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Substitutes the id source, e.g. a deterministic generator in tests.
    pub fn with_id_generator(mut self, ids: Arc<IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Builds and indexes the adapter for `config`. Fails only when the
    /// underlying HTTP client cannot be constructed; an unknown family tag
    /// falls back to the generic adapter instead of failing.
    pub fn register(&self, config: ProviderConfig) -> Result<(), ProviderError> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::with_timeout(config.timeout)?);
        self.register_with_transport(config, transport)
    }

    /// Registration seam for tests and custom transports.
    pub fn register_with_transport(
        &self,
        config: ProviderConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<(), ProviderError> {
        let name = config.name.clone();
        let models = config.all_models();
        let adapter = self.build_adapter(config, transport);

        {
            let mut index = write_lock(&self.model_index);
            index.retain(|_, provider| provider != &name);
            for model in models {
                index.insert(model, name.clone());
            }
        }

        write_lock(&self.providers).insert(name.clone(), adapter);

        let mut default = write_lock(&self.default_provider);
        if default.is_none() || name == DEFAULT_PROVIDER_MARKER {
            *default = Some(name);
        }

        Ok(())
    }

    fn build_adapter(
        &self,
        config: ProviderConfig,
        transport: Arc<dyn Transport>,
    ) -> Arc<dyn ChatProvider> {
        let hooks = Arc::clone(&self.hooks);
        let ids = Arc::clone(&self.ids);

        match config.family {
            #[cfg(feature = "family-openai")]
            ProviderFamily::OpenAi => Arc::new(OpenAiAdapter::new(config, transport, hooks, ids)),
            #[cfg(feature = "family-anthropic")]
            ProviderFamily::Anthropic => {
                Arc::new(AnthropicAdapter::new(config, transport, hooks, ids))
            }
            #[cfg(feature = "family-gemini")]
            ProviderFamily::Gemini => Arc::new(GeminiAdapter::new(config, transport, hooks, ids)),
            _ => Arc::new(GenericAdapter::new(config, transport, hooks, ids)),
        }
    }

    /// Removes the adapter and its model index entries. If it held the
    /// default slot, an arbitrary remaining provider inherits it.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = write_lock(&self.providers).remove(name).is_some();
        if !removed {
            return false;
        }

        write_lock(&self.model_index).retain(|_, provider| provider != name);

        let fallback = read_lock(&self.providers).keys().next().cloned();
        let mut default = write_lock(&self.default_provider);
        if default.as_deref() == Some(name) {
            *default = fallback;
        }

        true
    }

    /// Explicit registered provider first, then the model index, then the
    /// registry default.
    pub fn resolve(&self, request: &ChatRequest) -> Result<Arc<dyn ChatProvider>, ProviderError> {
        let providers = read_lock(&self.providers);

        if let Some(name) = &request.provider
            && let Some(adapter) = providers.get(name)
        {
            return Ok(Arc::clone(adapter));
        }

        if !request.model.is_empty()
            && let Some(name) = read_lock(&self.model_index).get(&request.model)
            && let Some(adapter) = providers.get(name)
        {
            return Ok(Arc::clone(adapter));
        }

        if let Some(name) = read_lock(&self.default_provider).as_ref()
            && let Some(adapter) = providers.get(name)
        {
            return Ok(Arc::clone(adapter));
        }

        Err(ProviderError::unresolved(
            "no provider resolvable for request",
        ))
    }

    pub fn register_tool(&self, tool: ToolDefinition) {
        write_lock(&self.global_tools).push(tool);
    }

    pub fn global_tools(&self) -> Vec<ToolDefinition> {
        read_lock(&self.global_tools).clone()
    }

    /// Globally registered tools ride along when the request carries none of
    /// its own.
    fn inject_tools(&self, mut request: ChatRequest) -> ChatRequest {
        if request.tools.is_empty() {
            request.tools = read_lock(&self.global_tools).clone();
        }
        request
    }

    pub async fn complete(&self, request: ChatRequest) -> ChatResponse {
        let mut request = request;
        request.ensure_identity(&self.ids);
        let request_id = request.id.clone();

        let adapter = match self.resolve(&request) {
            Ok(adapter) => adapter,
            Err(error) => {
                let mut response = ChatResponse::failure(&error, &request.model, "");
                response.ensure_identity(&self.ids);
                return response.with_request_id(request_id);
            }
        };

        if !adapter.enabled() {
            let error =
                ProviderError::disabled(format!("provider '{}' is disabled", adapter.name()));
            let mut response = ChatResponse::failure(&error, &request.model, adapter.name());
            response.ensure_identity(&self.ids);
            return response.with_request_id(request_id);
        }

        let request = self.inject_tools(request);
        let response = adapter.complete(request).await;
        self.append_log(CallLogEntry {
            request_id: response.request_id.clone(),
            model: response.model.clone(),
            provider: response.provider.clone(),
            status: response.status,
            duration: response.duration,
            usage: response.usage,
        });

        response
    }

    /// Always yields a terminal chunk, even when resolution fails. Dropping
    /// the stream mid-flight closes the connection and skips the log entry.
    pub async fn stream(&self, request: ChatRequest) -> BoxedChunkStream<'_> {
        let mut request = request;
        request.ensure_identity(&self.ids);
        let request_id = request.id.clone();

        let adapter = match self.resolve(&request) {
            Ok(adapter) => adapter,
            Err(error) => {
                return Box::pin(VecChunkStream::single(StreamChunk::error(error.to_string())));
            }
        };

        if !adapter.enabled() {
            let error =
                ProviderError::disabled(format!("provider '{}' is disabled", adapter.name()));
            return Box::pin(VecChunkStream::single(StreamChunk::error(error.to_string())));
        }

        let request = self.inject_tools(request);
        let model = request.model.clone();

        let chunks = stream! {
            let started = std::time::Instant::now();
            let mut status = ResponseStatus::Ok;
            let mut usage = None;
            let mut inner = adapter.stream(request).await;

            while let Some(chunk) = inner.next().await {
                if chunk.kind == ChunkKind::Error {
                    status = ResponseStatus::Error;
                }
                if chunk.usage.is_some() {
                    usage = chunk.usage;
                }

                let terminal = chunk.is_terminal();
                yield chunk;
                if terminal {
                    break;
                }
            }

            self.append_log(CallLogEntry {
                request_id,
                model,
                provider: adapter.name().to_string(),
                status,
                duration: started.elapsed(),
                usage,
            });
        };

        Box::pin(chunks)
    }

    /// Fans out to every adapter's self-report. Degraded means at least one
    /// registered provider is currently disabled.
    pub fn health_check(&self) -> HealthReport {
        let providers = read_lock(&self.providers);

        let mut reports = providers
            .values()
            .map(|adapter| ProviderHealth {
                name: adapter.name().to_string(),
                family: adapter.family(),
                enabled: adapter.enabled(),
                models: adapter.models(),
                stats: adapter.stats(),
            })
            .collect::<Vec<_>>();
        reports.sort_by(|a, b| a.name.cmp(&b.name));

        let status = if reports.is_empty() {
            HealthStatus::NoProviders
        } else if reports.iter().any(|report| !report.enabled) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            providers: reports,
        }
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match read_lock(&self.providers).get(name) {
            Some(adapter) => {
                adapter.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    pub fn set_api_key(&self, name: &str, api_key: impl Into<String>) -> bool {
        match read_lock(&self.providers).get(name) {
            Some(adapter) => {
                adapter.set_api_key(api_key.into());
                true
            }
            None => false,
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names = read_lock(&self.providers).keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn models(&self) -> Vec<String> {
        let mut models = read_lock(&self.model_index).keys().cloned().collect::<Vec<_>>();
        models.sort();
        models
    }

    pub fn provider_for_model(&self, model: &str) -> Option<String> {
        read_lock(&self.model_index).get(model).cloned()
    }

    pub fn provider_models(&self, name: &str) -> Option<Vec<String>> {
        read_lock(&self.providers)
            .get(name)
            .map(|adapter| adapter.models())
    }

    pub fn default_provider(&self) -> Option<String> {
        read_lock(&self.default_provider).clone()
    }

    pub fn stats(&self) -> HashMap<String, StatsSnapshot> {
        read_lock(&self.providers)
            .iter()
            .map(|(name, adapter)| (name.clone(), adapter.stats()))
            .collect()
    }

    pub fn request_log(&self) -> Vec<CallLogEntry> {
        self.call_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        read_lock(&self.providers).contains_key(name)
    }

    pub fn len(&self) -> usize {
        read_lock(&self.providers).len()
    }

    pub fn is_empty(&self) -> bool {
        read_lock(&self.providers).is_empty()
    }

    fn append_log(&self, entry: CallLogEntry) {
        let mut log = self
            .call_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        log.push_back(entry);
        while log.len() > CALL_LOG_CAPACITY {
            log.pop_front();
        }
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
