//! Stable registry construction surface for facade consumers.

use std::sync::Arc;

use reqwest::Client;
use sbprovider::{
    ChatRegistry, HttpTransport, OperationHooks, ProviderConfig, ProviderError, Transport,
};

/// Builds a registry and registers every config in order. Each adapter gets
/// its own HTTP client honoring that config's timeout.
pub fn build_registry(configs: Vec<ProviderConfig>) -> Result<ChatRegistry, ProviderError> {
    let registry = ChatRegistry::new();
    for config in configs {
        registry.register(config)?;
    }
    Ok(registry)
}

/// Same as [`build_registry`], with operation hooks (tracing, metrics)
/// installed before any adapter is constructed.
pub fn build_registry_with_hooks(
    configs: Vec<ProviderConfig>,
    hooks: Arc<dyn OperationHooks>,
) -> Result<ChatRegistry, ProviderError> {
    let registry = ChatRegistry::new().with_hooks(hooks);
    for config in configs {
        registry.register(config)?;
    }
    Ok(registry)
}

/// Registers a provider over a caller-supplied `reqwest::Client`, for
/// applications that pool connections across adapters. The client's own
/// timeout applies; the config's timeout field is not re-applied here.
pub fn register_with_shared_client(
    registry: &ChatRegistry,
    config: ProviderConfig,
    client: Client,
) -> Result<(), ProviderError> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(client));
    registry.register_with_transport(config, transport)
}
