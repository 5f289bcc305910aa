//! Unified facade over the switchboard workspace crates.
//!
//! This crate is designed to be the single dependency for most applications.
//! It re-exports the core switchboard crates and provides convenience
//! utilities for common setup and request-building flows.
//!
//! ```rust
//! use switchboard::{ChatRegistry, ProviderConfig, ProviderFamily};
//!
//! let registry = ChatRegistry::new();
//! registry
//!     .register(
//!         ProviderConfig::new(ProviderFamily::Generic, "local", "http://localhost:8080")
//!             .with_default_model("m1"),
//!     )
//!     .expect("registration should succeed");
//!
//! assert_eq!(registry.provider_names(), vec!["local".to_string()]);
//! ```

pub mod prelude;
pub mod providers;
pub mod util;

pub use sbchat;
pub use sbcommon;
pub use sbobserve;
pub use sbprovider;

pub use sbchat::{ChatClient, ChatError, ChatErrorKind, ChatTurn};
pub use sbcommon::{BoxFuture, IdGenerator, MetadataMap};
pub use sbobserve::{MetricsOperationHooks, TracingOperationHooks};
pub use sbprovider::{
    AdapterStats, BoxedChunkStream, CallLogEntry, ChatProvider, ChatRegistry, ChatRequest,
    ChatRequestBuilder, ChatResponse, ChunkKind, ChunkStream, HealthReport, HealthStatus,
    HttpTransport, Message, MessageKind, NoopOperationHooks, OperationHooks, ParameterKind,
    ProviderConfig, ProviderError, ProviderErrorKind, ProviderFamily, ProviderFuture,
    ProviderHealth, ResponseStatus, RetryPolicy, Role, StatsSnapshot, StreamChunk, TokenUsage,
    ToolCall, ToolDefinition, ToolParameter, ToolResult, Transport, VecChunkStream,
    execute_with_retry,
};

pub use providers::{build_registry, build_registry_with_hooks, register_with_shared_client};
pub use util::{assistant_message, chat_client, system_message, tool_result_message, user_message};
