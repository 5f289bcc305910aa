//! Provider layer for the switchboard chat protocol: the canonical data
//! model, one adapter per backend family, shared retry/streaming machinery,
//! and the routing registry.
//!
//! ```rust
//! use sbprovider::{ChatRegistry, ProviderConfig, ProviderFamily};
//!
//! let registry = ChatRegistry::new();
//! registry
//!     .register(
//!         ProviderConfig::new(ProviderFamily::Generic, "local", "http://localhost:8080")
//!             .with_default_model("m1"),
//!     )
//!     .expect("registration should succeed");
//!
//! assert!(registry.contains("local"));
//! assert_eq!(registry.provider_for_model("m1").as_deref(), Some("local"));
//! ```

mod config;
mod error;
mod model;
mod provider;
mod registry;
mod resilience;
mod stats;
mod stream;
mod tool;

pub mod adapters;
pub mod prelude;
pub mod transport;

pub use config::{DEFAULT_PROVIDER_MARKER, ProviderConfig, ProviderFamily};
pub use error::{ProviderError, ProviderErrorKind};
pub use model::{
    ChatRequest, ChatRequestBuilder, ChatResponse, ChunkKind, Message, MessageKind,
    ResponseStatus, Role, StreamChunk, TokenUsage, ToolCall, ToolResult,
};
pub use provider::{ChatProvider, ProviderFuture};
pub use registry::{CallLogEntry, ChatRegistry, HealthReport, HealthStatus, ProviderHealth};
pub use resilience::{NoopOperationHooks, OperationHooks, RetryPolicy, execute_with_retry};
pub use stats::{AdapterStats, StatsSnapshot};
pub use stream::{BoxedChunkStream, ChunkStream, VecChunkStream};
pub use tool::{ParameterKind, ToolDefinition, ToolParameter};
pub use transport::{
    HttpResponse, HttpTransport, LineStream, Transport, classify_http_status,
    extract_error_message,
};
