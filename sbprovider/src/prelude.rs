//! Common `sbprovider` imports for downstream crates.

pub use crate::{
    BoxedChunkStream, CallLogEntry, ChatProvider, ChatRegistry, ChatRequest, ChatRequestBuilder,
    ChatResponse, ChunkKind, ChunkStream, HealthReport, HealthStatus, Message, MessageKind,
    NoopOperationHooks, OperationHooks, ParameterKind, ProviderConfig, ProviderError,
    ProviderErrorKind, ProviderFamily, ProviderFuture, ProviderHealth, ResponseStatus,
    RetryPolicy, Role, StatsSnapshot, StreamChunk, TokenUsage, ToolCall, ToolDefinition,
    ToolParameter, ToolResult, VecChunkStream, execute_with_retry,
};
pub use sbcommon::{BoxFuture, IdGenerator, MetadataMap};
