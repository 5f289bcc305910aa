//! Common imports for applications built on switchboard.

pub use crate::{
    ChatClient, ChatError, ChatErrorKind, ChatRegistry, ChatRequest, ChatResponse, ChatTurn,
    ChunkKind, HealthStatus, Message, MessageKind, MetricsOperationHooks, ProviderConfig,
    ProviderError, ProviderFamily, ResponseStatus, Role, StreamChunk, TokenUsage, ToolCall,
    ToolDefinition, ToolParameter, ToolResult, TracingOperationHooks, build_registry,
    chat_client, user_message,
};
