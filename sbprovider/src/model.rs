//! Provider-agnostic message, request, response, and stream chunk types.
//!
//! ```rust
//! use sbprovider::{ChatRequest, Message, ProviderErrorKind};
//!
//! let ok = ChatRequest::new("gpt-4o-mini", vec![Message::user("Summarize this diff")]);
//! assert!(ok.validate().is_ok());
//!
//! let err = ChatRequest::new("gpt-4o-mini", Vec::new())
//!     .validate()
//!     .expect_err("empty messages should fail");
//! assert_eq!(err.kind, ProviderErrorKind::InvalidRequest);
//! ```

use std::collections::HashSet;
use std::time::Duration;

use sbcommon::{IdGenerator, MetadataMap};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ProviderError, ProviderErrorKind, ToolDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    ToolCall,
    ToolResult,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            arguments: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub content: String,
    pub success: bool,
    #[serde(default)]
    pub duration: Duration,
}

impl ToolResult {
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        success: bool,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
            success,
            duration: Duration::ZERO,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Canonical conversation message.
///
/// Identifier and timestamp start empty/zero and are filled by
/// [`Message::ensure_identity`] before dispatch, so callers never need a
/// generator in hand just to build a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
    #[serde(default, skip_serializing_if = "MetadataMap::is_empty")]
    pub metadata: MetadataMap,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created_at_ms: u64,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            kind: MessageKind::Text,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            metadata: MetadataMap::new(),
            id: String::new(),
            created_at_ms: 0,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant-role message representing a backend-reported error.
    pub fn error(content: impl Into<String>) -> Self {
        let mut message = Self::new(Role::Assistant, content);
        message.kind = MessageKind::Error;
        message
    }

    /// Tool-role message carrying one tool result.
    pub fn tool_result(result: ToolResult) -> Self {
        let mut message = Self::new(Role::Tool, result.content.clone());
        message.kind = MessageKind::ToolResult;
        message.tool_results.push(result);
        message
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        if !tool_calls.is_empty() {
            self.kind = MessageKind::ToolCall;
        }
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Fills missing identifier/timestamp fields, including nested tool-call
    /// ids. Present values are never overwritten.
    pub fn ensure_identity(&mut self, ids: &IdGenerator) {
        if self.id.is_empty() {
            self.id = ids.next("msg");
        }

        if self.created_at_ms == 0 {
            self.created_at_ms = ids.timestamp_ms();
        }

        for call in &mut self.tool_calls {
            if call.id.is_empty() {
                call.id = ids.next("call");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32, total_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub id: String,
}

impl ChatRequest {
    pub fn builder(model: impl Into<String>) -> ChatRequestBuilder {
        ChatRequestBuilder::new(model)
    }

    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: model.into(),
            provider: None,
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
            stop: Vec::new(),
            stream: false,
            id: String::new(),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn enable_streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Fills the request id and every message/tool-call id that is still
    /// empty.
    pub fn ensure_identity(&mut self, ids: &IdGenerator) {
        if self.id.is_empty() {
            self.id = ids.next("req");
        }

        for message in &mut self.messages {
            message.ensure_identity(ids);
        }
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.messages.is_empty() {
            return Err(ProviderError::invalid_request(
                "at least one message is required",
            ));
        }

        if let Some(max_tokens) = self.max_tokens
            && max_tokens == 0
        {
            return Err(ProviderError::invalid_request(
                "max_tokens must be greater than zero",
            ));
        }

        if let Some(temperature) = self.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(ProviderError::new(
                ProviderErrorKind::InvalidRequest,
                "temperature must be in the inclusive range 0.0..=2.0",
                false,
            ));
        }

        let mut seen_call_ids = HashSet::new();
        for message in &self.messages {
            if message.kind == MessageKind::ToolResult && message.tool_results.is_empty() {
                return Err(ProviderError::invalid_request(
                    "tool-result message must carry at least one tool result",
                ));
            }

            for result in &message.tool_results {
                if !seen_call_ids.contains(result.call_id.as_str()) {
                    return Err(ProviderError::invalid_request(format!(
                        "tool result references unknown call id '{}'",
                        result.call_id
                    )));
                }
            }

            for call in &message.tool_calls {
                if !call.id.is_empty() {
                    seen_call_ids.insert(call.id.as_str());
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequestBuilder {
    request: ChatRequest,
}

impl ChatRequestBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            request: ChatRequest::new(model, Vec::new()),
        }
    }

    pub fn message(mut self, message: Message) -> Self {
        self.request.messages.push(message);
        self
    }

    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.request.messages.extend(messages);
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.request.provider = Some(provider.into());
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.request.tools = tools;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.request.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.request.max_tokens = Some(max_tokens);
        self
    }

    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.request.stop = stop;
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.request.stream = stream;
        self
    }

    pub fn build(self) -> Result<ChatRequest, ProviderError> {
        self.request.validate()?;
        Ok(self.request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error,
    RateLimited,
    Timeout,
    Unauthorized,
}

impl From<&ProviderError> for ResponseStatus {
    fn from(value: &ProviderError) -> Self {
        match value.kind {
            ProviderErrorKind::Authentication => Self::Unauthorized,
            ProviderErrorKind::RateLimited => Self::RateLimited,
            ProviderErrorKind::Timeout => Self::Timeout,
            _ => Self::Error,
        }
    }
}

/// Terminal result of a `complete` call. Status `Ok` implies a message is
/// present; any other status implies a non-empty error string and no message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub model: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration: Duration,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub id: String,
}

impl ChatResponse {
    pub fn success(
        message: Message,
        model: impl Into<String>,
        provider: impl Into<String>,
        usage: Option<TokenUsage>,
    ) -> Self {
        Self {
            message: Some(message),
            status: ResponseStatus::Ok,
            usage,
            model: model.into(),
            provider: provider.into(),
            error: None,
            duration: Duration::ZERO,
            request_id: String::new(),
            id: String::new(),
        }
    }

    pub fn failure(
        error: &ProviderError,
        model: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            message: None,
            status: ResponseStatus::from(error),
            usage: None,
            model: model.into(),
            provider: provider.into(),
            error: Some(error.to_string()),
            duration: Duration::ZERO,
            request_id: String::new(),
            id: String::new(),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn ensure_identity(&mut self, ids: &IdGenerator) {
        if self.id.is_empty() {
            self.id = ids.next("resp");
        }
    }

    pub fn ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    #[default]
    Text,
    ToolCall,
    Error,
}

/// One unit of a streaming response. A stream is finite and ends at the
/// first chunk carrying a finish reason or at an error-kind chunk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub delta: String,
    #[serde(default)]
    pub kind: ChunkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            ..Self::default()
        }
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self {
            kind: ChunkKind::ToolCall,
            tool_call: Some(call),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            delta: message.into(),
            kind: ChunkKind::Error,
            ..Self::default()
        }
    }

    pub fn finished(reason: impl Into<String>) -> Self {
        Self {
            finish_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some() || self.kind == ChunkKind::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips_through_json() {
        let mut message = Message::assistant("calling a tool")
            .with_tool_calls(vec![
                ToolCall::new("lookup")
                    .with_id("call_1")
                    .with_argument("x", Value::from(7)),
            ])
            .with_metadata("trace", "abc");
        message.ensure_identity(&IdGenerator::deterministic("t"));

        let encoded = serde_json::to_string(&message).expect("encode");
        let decoded: Message = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, message);
    }

    #[test]
    fn ensure_identity_fills_missing_fields_only() {
        let ids = IdGenerator::deterministic("t");
        let mut message = Message::user("hi").with_id("msg-keep");
        message.ensure_identity(&ids);
        assert_eq!(message.id, "msg-keep");

        let mut fresh = Message::user("hi");
        fresh.ensure_identity(&ids);
        assert_eq!(fresh.id, "msg-t-0-1");
    }

    #[test]
    fn validate_rejects_tool_result_without_results() {
        let mut message = Message::user("placeholder");
        message.kind = MessageKind::ToolResult;
        let request = ChatRequest::new("m", vec![message]);
        let err = request.validate().expect_err("must fail");
        assert_eq!(err.kind, ProviderErrorKind::InvalidRequest);
    }

    #[test]
    fn validate_requires_tool_results_to_reference_prior_calls() {
        let call = ToolCall::new("lookup").with_id("call_1");
        let assistant = Message::assistant("").with_tool_calls(vec![call]);
        let result = Message::tool_result(ToolResult::new("call_1", "lookup", "ok", true));

        let ordered = ChatRequest::new("m", vec![assistant.clone(), result.clone()]);
        assert!(ordered.validate().is_ok());

        let reversed = ChatRequest::new("m", vec![result, assistant]);
        let err = reversed.validate().expect_err("must fail");
        assert_eq!(err.kind, ProviderErrorKind::InvalidRequest);
    }

    #[test]
    fn builder_validates_on_build() {
        let request = ChatRequest::builder("gpt-4o-mini")
            .message(Message::system("Be terse."))
            .message(Message::user("hi"))
            .provider("primary")
            .temperature(0.4)
            .max_tokens(128)
            .stop(vec!["END".into()])
            .streaming(true)
            .build()
            .expect("valid request");
        assert!(request.stream);
        assert_eq!(request.provider.as_deref(), Some("primary"));

        let invalid = ChatRequest::builder("gpt-4o-mini")
            .message(Message::user("hi"))
            .temperature(9.0)
            .build();
        assert!(invalid.is_err());
    }

    #[test]
    fn response_constructors_uphold_status_invariant() {
        let success = ChatResponse::success(Message::assistant("hi"), "m", "p", None);
        assert!(success.ok());
        assert!(success.message.is_some());
        assert!(success.error.is_none());

        let failure = ChatResponse::failure(&ProviderError::rate_limited("slow down"), "m", "p");
        assert_eq!(failure.status, ResponseStatus::RateLimited);
        assert!(failure.message.is_none());
        assert!(failure.error.as_deref().is_some_and(|e| !e.is_empty()));
    }

    #[test]
    fn stream_chunk_terminal_detection() {
        assert!(!StreamChunk::text("hi").is_terminal());
        assert!(StreamChunk::finished("stop").is_terminal());
        assert!(StreamChunk::error("boom").is_terminal());
    }
}
