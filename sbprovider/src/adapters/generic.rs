//! Generic fallback adapter for backends with no fixed schema: posts the
//! latest message to a configurable endpoint and accumulates whatever text
//! fragments the line-oriented stream yields.

use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use futures_util::StreamExt;
use sbcommon::IdGenerator;
use serde_json::{Value, json};

use crate::{
    BoxedChunkStream, ChatProvider, ChatRequest, ChatResponse, Message, OperationHooks,
    ProviderConfig, ProviderError, ProviderFamily, ProviderFuture, StatsSnapshot, StreamChunk,
    ToolDefinition, Transport, VecChunkStream,
};

use super::AdapterState;

/// Capability key overriding the endpoint path.
pub const ENDPOINT_CAPABILITY: &str = "endpoint";

const DEFAULT_ENDPOINT: &str = "/chat";

pub struct GenericAdapter {
    state: AdapterState,
}

impl GenericAdapter {
    pub fn new(
        config: ProviderConfig,
        transport: Arc<dyn Transport>,
        hooks: Arc<dyn OperationHooks>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            state: AdapterState::new(config, transport, hooks, ids),
        }
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        let key = self.state.api_key();
        if !key.is_empty() {
            headers.push(("Authorization".to_string(), format!("Bearer {key}")));
        }
        headers.extend(self.state.extra_headers());
        headers
    }

    fn endpoint(&self) -> String {
        let path = self
            .state
            .config
            .capabilities
            .get(ENDPOINT_CAPABILITY)
            .map(String::as_str)
            .unwrap_or(DEFAULT_ENDPOINT);
        self.state.endpoint(path)
    }

    fn build_payload(&self, request: &ChatRequest) -> Value {
        let latest = request
            .messages
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();

        json!({
            "model": self.state.resolve_model(&request.model),
            "message": latest,
            "stream": true,
        })
    }
}

/// Pulls a text fragment out of one stream line, trying the shapes loose
/// backends actually send: a JSON string, an object with a `content`, `text`,
/// or `message` field, or a raw non-JSON line used verbatim.
fn decode_fragment(line: &str) -> Option<String> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::String(text)) => Some(text),
        Ok(Value::Object(object)) => ["content", "text", "message"]
            .iter()
            .find_map(|field| object.get(*field))
            .and_then(Value::as_str)
            .map(str::to_string),
        Ok(_) => None,
        Err(_) => Some(line.to_string()),
    }
}

impl ChatProvider for GenericAdapter {
    fn name(&self) -> &str {
        &self.state.config.name
    }

    fn family(&self) -> ProviderFamily {
        ProviderFamily::Generic
    }

    fn enabled(&self) -> bool {
        self.state.enabled()
    }

    fn set_enabled(&self, enabled: bool) {
        self.state.set_enabled(enabled);
    }

    fn set_api_key(&self, api_key: String) {
        self.state.set_api_key(api_key);
    }

    fn models(&self) -> Vec<String> {
        self.state.config.all_models()
    }

    fn default_model(&self) -> String {
        self.state.config.default_model.clone()
    }

    fn stats(&self) -> StatsSnapshot {
        self.state.stats.snapshot()
    }

    fn format_messages(&self, messages: &[Message]) -> (Vec<Value>, Option<String>) {
        let formatted = messages
            .iter()
            .map(|message| {
                json!({
                    "role": match message.role {
                        crate::Role::System => "system",
                        crate::Role::User => "user",
                        crate::Role::Assistant => "assistant",
                        crate::Role::Tool => "tool",
                    },
                    "content": message.content,
                })
            })
            .collect();

        (formatted, None)
    }

    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.json_schema(),
                })
            })
            .collect()
    }

    fn parse_response(&self, raw: &Value) -> Message {
        if raw.get("error").is_some()
            && let Some(message) = crate::transport::extract_error_message(&raw.to_string())
        {
            return Message::error(message);
        }

        match raw {
            Value::String(text) => Message::assistant(text.clone()),
            Value::Object(object) => {
                let text = ["content", "text", "message"]
                    .iter()
                    .find_map(|field| object.get(*field))
                    .and_then(Value::as_str);
                match text {
                    Some(text) => Message::assistant(text),
                    None => Message::error("response carried no recognizable text field"),
                }
            }
            _ => Message::error("response carried no recognizable text field"),
        }
    }

    fn complete<'a>(&'a self, request: ChatRequest) -> ProviderFuture<'a, ChatResponse> {
        Box::pin(async move {
            let started = Instant::now();
            let mut request = request;
            request.ensure_identity(&self.state.ids);
            let model = self.state.resolve_model(&request.model);
            let request_id = request.id.clone();

            let finish = |mut response: ChatResponse| {
                response.ensure_identity(&self.state.ids);
                response
                    .with_duration(started.elapsed())
                    .with_request_id(request_id.clone())
            };

            if let Err(error) = request.validate() {
                return finish(ChatResponse::failure(&error, &model, self.name()));
            }

            let payload = self.build_payload(&request);
            let url = self.endpoint();

            let mut lines = match self
                .state
                .open_stream_with_retry("complete", url, self.headers(), payload)
                .await
            {
                Ok(lines) => lines,
                Err(error) => return finish(ChatResponse::failure(&error, &model, self.name())),
            };

            let mut accumulated = String::new();

            while let Some(line) = lines.next().await {
                let line = match line {
                    Err(error) if accumulated.is_empty() => {
                        return finish(ChatResponse::failure(&error, &model, self.name()));
                    }
                    // Mid-stream failure after some text arrived resolves to
                    // the partial text; see DESIGN.md on this leniency.
                    Err(_) => break,
                    Ok(line) => line,
                };

                let line = line.strip_prefix("data:").map(str::trim).unwrap_or(&line);
                if line == "[DONE]" {
                    break;
                }

                if let Some(fragment) = decode_fragment(line) {
                    accumulated.push_str(&fragment);
                }
            }

            if accumulated.is_empty() {
                let error = ProviderError::malformed_response("stream produced no content");
                return finish(ChatResponse::failure(&error, &model, self.name()));
            }

            let mut message = Message::assistant(accumulated);
            message.ensure_identity(&self.state.ids);
            finish(ChatResponse::success(message, &model, self.name(), None))
        })
    }

    fn stream<'a>(&'a self, request: ChatRequest) -> ProviderFuture<'a, BoxedChunkStream<'a>> {
        Box::pin(async move {
            let mut request = request;
            request.ensure_identity(&self.state.ids);

            if let Err(error) = request.validate() {
                return Box::pin(VecChunkStream::single(StreamChunk::error(error.to_string())))
                    as BoxedChunkStream<'a>;
            }

            let payload = self.build_payload(&request);
            let url = self.endpoint();

            let mut lines = match self
                .state
                .open_stream_with_retry("stream", url, self.headers(), payload)
                .await
            {
                Ok(lines) => lines,
                Err(error) => {
                    return Box::pin(VecChunkStream::single(StreamChunk::error(error.to_string())))
                        as BoxedChunkStream<'a>;
                }
            };

            let chunks = stream! {
                while let Some(line) = lines.next().await {
                    let line = match line {
                        Ok(line) => line,
                        Err(error) => {
                            yield StreamChunk::error(error.to_string());
                            return;
                        }
                    };

                    let line = line
                        .strip_prefix("data:")
                        .map(str::trim)
                        .unwrap_or(&line)
                        .to_string();

                    if line == "[DONE]" {
                        yield StreamChunk::finished("stop");
                        return;
                    }

                    if let Some(fragment) = decode_fragment(&line)
                        && !fragment.is_empty()
                    {
                        yield StreamChunk::text(fragment);
                    }
                }

                yield StreamChunk::finished("stop");
            };

            Box::pin(chunks) as BoxedChunkStream<'a>
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MessageKind, NoopOperationHooks};

    struct NullTransport;

    impl Transport for NullTransport {
        fn post<'a>(
            &'a self,
            _url: String,
            _headers: Vec<(String, String)>,
            _body: Value,
        ) -> ProviderFuture<'a, Result<crate::transport::HttpResponse, ProviderError>> {
            Box::pin(async move { Err(ProviderError::transport("not wired")) })
        }

        fn post_stream<'a>(
            &'a self,
            _url: String,
            _headers: Vec<(String, String)>,
            _body: Value,
        ) -> ProviderFuture<'a, Result<crate::LineStream<'a>, ProviderError>> {
            Box::pin(async move { Err(ProviderError::transport("not wired")) })
        }
    }

    #[test]
    fn fragments_decode_in_attempt_order() {
        assert_eq!(decode_fragment(r#""He""#), Some("He".to_string()));
        assert_eq!(
            decode_fragment(r#"{"content":"llo"}"#),
            Some("llo".to_string())
        );
        assert_eq!(decode_fragment(r#"{"text":"x"}"#), Some("x".to_string()));
        assert_eq!(decode_fragment(r#"{"message":"y"}"#), Some("y".to_string()));
        assert_eq!(decode_fragment("plain words"), Some("plain words".to_string()));
        assert_eq!(decode_fragment(r#"{"other":"z"}"#), None);
        assert_eq!(decode_fragment("42"), None);
    }

    #[test]
    fn parse_response_handles_strings_objects_and_errors() {
        let config = ProviderConfig::new(ProviderFamily::Generic, "mock", "http://mock");
        let adapter = GenericAdapter::new(
            config,
            Arc::new(NullTransport),
            Arc::new(NoopOperationHooks),
            Arc::new(IdGenerator::deterministic("t")),
        );

        assert_eq!(adapter.parse_response(&json!("hi")).content, "hi");
        assert_eq!(adapter.parse_response(&json!({"text": "ok"})).content, "ok");

        let error = adapter.parse_response(&json!({"error": {"message": "down"}}));
        assert_eq!(error.kind, MessageKind::Error);
    }

    #[test]
    fn endpoint_capability_overrides_default_path() {
        let config = ProviderConfig::new(ProviderFamily::Generic, "mock", "http://mock/")
            .with_capability(ENDPOINT_CAPABILITY, "/api/generate");
        let adapter = GenericAdapter::new(
            config,
            Arc::new(NullTransport),
            Arc::new(NoopOperationHooks),
            Arc::new(IdGenerator::deterministic("t")),
        );

        assert_eq!(adapter.endpoint(), "http://mock/api/generate");
    }
}
