//! OpenAI-family adapter: `tool_calls` arrays on assistant messages, role
//! `tool` answers keyed by call id, and `[DONE]`-terminated SSE streaming.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use futures_util::StreamExt;
use sbcommon::IdGenerator;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::{
    BoxedChunkStream, ChatProvider, ChatRequest, ChatResponse, Message, MessageKind,
    OperationHooks, ProviderConfig, ProviderError, ProviderFamily, ProviderFuture, Role,
    StatsSnapshot, StreamChunk, TokenUsage, ToolCall, ToolDefinition, Transport, VecChunkStream,
};

use super::AdapterState;

pub struct OpenAiAdapter {
    state: AdapterState,
}

impl OpenAiAdapter {
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
        let mut headers = vec![(
            "Authorization".to_string(),
            format!("Bearer {}", self.state.api_key()),
        )];
        headers.extend(self.state.extra_headers());
        headers
    }

    fn build_payload(&self, request: &ChatRequest, stream: bool) -> Value {
        let (messages, _) = self.format_messages(&request.messages);

        let mut payload = json!({
            "model": self.state.resolve_model(&request.model),
            "messages": messages,
            "stream": stream,
        });

        if !request.tools.is_empty() {
            payload["tools"] = Value::from(self.format_tools(&request.tools));
        }

        if let Some(temperature) = request.temperature {
            payload["temperature"] = json!(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }

        if !request.stop.is_empty() {
            payload["stop"] = json!(request.stop);
        }

        payload
    }
}

impl ChatProvider for OpenAiAdapter {
    fn name(&self) -> &str {
        &self.state.config.name
    }

    fn family(&self) -> ProviderFamily {
        ProviderFamily::OpenAi
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
        let mut formatted = Vec::new();

        for message in messages {
            match message.role {
                Role::System => formatted.push(json!({
                    "role": "system",
                    "content": message.content,
                })),
                Role::User => formatted.push(json!({
                    "role": "user",
                    "content": message.content,
                })),
                Role::Assistant => {
                    let mut entry = json!({
                        "role": "assistant",
                        "content": message.content,
                    });

                    if !message.tool_calls.is_empty() {
                        let calls = message
                            .tool_calls
                            .iter()
                            .map(|call| {
                                json!({
                                    "id": call.id,
                                    "type": "function",
                                    "function": {
                                        "name": call.name,
                                        "arguments": Value::Object(call.arguments.clone())
                                            .to_string(),
                                    },
                                })
                            })
                            .collect::<Vec<_>>();
                        entry["tool_calls"] = Value::from(calls);
                    }

                    formatted.push(entry);
                }
                // Tool answers become independent role="tool" messages,
                // one per result, keyed by the originating call id.
                Role::Tool => {
                    for result in &message.tool_results {
                        formatted.push(json!({
                            "role": "tool",
                            "tool_call_id": result.call_id,
                            "content": result.content,
                        }));
                    }
                }
            }
        }

        (formatted, None)
    }

    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.json_schema(),
                    },
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

        let Ok(parsed) = serde_json::from_value::<OpenAiApiResponse>(raw.clone()) else {
            return Message::error("response did not match the expected envelope");
        };

        let Some(choice) = parsed.choices.into_iter().next() else {
            return Message::error("response did not include choices");
        };

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: parse_arguments(&call.function.arguments),
            })
            .collect::<Vec<_>>();

        Message::assistant(choice.message.content.unwrap_or_default()).with_tool_calls(tool_calls)
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

            let payload = self.build_payload(&request, false);
            let url = self.state.endpoint("chat/completions");

            let body = match self
                .state
                .post_with_retry("complete", url, self.headers(), payload)
                .await
            {
                Ok(body) => body,
                Err(error) => return finish(ChatResponse::failure(&error, &model, self.name())),
            };

            let raw: Value = match serde_json::from_str(&body) {
                Ok(raw) => raw,
                Err(err) => {
                    let error = ProviderError::malformed_response(err.to_string());
                    return finish(ChatResponse::failure(&error, &model, self.name()));
                }
            };

            let mut message = self.parse_response(&raw);
            if message.kind == MessageKind::Error {
                let error = ProviderError::malformed_response(message.content);
                return finish(ChatResponse::failure(&error, &model, self.name()));
            }

            message.ensure_identity(&self.state.ids);
            let usage = parse_usage(&raw);
            if let Some(usage) = usage {
                self.state.stats.record_usage(usage);
            }

            finish(ChatResponse::success(message, &model, self.name(), usage))
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

            let payload = self.build_payload(&request, true);
            let url = self.state.endpoint("chat/completions");

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
                let mut finish_reason = None::<String>;
                let mut usage = None::<TokenUsage>;
                let mut partial_calls: BTreeMap<u32, ToolCall> = BTreeMap::new();
                let mut argument_buffers: BTreeMap<u32, String> = BTreeMap::new();

                while let Some(line) = lines.next().await {
                    let line = match line {
                        Ok(line) => line,
                        Err(error) => {
                            yield StreamChunk::error(error.to_string());
                            return;
                        }
                    };

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        let mut terminal =
                            StreamChunk::finished(finish_reason.take().unwrap_or_else(|| "stop".to_string()));
                        if let Some(usage) = usage {
                            terminal = terminal.with_usage(usage);
                        }
                        yield terminal;
                        return;
                    }

                    // Lines that fail to parse as the expected envelope are
                    // skipped, not fatal.
                    let Ok(parsed) = serde_json::from_str::<OpenAiApiStreamChunk>(data) else {
                        continue;
                    };

                    if let Some(parsed_usage) = parsed.usage {
                        usage = Some(parsed_usage.into());
                    }

                    let Some(choice) = parsed.choices.first() else {
                        continue;
                    };

                    if let Some(content) = &choice.delta.content
                        && !content.is_empty()
                    {
                        yield StreamChunk::text(content.clone());
                    }

                    for delta_call in choice.delta.tool_calls.as_deref().unwrap_or_default() {
                        let index = delta_call.index.unwrap_or(0);
                        let entry = partial_calls
                            .entry(index)
                            .or_insert_with(|| ToolCall::new(""));

                        if let Some(id) = &delta_call.id {
                            entry.id = id.clone();
                        }

                        if let Some(function) = &delta_call.function {
                            if let Some(name) = &function.name {
                                entry.name = name.clone();
                            }
                            if let Some(arguments) = &function.arguments {
                                argument_buffers.entry(index).or_default().push_str(arguments);
                            }
                        }

                        let mut snapshot = entry.clone();
                        if let Some(buffer) = argument_buffers.get(&index) {
                            snapshot.arguments = parse_arguments(buffer);
                        }
                        yield StreamChunk::tool_call(snapshot);
                    }

                    if let Some(reason) = &choice.finish_reason {
                        finish_reason = Some(reason.clone());
                    }
                }

                // Connection ended without the sentinel; close cleanly.
                let mut terminal =
                    StreamChunk::finished(finish_reason.unwrap_or_else(|| "stop".to_string()));
                if let Some(usage) = usage {
                    terminal = terminal.with_usage(usage);
                }
                yield terminal;
            };

            Box::pin(chunks) as BoxedChunkStream<'a>
        })
    }
}

/// Arguments arrive as a JSON-encoded string; a fragment that does not yet
/// parse yields an empty map rather than an error.
fn parse_arguments(raw: &str) -> Map<String, Value> {
    serde_json::from_str::<Map<String, Value>>(raw).unwrap_or_default()
}

fn parse_usage(raw: &Value) -> Option<TokenUsage> {
    serde_json::from_value::<OpenAiApiUsage>(raw.get("usage")?.clone())
        .ok()
        .map(TokenUsage::from)
}

#[derive(Debug, Deserialize)]
struct OpenAiApiResponse {
    choices: Vec<OpenAiApiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiApiChoice {
    message: OpenAiApiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiApiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiApiToolCall {
    id: String,
    function: OpenAiApiFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAiApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<OpenAiApiUsage> for TokenUsage {
    fn from(value: OpenAiApiUsage) -> Self {
        Self {
            prompt_tokens: value.prompt_tokens,
            completion_tokens: value.completion_tokens,
            total_tokens: value.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiApiStreamChunk {
    choices: Vec<OpenAiApiStreamChoice>,
    usage: Option<OpenAiApiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiApiStreamChoice {
    delta: OpenAiApiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiApiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiApiDeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiApiDeltaToolCall {
    index: Option<u32>,
    id: Option<String>,
    function: Option<OpenAiApiDeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiApiDeltaFunction {
    name: Option<String>,
    arguments: Option<String>,
}
