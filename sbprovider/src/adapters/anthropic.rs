//! Anthropic-family adapter: system text carried as a side channel,
//! `tool_use`/`tool_result` content blocks, and event-typed SSE streaming.

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

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Upper bound the wire format requires even when the caller sets none.
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicAdapter {
    state: AdapterState,
}

impl AnthropicAdapter {
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
        let mut headers = vec![
            ("x-api-key".to_string(), self.state.api_key()),
            ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
        ];
        headers.extend(self.state.extra_headers());
        headers
    }

    fn build_payload(&self, request: &ChatRequest, stream: bool) -> Value {
        let (messages, system) = self.format_messages(&request.messages);

        let mut payload = json!({
            "model": self.state.resolve_model(&request.model),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
            "stream": stream,
        });

        if let Some(system) = system {
            payload["system"] = json!(system);
        }

        if !request.tools.is_empty() {
            payload["tools"] = Value::from(self.format_tools(&request.tools));
        }

        if let Some(temperature) = request.temperature {
            payload["temperature"] = json!(temperature);
        }

        if !request.stop.is_empty() {
            payload["stop_sequences"] = json!(request.stop);
        }

        payload
    }
}

impl ChatProvider for AnthropicAdapter {
    fn name(&self) -> &str {
        &self.state.config.name
    }

    fn family(&self) -> ProviderFamily {
        ProviderFamily::Anthropic
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
        let mut system_parts = Vec::new();

        for message in messages {
            match message.role {
                // Every system-role message is pulled out into one
                // concatenated side-channel string.
                Role::System => system_parts.push(message.content.clone()),
                Role::User => formatted.push(json!({
                    "role": "user",
                    "content": message.content,
                })),
                Role::Assistant => {
                    if message.tool_calls.is_empty() {
                        formatted.push(json!({
                            "role": "assistant",
                            "content": message.content,
                        }));
                    } else {
                        let mut blocks = Vec::new();
                        if !message.content.is_empty() {
                            blocks.push(json!({"type": "text", "text": message.content}));
                        }
                        for call in &message.tool_calls {
                            blocks.push(json!({
                                "type": "tool_use",
                                "id": call.id,
                                "name": call.name,
                                "input": Value::Object(call.arguments.clone()),
                            }));
                        }
                        formatted.push(json!({"role": "assistant", "content": blocks}));
                    }
                }
                // Tool answers are tool_result blocks wrapped in a
                // role="user" message.
                Role::Tool => {
                    let blocks = message
                        .tool_results
                        .iter()
                        .map(|result| {
                            json!({
                                "type": "tool_result",
                                "tool_use_id": result.call_id,
                                "content": result.content,
                                "is_error": !result.success,
                            })
                        })
                        .collect::<Vec<_>>();
                    formatted.push(json!({"role": "user", "content": blocks}));
                }
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (formatted, system)
    }

    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.json_schema(),
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

        let Ok(parsed) = serde_json::from_value::<AnthropicApiResponse>(raw.clone()) else {
            return Message::error("response did not match the expected envelope");
        };

        if parsed.content.is_empty() {
            return Message::error("response did not include content blocks");
        }

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in parsed.content {
            match block.kind.as_str() {
                "text" => text.push_str(&block.text),
                "tool_use" => tool_calls.push(ToolCall {
                    id: block.id,
                    name: block.name,
                    arguments: block.input,
                }),
                _ => {}
            }
        }

        Message::assistant(text).with_tool_calls(tool_calls)
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
            let url = self.state.endpoint("messages");

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
            let url = self.state.endpoint("messages");

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
                let mut prompt_tokens = 0_u32;
                let mut completion_tokens = 0_u32;
                let mut finish_reason = None::<String>;
                let mut open_tool: Option<(ToolCall, String)> = None;

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

                    let Ok(event) = serde_json::from_str::<AnthropicStreamEvent>(data.trim()) else {
                        continue;
                    };

                    match event.kind.as_str() {
                        "message_start" => {
                            prompt_tokens = event
                                .message
                                .as_ref()
                                .and_then(|m| m.pointer("/usage/input_tokens"))
                                .and_then(Value::as_u64)
                                .unwrap_or(0) as u32;
                        }
                        "content_block_start" => {
                            if let Some(block) = event.content_block
                                && block.kind == "tool_use"
                            {
                                open_tool = Some((
                                    ToolCall {
                                        id: block.id,
                                        name: block.name,
                                        arguments: block.input,
                                    },
                                    String::new(),
                                ));
                            }
                        }
                        "content_block_delta" => {
                            let Some(delta) = event.delta else { continue };
                            match delta.kind.as_str() {
                                "text_delta" => {
                                    if !delta.text.is_empty() {
                                        yield StreamChunk::text(delta.text);
                                    }
                                }
                                "input_json_delta" => {
                                    if let Some((_, buffer)) = open_tool.as_mut() {
                                        buffer.push_str(&delta.partial_json);
                                    }
                                }
                                _ => {}
                            }
                        }
                        "content_block_stop" => {
                            if let Some((mut call, buffer)) = open_tool.take() {
                                if let Ok(arguments) =
                                    serde_json::from_str::<Map<String, Value>>(&buffer)
                                {
                                    call.arguments = arguments;
                                }
                                yield StreamChunk::tool_call(call);
                            }
                        }
                        "message_delta" => {
                            if let Some(usage) = event.usage {
                                completion_tokens = usage.output_tokens;
                            }

                            if let Some(reason) =
                                event.delta.and_then(|delta| delta.stop_reason)
                            {
                                finish_reason = Some(reason);
                                break;
                            }
                        }
                        "message_stop" => break,
                        _ => {}
                    }
                }

                let usage = TokenUsage::new(
                    prompt_tokens,
                    completion_tokens,
                    prompt_tokens + completion_tokens,
                );
                yield StreamChunk::finished(
                    finish_reason.unwrap_or_else(|| "end_turn".to_string()),
                )
                .with_usage(usage);
            };

            Box::pin(chunks) as BoxedChunkStream<'a>
        })
    }
}

fn parse_usage(raw: &Value) -> Option<TokenUsage> {
    let usage = raw.get("usage")?;
    let prompt = usage.get("input_tokens").and_then(Value::as_u64)? as u32;
    let completion = usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
    Some(TokenUsage::new(prompt, completion, prompt + completion))
}

#[derive(Debug, Deserialize)]
struct AnthropicApiResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

/// Loose block shape; unknown `type` values are carried but ignored rather
/// than failing the whole response.
#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    input: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    content_block: Option<AnthropicBlock>,
    #[serde(default)]
    delta: Option<AnthropicStreamDelta>,
    #[serde(default)]
    usage: Option<AnthropicStreamUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamDelta {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    partial_json: String,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamUsage {
    #[serde(default)]
    output_tokens: u32,
}
