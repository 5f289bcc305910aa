//! Gemini-family adapter: user/model roles only, system text folded into
//! `systemInstruction`, `functionCall`/`functionResponse` parts, and
//! upper-cased parameter type tags.

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

pub struct GeminiAdapter {
    state: AdapterState,
}

impl GeminiAdapter {
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
        self.state.extra_headers()
    }

    fn generate_url(&self, model: &str, stream: bool) -> String {
        let action = if stream {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };

        let mut url = format!(
            "{}/models/{model}:{action}",
            self.state.config.base_url.trim_end_matches('/')
        );

        let key = self.state.api_key();
        if !key.is_empty() {
            url.push(if stream { '&' } else { '?' });
            url.push_str("key=");
            url.push_str(&key);
        }

        url
    }

    fn build_payload(&self, request: &ChatRequest) -> Value {
        let (contents, system) = self.format_messages(&request.messages);

        let mut payload = json!({ "contents": contents });

        if let Some(system) = system {
            payload["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        if !request.tools.is_empty() {
            payload["tools"] =
                json!([{ "functionDeclarations": self.format_tools(&request.tools) }]);
        }

        let mut generation_config = Map::new();
        if let Some(temperature) = request.temperature {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if !request.stop.is_empty() {
            generation_config.insert("stopSequences".to_string(), json!(request.stop));
        }
        if !generation_config.is_empty() {
            payload["generationConfig"] = Value::Object(generation_config);
        }

        payload
    }
}

impl ChatProvider for GeminiAdapter {
    fn name(&self) -> &str {
        &self.state.config.name
    }

    fn family(&self) -> ProviderFamily {
        ProviderFamily::Gemini
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
        let mut contents = Vec::new();
        let mut system_parts = Vec::new();

        for message in messages {
            match message.role {
                // No system role on the wire; everything folds into the
                // dedicated system-instruction field.
                Role::System => system_parts.push(message.content.clone()),
                Role::User => contents.push(json!({
                    "role": "user",
                    "parts": [{ "text": message.content }],
                })),
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !message.content.is_empty() {
                        parts.push(json!({ "text": message.content }));
                    }
                    for call in &message.tool_calls {
                        parts.push(json!({
                            "functionCall": {
                                "name": call.name,
                                "args": Value::Object(call.arguments.clone()),
                            },
                        }));
                    }
                    contents.push(json!({ "role": "model", "parts": parts }));
                }
                Role::Tool => {
                    let parts = message
                        .tool_results
                        .iter()
                        .map(|result| {
                            json!({
                                "functionResponse": {
                                    "name": result.tool_name,
                                    "response": {
                                        "content": result.content,
                                        "success": result.success,
                                    },
                                },
                            })
                        })
                        .collect::<Vec<_>>();
                    contents.push(json!({ "role": "user", "parts": parts }));
                }
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (contents, system)
    }

    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                let mut properties = Map::new();
                let mut required = Vec::new();

                for parameter in &tool.parameters {
                    let mut property = Map::new();
                    property.insert(
                        "type".to_string(),
                        json!(parameter.kind.as_str().to_ascii_uppercase()),
                    );
                    property.insert("description".to_string(), json!(parameter.description));
                    if !parameter.allowed_values.is_empty() {
                        property.insert(
                            "enum".to_string(),
                            Value::from(parameter.allowed_values.clone()),
                        );
                    }
                    properties.insert(parameter.name.clone(), Value::Object(property));
                    if parameter.required {
                        required.push(json!(parameter.name));
                    }
                }

                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": {
                        "type": "OBJECT",
                        "properties": properties,
                        "required": required,
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

        let Ok(parsed) = serde_json::from_value::<GeminiApiResponse>(raw.clone()) else {
            return Message::error("response did not match the expected envelope");
        };

        let Some(candidate) = parsed.candidates.into_iter().next() else {
            return Message::error("response did not include candidates");
        };

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(part_text) = part.text {
                text.push_str(&part_text);
            }
            if let Some(call) = part.function_call {
                tool_calls.push(ToolCall {
                    id: String::new(),
                    name: call.name,
                    arguments: call.args,
                });
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

            let payload = self.build_payload(&request);
            let url = self.generate_url(&model, false);

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

            let model = self.state.resolve_model(&request.model);
            let payload = self.build_payload(&request);
            let url = self.generate_url(&model, true);

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
                let mut usage = None::<TokenUsage>;

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

                    let Ok(parsed) = serde_json::from_str::<GeminiApiResponse>(data.trim()) else {
                        continue;
                    };

                    if let Some(metadata) = parsed.usage_metadata {
                        usage = Some(metadata.into());
                    }

                    let Some(candidate) = parsed.candidates.into_iter().next() else {
                        continue;
                    };

                    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                        if let Some(text) = part.text
                            && !text.is_empty()
                        {
                            yield StreamChunk::text(text);
                        }
                        if let Some(call) = part.function_call {
                            yield StreamChunk::tool_call(ToolCall {
                                id: self.state.ids.next("call"),
                                name: call.name,
                                arguments: call.args,
                            });
                        }
                    }

                    // A candidate-level finish reason ("STOP" in the common
                    // case) terminates the stream.
                    if let Some(reason) = candidate.finish_reason {
                        let mut terminal = StreamChunk::finished(reason);
                        if let Some(usage) = usage {
                            terminal = terminal.with_usage(usage);
                        }
                        yield terminal;
                        return;
                    }
                }

                let mut terminal = StreamChunk::finished("STOP");
                if let Some(usage) = usage {
                    terminal = terminal.with_usage(usage);
                }
                yield terminal;
            };

            Box::pin(chunks) as BoxedChunkStream<'a>
        })
    }
}

fn parse_usage(raw: &Value) -> Option<TokenUsage> {
    serde_json::from_value::<GeminiUsageMetadata>(raw.get("usageMetadata")?.clone())
        .ok()
        .map(TokenUsage::from)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiApiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
    #[serde(rename = "functionCall", default)]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl From<GeminiUsageMetadata> for TokenUsage {
    fn from(value: GeminiUsageMetadata) -> Self {
        Self {
            prompt_tokens: value.prompt_token_count,
            completion_tokens: value.candidates_token_count,
            total_tokens: value.total_token_count,
        }
    }
}
