#![cfg(feature = "family-openai")]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use sbcommon::IdGenerator;
use sbprovider::adapters::OpenAiAdapter;
use sbprovider::transport::HttpResponse;
use sbprovider::{
    ChatProvider, ChatRequest, ChunkKind, LineStream, Message, NoopOperationHooks, ProviderConfig,
    ProviderError, ProviderFamily, ProviderFuture, ResponseStatus, Transport,
};
use serde_json::{Value, json};

struct ScriptedTransport {
    posts: Mutex<VecDeque<HttpResponse>>,
    stream_lines: Mutex<Vec<String>>,
    captured: Mutex<Vec<(String, Vec<(String, String)>, Value)>>,
}

impl ScriptedTransport {
    fn new(posts: Vec<HttpResponse>, stream_lines: Vec<&str>) -> Self {
        Self {
            posts: Mutex::new(posts.into()),
            stream_lines: Mutex::new(stream_lines.into_iter().map(str::to_string).collect()),
            captured: Mutex::new(Vec::new()),
        }
    }
}

impl Transport for ScriptedTransport {
    fn post<'a>(
        &'a self,
        url: String,
        headers: Vec<(String, String)>,
        body: Value,
    ) -> ProviderFuture<'a, Result<HttpResponse, ProviderError>> {
        Box::pin(async move {
            self.captured
                .lock()
                .expect("captured lock")
                .push((url, headers, body));

            self.posts
                .lock()
                .expect("posts lock")
                .pop_front()
                .ok_or_else(|| ProviderError::transport("script exhausted"))
        })
    }

    fn post_stream<'a>(
        &'a self,
        url: String,
        headers: Vec<(String, String)>,
        body: Value,
    ) -> ProviderFuture<'a, Result<LineStream<'a>, ProviderError>> {
        Box::pin(async move {
            self.captured
                .lock()
                .expect("captured lock")
                .push((url, headers, body));

            let lines = self.stream_lines.lock().expect("lines lock").clone();
            Ok(Box::pin(futures_util::stream::iter(lines.into_iter().map(Ok)))
                as LineStream<'a>)
        })
    }
}

fn adapter(transport: Arc<ScriptedTransport>) -> OpenAiAdapter {
    let config = ProviderConfig::new(ProviderFamily::OpenAi, "primary", "https://api.openai.com/v1")
        .with_api_key("sk-live-123")
        .with_default_model("gpt-4o-mini")
        .with_max_retries(2);

    OpenAiAdapter::new(
        config,
        transport,
        Arc::new(NoopOperationHooks),
        Arc::new(IdGenerator::deterministic("t")),
    )
}

fn completion_body() -> String {
    json!({
        "model": "gpt-4o-mini",
        "choices": [{
            "message": {
                "content": "hello world",
                "tool_calls": [{
                    "id": "call_1",
                    "function": {"name": "lookup", "arguments": "{\"id\":1}"}
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10}
    })
    .to_string()
}

#[tokio::test]
async fn complete_maps_wire_response_to_canonical_response() {
    let transport = Arc::new(ScriptedTransport::new(
        vec![HttpResponse::ok(completion_body())],
        Vec::new(),
    ));
    let adapter = adapter(transport.clone());

    let request = ChatRequest::new("gpt-4o", vec![Message::user("hi")]);
    let response = adapter.complete(request).await;

    assert_eq!(response.status, ResponseStatus::Ok);
    let message = response.message.expect("message present");
    assert_eq!(message.content, "hello world");
    assert_eq!(message.tool_calls.len(), 1);
    assert_eq!(message.tool_calls[0].arguments["id"], 1);
    assert_eq!(response.usage.map(|u| u.total_tokens), Some(10));

    let captured = transport.captured.lock().expect("captured lock");
    let (url, headers, body) = &captured[0];
    assert_eq!(url, "https://api.openai.com/v1/chat/completions");
    assert!(headers.iter().any(|(name, value)| {
        name == "Authorization" && value == "Bearer sk-live-123"
    }));
    assert_eq!(body["stream"], false);
    assert_eq!(body["messages"][0]["role"], "user");
}

#[tokio::test]
async fn http_503_retries_then_succeeds() {
    let transport = Arc::new(ScriptedTransport::new(
        vec![
            HttpResponse {
                status: 503,
                body: json!({"error": {"message": "overloaded"}}).to_string(),
                retry_after: Some(Duration::from_millis(2)),
            },
            HttpResponse::ok(completion_body()),
        ],
        Vec::new(),
    ));
    let adapter = adapter(transport.clone());

    let response = adapter
        .complete(ChatRequest::new("gpt-4o", vec![Message::user("hi")]))
        .await;

    assert_eq!(response.status, ResponseStatus::Ok);
    assert_eq!(adapter.stats().retries, 1);
    assert_eq!(adapter.stats().successes, 1);
    assert_eq!(transport.captured.lock().expect("captured lock").len(), 2);
}

#[tokio::test]
async fn http_401_fails_immediately_as_unauthorized() {
    let transport = Arc::new(ScriptedTransport::new(
        vec![HttpResponse {
            status: 401,
            body: json!({"error": {"message": "bad key"}}).to_string(),
            retry_after: None,
        }],
        Vec::new(),
    ));
    let adapter = adapter(transport.clone());

    let response = adapter
        .complete(ChatRequest::new("gpt-4o", vec![Message::user("hi")]))
        .await;

    assert_eq!(response.status, ResponseStatus::Unauthorized);
    assert_eq!(response.error.as_deref(), Some("Authentication: bad key"));
    assert_eq!(transport.captured.lock().expect("captured lock").len(), 1);
}

#[tokio::test]
async fn http_429_maps_to_rate_limited_after_budget() {
    let transport = Arc::new(ScriptedTransport::new(
        vec![
            HttpResponse {
                status: 429,
                body: String::new(),
                retry_after: Some(Duration::from_millis(1)),
            };
            3
        ],
        Vec::new(),
    ));
    let adapter = adapter(transport.clone());

    let response = adapter
        .complete(ChatRequest::new("gpt-4o", vec![Message::user("hi")]))
        .await;

    assert_eq!(response.status, ResponseStatus::RateLimited);
    assert_eq!(adapter.stats().retries, 2);
    assert_eq!(transport.captured.lock().expect("captured lock").len(), 3);
}

#[tokio::test]
async fn stream_parses_deltas_and_done_sentinel() {
    let transport = Arc::new(ScriptedTransport::new(
        Vec::new(),
        vec![
            r#"data: {"choices":[{"delta":{"content":"He"}}]}"#,
            "event: noise",
            r#"data: {"choices":[{"delta":{"content":"llo"}}]}"#,
            "data: not json at all",
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            "data: [DONE]",
        ],
    ));
    let adapter = adapter(transport);

    let mut stream = adapter
        .stream(ChatRequest::new("gpt-4o", vec![Message::user("hi")]).enable_streaming())
        .await;

    let mut text = String::new();
    let mut terminal = None;
    while let Some(chunk) = stream.next().await {
        if chunk.is_terminal() {
            terminal = Some(chunk);
            break;
        }
        text.push_str(&chunk.delta);
    }

    assert_eq!(text, "Hello");
    let terminal = terminal.expect("terminal chunk");
    assert_eq!(terminal.finish_reason.as_deref(), Some("stop"));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn stream_accumulates_tool_call_deltas() {
    let transport = Arc::new(ScriptedTransport::new(
        Vec::new(),
        vec![
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"lookup"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"x\":"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"1}"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            "data: [DONE]",
        ],
    ));
    let adapter = adapter(transport);

    let mut stream = adapter
        .stream(ChatRequest::new("gpt-4o", vec![Message::user("hi")]).enable_streaming())
        .await;

    let mut last_tool_chunk = None;
    let mut terminal = None;
    while let Some(chunk) = stream.next().await {
        match chunk.kind {
            ChunkKind::ToolCall => last_tool_chunk = Some(chunk),
            _ if chunk.is_terminal() => {
                terminal = Some(chunk);
                break;
            }
            _ => {}
        }
    }

    let call = last_tool_chunk
        .and_then(|chunk| chunk.tool_call)
        .expect("tool call");
    assert_eq!(call.id, "call_1");
    assert_eq!(call.name, "lookup");
    assert_eq!(call.arguments["x"], 1);
    assert_eq!(
        terminal.and_then(|chunk| chunk.finish_reason),
        Some("tool_calls".to_string())
    );
}
