#![cfg(feature = "family-gemini")]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use sbcommon::IdGenerator;
use sbprovider::adapters::GeminiAdapter;
use sbprovider::transport::HttpResponse;
use sbprovider::{
    ChatProvider, ChatRequest, LineStream, Message, NoopOperationHooks, ProviderConfig,
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

fn adapter(transport: Arc<ScriptedTransport>) -> GeminiAdapter {
    let config = ProviderConfig::new(
        ProviderFamily::Gemini,
        "gemini",
        "https://generativelanguage.googleapis.com/v1beta",
    )
    .with_api_key("g-key-123")
    .with_default_model("gemini-2.0-flash");

    GeminiAdapter::new(
        config,
        transport,
        Arc::new(NoopOperationHooks),
        Arc::new(IdGenerator::deterministic("t")),
    )
}

#[tokio::test]
async fn complete_targets_generate_content_with_key_auth() {
    let body = json!({
        "candidates": [{
            "content": {"parts": [{"text": "hello"}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 1, "totalTokenCount": 5}
    })
    .to_string();

    let transport = Arc::new(ScriptedTransport::new(
        vec![HttpResponse::ok(body)],
        Vec::new(),
    ));
    let adapter = adapter(transport.clone());

    let request = ChatRequest::new(
        "gemini-2.0-flash",
        vec![Message::system("Be brief."), Message::user("hi")],
    );
    let response = adapter.complete(request).await;

    assert_eq!(response.status, ResponseStatus::Ok);
    assert_eq!(
        response.message.as_ref().map(|m| m.content.as_str()),
        Some("hello")
    );
    assert_eq!(response.usage.map(|u| u.total_tokens), Some(5));

    let captured = transport.captured.lock().expect("captured lock");
    let (url, _, body) = &captured[0];
    assert!(url.ends_with("models/gemini-2.0-flash:generateContent?key=g-key-123"));
    assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be brief.");
    assert_eq!(body["contents"][0]["role"], "user");
}

#[tokio::test]
async fn stream_finishes_on_stop_candidate() {
    let transport = Arc::new(ScriptedTransport::new(
        Vec::new(),
        vec![
            r#"data: {"candidates":[{"content":{"parts":[{"text":"He"}]}}]}"#,
            "garbage line",
            r#"data: {"candidates":[{"content":{"parts":[{"text":"llo"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":4,"candidatesTokenCount":2,"totalTokenCount":6}}"#,
        ],
    ));
    let adapter = adapter(transport.clone());

    let mut stream = adapter
        .stream(
            ChatRequest::new("gemini-2.0-flash", vec![Message::user("hi")]).enable_streaming(),
        )
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
    assert_eq!(terminal.finish_reason.as_deref(), Some("STOP"));
    assert_eq!(terminal.usage.map(|u| u.total_tokens), Some(6));
    assert!(stream.next().await.is_none());

    let captured = transport.captured.lock().expect("captured lock");
    assert!(captured[0]
        .0
        .ends_with("models/gemini-2.0-flash:streamGenerateContent?alt=sse&key=g-key-123"));
}

#[tokio::test]
async fn streamed_function_calls_receive_generated_ids() {
    let transport = Arc::new(ScriptedTransport::new(
        Vec::new(),
        vec![
            r#"data: {"candidates":[{"content":{"parts":[{"functionCall":{"name":"lookup","args":{"x":9}}}]},"finishReason":"STOP"}]}"#,
        ],
    ));
    let adapter = adapter(transport);

    let mut stream = adapter
        .stream(
            ChatRequest::new("gemini-2.0-flash", vec![Message::user("hi")]).enable_streaming(),
        )
        .await;

    let chunk = stream.next().await.expect("tool chunk");
    let call = chunk.tool_call.expect("tool call");
    assert!(!call.id.is_empty());
    assert_eq!(call.name, "lookup");
    assert_eq!(call.arguments["x"], 9);

    let terminal = stream.next().await.expect("terminal chunk");
    assert!(terminal.is_terminal());
}
