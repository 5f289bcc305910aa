use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use sbcommon::IdGenerator;
use sbprovider::transport::HttpResponse;
use sbprovider::{
    ChatProvider, ChatRegistry, ChatRequest, ChunkKind, LineStream, Message, NoopOperationHooks,
    ParameterKind, ProviderConfig, ProviderError, ProviderFamily, ProviderFuture, ResponseStatus,
    ToolDefinition, ToolParameter, Transport,
};
use serde_json::{Value, json};

struct ScriptedTransport {
    streams: Mutex<VecDeque<Vec<String>>>,
    captured: Mutex<Vec<Value>>,
}

impl ScriptedTransport {
    fn new(streams: Vec<Vec<&str>>) -> Self {
        Self {
            streams: Mutex::new(
                streams
                    .into_iter()
                    .map(|lines| lines.into_iter().map(str::to_string).collect())
                    .collect(),
            ),
            captured: Mutex::new(Vec::new()),
        }
    }
}

impl Transport for ScriptedTransport {
    fn post<'a>(
        &'a self,
        _url: String,
        _headers: Vec<(String, String)>,
        body: Value,
    ) -> ProviderFuture<'a, Result<HttpResponse, ProviderError>> {
        Box::pin(async move {
            self.captured.lock().expect("captured lock").push(body);
            Err(ProviderError::transport("post not scripted"))
        })
    }

    fn post_stream<'a>(
        &'a self,
        _url: String,
        _headers: Vec<(String, String)>,
        body: Value,
    ) -> ProviderFuture<'a, Result<LineStream<'a>, ProviderError>> {
        Box::pin(async move {
            self.captured.lock().expect("captured lock").push(body);

            let lines = self
                .streams
                .lock()
                .expect("streams lock")
                .pop_front()
                .ok_or_else(|| ProviderError::transport("script exhausted"))?;

            Ok(Box::pin(futures_util::stream::iter(lines.into_iter().map(Ok)))
                as LineStream<'a>)
        })
    }
}

fn registry() -> ChatRegistry {
    ChatRegistry::new().with_id_generator(Arc::new(IdGenerator::deterministic("t")))
}

fn mock_config() -> ProviderConfig {
    ProviderConfig::new(ProviderFamily::Generic, "mock", "http://mock").with_default_model("m1")
}

#[tokio::test]
async fn registered_generic_provider_serves_a_completion() {
    let registry = registry();
    let transport = Arc::new(ScriptedTransport::new(vec![vec!["\"He\"", "\"llo\"", "[DONE]"]]));
    registry
        .register_with_transport(mock_config(), transport)
        .expect("registration");

    let response = registry
        .complete(ChatRequest::new("m1", vec![Message::user("hi")]))
        .await;

    assert_eq!(response.status, ResponseStatus::Ok);
    assert_eq!(
        response.message.as_ref().map(|m| m.content.as_str()),
        Some("Hello")
    );
    assert_eq!(response.provider, "mock");

    let log = registry.request_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].provider, "mock");
    assert_eq!(log[0].model, "m1");
    assert_eq!(log[0].status, ResponseStatus::Ok);
    assert!(!log[0].request_id.is_empty());
}

#[tokio::test]
async fn empty_model_falls_back_to_provider_default() {
    let registry = registry();
    let transport = Arc::new(ScriptedTransport::new(vec![vec!["\"ok\"", "[DONE]"]]));
    registry
        .register_with_transport(mock_config(), transport)
        .expect("registration");

    let response = registry
        .complete(ChatRequest::new("", vec![Message::user("hi")]).with_provider("mock"))
        .await;

    assert_eq!(response.status, ResponseStatus::Ok);
    assert_eq!(response.model, "m1");
}

#[tokio::test]
async fn streaming_through_the_registry_logs_after_the_terminal_chunk() {
    let registry = registry();
    let transport = Arc::new(ScriptedTransport::new(vec![vec!["\"He\"", "\"llo\"", "[DONE]"]]));
    registry
        .register_with_transport(mock_config(), transport)
        .expect("registration");

    let mut stream = registry
        .stream(ChatRequest::new("m1", vec![Message::user("hi")]).enable_streaming())
        .await;

    let mut collected = Vec::new();
    while let Some(chunk) = stream.next().await {
        collected.push(chunk);
    }

    assert_eq!(collected.len(), 3);
    assert!(collected[2].is_terminal());
    assert_eq!(collected[2].kind, ChunkKind::Text);

    let log = registry.request_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status, ResponseStatus::Ok);
}

#[cfg(feature = "family-openai")]
#[tokio::test]
async fn global_tools_ride_along_on_delegated_requests() {
    let registry = registry();
    let transport = Arc::new(ScriptedTransport::new(vec![vec!["\"ok\"", "[DONE]"]]));
    registry
        .register_with_transport(
            ProviderConfig::new(ProviderFamily::OpenAi, "primary", "http://mock")
                .with_default_model("gpt-4o-mini"),
            transport.clone(),
        )
        .expect("registration");

    registry.register_tool(
        ToolDefinition::new("lookup", "Look up").with_parameter(ToolParameter::required(
            "x",
            ParameterKind::String,
            "Key",
        )),
    );

    let _ = registry
        .complete(ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]))
        .await;

    let captured = transport.captured.lock().expect("captured lock");
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0]["tools"][0]["function"]["name"], "lookup");
}

#[cfg(all(
    feature = "family-openai",
    feature = "family-anthropic",
    feature = "family-gemini"
))]
#[test]
fn tool_parameter_appears_once_and_required_in_every_family() {
    let tool = ToolDefinition::new("probe", "Probe a value").with_parameter(
        ToolParameter::required("x", ParameterKind::String, "The value"),
    );

    let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport::new(Vec::new()));
    let hooks = Arc::new(NoopOperationHooks);
    let ids = Arc::new(IdGenerator::deterministic("t"));

    let adapters: Vec<Box<dyn ChatProvider>> = vec![
        Box::new(sbprovider::adapters::OpenAiAdapter::new(
            ProviderConfig::new(ProviderFamily::OpenAi, "a", "http://mock"),
            transport.clone(),
            hooks.clone(),
            ids.clone(),
        )),
        Box::new(sbprovider::adapters::AnthropicAdapter::new(
            ProviderConfig::new(ProviderFamily::Anthropic, "b", "http://mock"),
            transport.clone(),
            hooks.clone(),
            ids.clone(),
        )),
        Box::new(sbprovider::adapters::GeminiAdapter::new(
            ProviderConfig::new(ProviderFamily::Gemini, "c", "http://mock"),
            transport.clone(),
            hooks.clone(),
            ids.clone(),
        )),
        Box::new(sbprovider::adapters::GenericAdapter::new(
            ProviderConfig::new(ProviderFamily::Generic, "d", "http://mock"),
            transport,
            hooks,
            ids,
        )),
    ];

    for adapter in adapters {
        let formatted = adapter.format_tools(std::slice::from_ref(&tool));
        assert_eq!(formatted.len(), 1, "{} family", adapter.family());

        let schema = match adapter.family() {
            ProviderFamily::OpenAi => &formatted[0]["function"]["parameters"],
            ProviderFamily::Anthropic => &formatted[0]["input_schema"],
            ProviderFamily::Gemini | ProviderFamily::Generic => &formatted[0]["parameters"],
        };

        let properties = schema["properties"]
            .as_object()
            .unwrap_or_else(|| panic!("{} family missing properties", adapter.family()));
        assert_eq!(properties.len(), 1, "{} family", adapter.family());
        assert!(properties.contains_key("x"), "{} family", adapter.family());
        assert_eq!(
            schema["required"],
            json!(["x"]),
            "{} family",
            adapter.family()
        );
    }
}
