//! Per-session conversational client over the provider registry.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures_util::StreamExt;
use sbprovider::{
    BoxedChunkStream, ChatRegistry, ChatRequest, ChunkKind, Message, ResponseStatus, StreamChunk,
    ToolCall, ToolResult,
};

use crate::{ChatError, ChatTurn};

/// Accumulates a message history and system prompt, builds requests from
/// them, and feeds completions back into the history.
///
/// The client does not serialize concurrent turns on the same instance;
/// `&mut self` on the turn methods makes that the caller's problem, exactly
/// once per call.
pub struct ChatClient {
    registry: Arc<ChatRegistry>,
    system_prompt: Option<String>,
    history: Vec<Message>,
    model: String,
    provider: Option<String>,
}

impl ChatClient {
    pub fn new(registry: Arc<ChatRegistry>) -> Self {
        Self {
            registry,
            system_prompt: None,
            history: Vec::new(),
            model: String::new(),
            provider: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn set_system_prompt(&mut self, system_prompt: impl Into<String>) {
        self.system_prompt = Some(system_prompt.into());
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Selects the model (and optionally a provider) for subsequent turns.
    /// Validation failures leave the current selection untouched and name
    /// the valid models in the error.
    pub fn set_model(&mut self, model: &str, provider: Option<&str>) -> Result<(), ChatError> {
        if let Some(name) = provider {
            let Some(models) = self.registry.provider_models(name) else {
                return Err(ChatError::unknown_model(format!(
                    "provider '{name}' is not registered; registered models: {}",
                    self.registry.models().join(", ")
                )));
            };

            if !models.iter().any(|candidate| candidate == model) {
                return Err(ChatError::unknown_model(format!(
                    "model '{model}' is not available under provider '{name}'; valid models: {}",
                    models.join(", ")
                )));
            }

            self.model = model.to_string();
            self.provider = Some(name.to_string());
            return Ok(());
        }

        if self.registry.provider_for_model(model).is_none() {
            return Err(ChatError::unknown_model(format!(
                "model '{model}' is not registered; valid models: {}",
                self.registry.models().join(", ")
            )));
        }

        self.model = model.to_string();
        self.provider = None;
        Ok(())
    }

    /// One non-streaming turn. The assistant message joins the history only
    /// on success; a failed call leaves no assistant entry behind.
    pub async fn chat(&mut self, text: impl Into<String>) -> Result<ChatTurn, ChatError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ChatError::invalid_request("user input must not be empty"));
        }

        self.history.push(Message::user(text));
        let request = self.build_request(None, false);
        let response = self.registry.complete(request).await;

        match response.message {
            Some(message) if response.status == ResponseStatus::Ok => {
                self.history.push(message.clone());
                Ok(ChatTurn {
                    content: message.content,
                    tool_calls: message.tool_calls,
                    usage: response.usage,
                    request_id: response.request_id,
                    response_id: response.id,
                })
            }
            _ => Err(ChatError::provider(
                response
                    .error
                    .unwrap_or_else(|| "provider returned no message".to_string()),
            )),
        }
    }

    /// One streaming turn. History (the user message and the assembled
    /// assistant message) is committed only when the terminal chunk is
    /// observed, so cancelling mid-stream leaves the history exactly as it
    /// was before the call began.
    pub fn chat_stream(&mut self, text: impl Into<String>) -> BoxedChunkStream<'_> {
        let text = text.into();

        let chunks = stream! {
            if text.trim().is_empty() {
                yield StreamChunk::error("user input must not be empty");
                return;
            }

            let user = Message::user(text);
            let request = self.build_request(Some(user.clone()), true);
            let registry = Arc::clone(&self.registry);
            let mut inner = registry.stream(request).await;

            let mut assistant_text = String::new();
            let mut tool_calls: Vec<ToolCall> = Vec::new();

            while let Some(chunk) = inner.next().await {
                if chunk.kind == ChunkKind::Text {
                    assistant_text.push_str(&chunk.delta);
                }

                if let Some(call) = &chunk.tool_call {
                    match tool_calls.iter_mut().find(|existing| existing.id == call.id) {
                        Some(existing) => *existing = call.clone(),
                        None => tool_calls.push(call.clone()),
                    }
                }

                let terminal = chunk.is_terminal();
                let errored = chunk.kind == ChunkKind::Error;
                yield chunk;

                if terminal {
                    drop(inner);
                    self.history.push(user);
                    if !errored {
                        self.history
                            .push(Message::assistant(assistant_text).with_tool_calls(tool_calls));
                    }
                    return;
                }
            }

            // The registry guarantees a terminal chunk; a bare end still
            // commits the turn as a clean finish.
            self.history.push(user);
            self.history
                .push(Message::assistant(assistant_text).with_tool_calls(tool_calls));
        };

        Box::pin(chunks)
    }

    /// Appends a tool-result message without any network involvement; tool
    /// execution happens outside this layer.
    pub fn add_tool_result(
        &mut self,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        success: bool,
        duration: Duration,
    ) {
        self.history.push(Message::tool_result(
            ToolResult::new(call_id, tool_name, content, success).with_duration(duration),
        ));
    }

    fn build_request(&self, pending_user: Option<Message>, stream: bool) -> ChatRequest {
        let mut messages = Vec::new();

        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }

        messages.extend(self.history.iter().cloned());

        if let Some(user) = pending_user {
            messages.push(user);
        }

        let mut request = ChatRequest::new(self.model.clone(), messages);
        if let Some(provider) = &self.provider {
            request = request.with_provider(provider.clone());
        }
        if stream {
            request = request.enable_streaming();
        }

        request
    }
}

#[cfg(test)]
mod tests {
    use sbprovider::{ProviderConfig, ProviderFamily};

    use super::*;
    use crate::ChatErrorKind;

    fn registry_with_mock() -> Arc<ChatRegistry> {
        let registry = ChatRegistry::new();
        registry
            .register(
                ProviderConfig::new(ProviderFamily::Generic, "mock", "http://localhost:8080")
                    .with_default_model("m1")
                    .with_models(vec!["m1".into(), "m2".into()]),
            )
            .expect("registration");
        Arc::new(registry)
    }

    #[test]
    fn set_model_accepts_indexed_models() {
        let mut client = ChatClient::new(registry_with_mock());
        client.set_model("m2", None).expect("model exists");
        assert_eq!(client.model(), "m2");
        assert_eq!(client.provider(), None);
    }

    #[test]
    fn set_model_accepts_provider_scoped_models() {
        let mut client = ChatClient::new(registry_with_mock());
        client.set_model("m1", Some("mock")).expect("model exists");
        assert_eq!(client.provider(), Some("mock"));
    }

    #[test]
    fn set_model_failure_reports_valid_models_and_keeps_state() {
        let mut client = ChatClient::new(registry_with_mock());
        client.set_model("m1", None).expect("model exists");

        let error = client
            .set_model("nope", None)
            .expect_err("unknown model must fail");
        assert_eq!(error.kind, ChatErrorKind::UnknownModel);
        assert!(error.message.contains("m1"));
        assert!(error.message.contains("m2"));
        assert_eq!(client.model(), "m1");

        let error = client
            .set_model("m1", Some("ghost"))
            .expect_err("unknown provider must fail");
        assert_eq!(error.kind, ChatErrorKind::UnknownModel);
        assert_eq!(client.provider(), None);
    }

    #[tokio::test]
    async fn empty_input_is_rejected_without_history_mutation() {
        let mut client = ChatClient::new(registry_with_mock());
        let error = client.chat("   ").await.expect_err("empty input must fail");
        assert_eq!(error.kind, ChatErrorKind::InvalidRequest);
        assert!(client.history().is_empty());
    }
}
