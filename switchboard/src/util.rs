//! Small construction helpers for common message and session shapes.

use std::sync::Arc;
use std::time::Duration;

use sbchat::ChatClient;
use sbprovider::{ChatRegistry, Message, ToolResult};

pub fn system_message(content: impl Into<String>) -> Message {
    Message::system(content)
}

pub fn user_message(content: impl Into<String>) -> Message {
    Message::user(content)
}

pub fn assistant_message(content: impl Into<String>) -> Message {
    Message::assistant(content)
}

pub fn tool_result_message(
    call_id: impl Into<String>,
    tool_name: impl Into<String>,
    content: impl Into<String>,
    success: bool,
    duration: Duration,
) -> Message {
    Message::tool_result(ToolResult::new(call_id, tool_name, content, success).with_duration(duration))
}

/// Fresh conversational client over a shared registry.
pub fn chat_client(registry: Arc<ChatRegistry>) -> ChatClient {
    ChatClient::new(registry)
}
