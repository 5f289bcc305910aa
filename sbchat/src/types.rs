//! Turn result values returned by the conversational client.

use sbprovider::{TokenUsage, ToolCall};

/// Outcome of one successful non-streaming turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
    pub request_id: String,
    pub response_id: String,
}
