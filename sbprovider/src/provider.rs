//! Provider adapter contract: four pure translation operations and two
//! network operations per backend family.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::{
    BoxedChunkStream, ChatRequest, ChatResponse, Message, ProviderFamily, StatsSnapshot,
    ToolDefinition,
};

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One implementation per backend family, selected at registration time by
/// the family tag. Network operations never raise: `complete` failures are
/// statuses on the returned response, `stream` failures are terminal
/// error-kind chunks.
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    fn family(&self) -> ProviderFamily;

    fn enabled(&self) -> bool;

    /// Runtime toggle, flipped by the registry only.
    fn set_enabled(&self, enabled: bool);

    /// Runtime credential rotation, driven by the registry only.
    fn set_api_key(&self, api_key: String);

    fn models(&self) -> Vec<String>;

    fn default_model(&self) -> String;

    fn stats(&self) -> StatsSnapshot;

    /// Canonical messages to the family's native list, plus the extracted
    /// system-instruction side channel for families that require it.
    fn format_messages(&self, messages: &[Message]) -> (Vec<Value>, Option<String>);

    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<Value>;

    /// Converts a raw backend payload into a canonical message. Backend
    /// error envelopes become error-kind messages, never an `Err`.
    fn parse_response(&self, raw: &Value) -> Message;

    fn complete<'a>(&'a self, request: ChatRequest) -> ProviderFuture<'a, ChatResponse>;

    fn stream<'a>(&'a self, request: ChatRequest) -> ProviderFuture<'a, BoxedChunkStream<'a>>;
}
