use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;

use super::types::{ChatOutcome, Conversation, StreamChunk, ToolDefinition};

/// Errors that can occur during provider operations.
#[derive(Debug)]
pub enum ProviderError {
    /// Network-level failure (DNS, connection refused, reset mid-stream).
    Network(String),
    /// The request exceeded its deadline. Kept distinct from `Network` so
    /// callers can tell the two transport failures apart.
    Timeout(String),
    /// API returned a non-2xx response.
    Api { status: u16, message: String },
    /// The response body did not match the expected schema.
    Parse(String),
    /// The mpsc channel was closed (the consumer dropped the receiver).
    ChannelClosed,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Network(msg) => write!(f, "network error: {msg}"),
            ProviderError::Timeout(msg) => write!(f, "request timed out: {msg}"),
            ProviderError::Api { status, message } => {
                write!(f, "API error (HTTP {status}): {message}")
            }
            ProviderError::Parse(msg) => write!(f, "parse error: {msg}"),
            ProviderError::ChannelClosed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Everything a provider needs to fulfill one chat request.
pub struct ChatRequest<'a> {
    pub conversation: &'a Conversation,
    pub system_prompt: &'a str,
    pub model: &'a str,
    /// Tools offered to the model this round. Empty = tools disabled.
    pub tools: &'a [ToolDefinition],
    /// Whether to request a streamed response. Non-streamed rounds let the
    /// adapter hand back complete tool-call payloads in one parse.
    pub stream: bool,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Returns the name of the provider.
    fn name(&self) -> &str;

    /// Whether this provider accepts structured tool definitions.
    fn supports_tools(&self) -> bool {
        true
    }

    /// Performs one chat request. When `request.stream` is true, content
    /// deltas are sent to `sender` as they arrive; the settled outcome
    /// (full text plus any complete tool calls) is returned either way.
    async fn complete(
        &self,
        request: ChatRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<ChatOutcome, ProviderError>;
}
