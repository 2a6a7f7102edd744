pub mod provider;
pub mod providers;
pub mod transport;
pub mod types;

pub use provider::{ChatProvider, ChatRequest, ProviderError};
pub use providers::{AnthropicProvider, GeminiProvider, OpenAiProvider};
pub use types::{
    ChatOutcome, Conversation, Message, Role, StreamChunk, ToolCall, ToolDefinition,
};
