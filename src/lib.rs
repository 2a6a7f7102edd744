//! # textlens
//!
//! Provider-agnostic streaming chat for explaining, translating, and
//! summarizing selected text, with an embedded tool-call loop for web search
//! and Anki flashcard creation.

pub mod core;
pub mod inference;

pub use crate::core::chat::{ChatSession, TurnEvent, MAX_TOOL_ROUNDS};
pub use crate::core::config::{
    load_config, resolve, resolve_with, ProviderKind, SearchBackend, Settings,
};
pub use crate::core::prompt::{build_prompt, SelectionContext};
pub use crate::inference::{Conversation, Message, ProviderError, Role};
