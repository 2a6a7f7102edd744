//! # Chat Orchestrator
//!
//! Runs one user turn against the active provider, executing tool calls the
//! model requests and feeding results back until the model answers in plain
//! text or the round cap is hit.
//!
//! Streaming policy: the first round streams. Once a round has produced tool
//! calls, subsequent rounds run non-streaming so tool-call argument JSON can
//! be parsed from a settled response. The final allowed round streams again
//! with tools disabled to force a textual answer.
//!
//! Tool failures of any kind are recovered as tool-result text so the model
//! can react; only a transport or protocol failure on the chat request
//! itself aborts the turn.

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc::{self, Sender};

use crate::core::config::{ProviderKind, Settings};
use crate::core::tools;
use crate::inference::{
    AnthropicProvider, ChatProvider, ChatRequest, Conversation, GeminiProvider, Message,
    OpenAiProvider, ProviderError, StreamChunk,
};

/// Hard cap on request rounds within one turn.
pub const MAX_TOOL_ROUNDS: usize = 5;

/// Progress events delivered to the caller while a turn runs.
///
/// `Status` carries a short action label while a tool executes and an empty
/// string once it finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    TextDelta(String),
    Status(String),
}

/// Builds the adapter for the configured provider.
pub fn make_provider(settings: &Settings) -> Arc<dyn ChatProvider> {
    let api_key = settings.api_key.clone();
    let base_url = Some(settings.base_url.clone());
    match settings.provider {
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(api_key, base_url)),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(api_key, base_url)),
        ProviderKind::OpenRouter => Arc::new(OpenAiProvider::openrouter(api_key, base_url)),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(api_key, base_url)),
    }
}

pub struct ChatSession {
    provider: Arc<dyn ChatProvider>,
    settings: Settings,
}

impl ChatSession {
    pub fn new(settings: Settings) -> Self {
        let provider = make_provider(&settings);
        Self { provider, settings }
    }

    /// Uses a caller-supplied adapter instead of building one from settings.
    pub fn with_provider(settings: Settings, provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Tools are offered only when the adapter can express them and the
    /// active search backend has a key.
    pub fn tools_enabled(&self) -> bool {
        self.provider.supports_tools() && self.settings.search_api_key().is_some()
    }

    /// Runs one user turn to completion and returns the accumulated text.
    ///
    /// The conversation must end with the user message for this turn. On
    /// success it has grown by one assistant message per round plus one tool
    /// message per executed call; on failure it retains whatever rounds
    /// completed before the error.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        system_prompt: &str,
        events: Sender<TurnEvent>,
    ) -> Result<String, ProviderError> {
        let tools_enabled = self.tools_enabled();
        let definitions = tools::definitions();
        let mut final_text = String::new();
        let mut had_tool_calls = false;

        info!(
            "starting turn: provider={}, model={}, tools_enabled={}",
            self.provider.name(),
            self.settings.model,
            tools_enabled,
        );

        for round in 0..MAX_TOOL_ROUNDS {
            let is_last = round + 1 == MAX_TOOL_ROUNDS;
            let stream = !had_tool_calls || is_last;
            let tools_on = tools_enabled && !is_last;
            debug!("round {round}: stream={stream}, tools_on={tools_on}");

            let request = ChatRequest {
                conversation,
                system_prompt,
                model: &self.settings.model,
                tools: if tools_on { definitions.as_slice() } else { &[] },
                stream,
            };

            let (chunk_tx, mut chunk_rx) = mpsc::channel::<StreamChunk>(32);
            let forward = async {
                while let Some(StreamChunk::Content(delta)) = chunk_rx.recv().await {
                    let _ = events.send(TurnEvent::TextDelta(delta)).await;
                }
            };
            let (outcome, ()) = tokio::join!(self.provider.complete(request, chunk_tx), forward);
            let outcome = outcome?;

            if !outcome.text.is_empty() {
                final_text.push_str(&outcome.text);
                // Non-streamed rounds surface their text as one late delta.
                if !stream {
                    let _ = events
                        .send(TurnEvent::TextDelta(outcome.text.clone()))
                        .await;
                }
            }

            if outcome.tool_calls.is_empty() || !tools_on {
                // Earlier round text already lives on the assistant messages
                // that carried the tool calls.
                if !outcome.text.is_empty() {
                    conversation.push(Message::assistant(outcome.text));
                }
                return Ok(final_text);
            }

            had_tool_calls = true;
            let text = if outcome.text.is_empty() {
                None
            } else {
                Some(outcome.text.clone())
            };
            conversation.push(Message::assistant_with_calls(text, outcome.tool_calls.clone()));

            for call in &outcome.tool_calls {
                if let Some(label) = tools::status_label(call) {
                    let _ = events.send(TurnEvent::Status(label)).await;
                }
                let content = match tools::execute(&self.settings, call).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("tool '{}' failed: {e}", call.name);
                        format!("Error: {e}")
                    }
                };
                conversation.push(Message::tool_result(&call.id, &call.name, content));
                let _ = events.send(TurnEvent::Status(String::new())).await;
            }
        }

        Ok(final_text)
    }
}
