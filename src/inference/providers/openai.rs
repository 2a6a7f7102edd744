//! OpenAI-compatible provider using the chat-completions API.
//!
//! Also serves generic gateways speaking the same dialect (OpenRouter).
//! Streaming responses are newline-delimited SSE frames each holding a JSON
//! delta; tool calls arrive fragmented across frames, keyed by index.

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;

use crate::inference::transport::{self, SseReader, CHAT_TIMEOUT};
use crate::inference::{
    ChatOutcome, ChatProvider, ChatRequest, Conversation, ProviderError, Role, StreamChunk,
    ToolCall, ToolDefinition,
};

// ============================================================================
// Chat Completions API Types
// ============================================================================

#[derive(Serialize, Debug)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Serialize, Debug)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str, // always "function"
    function: WireFunction,
}

/// One message in the request body. `content` serializes as `null` (not
/// omitted) on assistant turns that carry only tool calls, per the API.
#[derive(Serialize, Debug)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Serialize, Debug)]
struct ApiFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize, Debug)]
struct ApiToolDefinition {
    #[serde(rename = "type")]
    kind: &'static str, // always "function"
    function: ApiFunctionDef,
}

#[derive(Serialize, Debug)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiToolDefinition>>,
}

/// One streamed SSE frame.
#[derive(Deserialize, Debug)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Debug, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<DeltaToolCall>>,
}

/// A tool-call fragment: the first fragment for an index carries the id and
/// name, later ones append to the arguments string.
#[derive(Deserialize, Debug)]
struct DeltaToolCall {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<DeltaFunction>,
}

#[derive(Deserialize, Debug, Default)]
struct DeltaFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize, Debug)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize, Debug)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<FullToolCall>>,
}

#[derive(Deserialize, Debug)]
struct FullToolCall {
    id: String,
    function: FullFunction,
}

#[derive(Deserialize, Debug)]
struct FullFunction {
    name: String,
    arguments: String,
}

// ============================================================================
// Translation Layer
// ============================================================================

/// Converts the conversation into chat-completions messages, with an
/// optional leading system message prepended.
fn conversation_to_messages(conversation: &Conversation, system_prompt: &str) -> Vec<WireMessage> {
    let mut out = Vec::with_capacity(conversation.len() + 1);
    if !system_prompt.is_empty() {
        out.push(WireMessage {
            role: "system",
            content: Some(system_prompt.to_string()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        });
    }
    for msg in conversation.messages() {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        let tool_calls = if msg.tool_calls.is_empty() {
            None
        } else {
            Some(
                msg.tool_calls
                    .iter()
                    .map(|tc| WireToolCall {
                        id: tc.id.clone(),
                        kind: "function",
                        function: WireFunction {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect(),
            )
        };
        out.push(WireMessage {
            role,
            content: msg.content.clone(),
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
            name: msg.name.clone(),
        });
    }
    out
}

/// Converts tool definitions to API format. Returns None if empty (omitted
/// from JSON, which disables tool calling for the request).
fn tools_to_api(tools: &[ToolDefinition]) -> Option<Vec<ApiToolDefinition>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                kind: "function",
                function: ApiFunctionDef {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect(),
    )
}

/// Accumulates index-keyed tool-call fragments across stream frames.
///
/// Slots are only finalized (and their argument buffers parsed) once the
/// stream ends; partial JSON is never read.
#[derive(Default)]
struct ToolCallAccumulator {
    slots: Vec<Option<PendingCall>>,
}

struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn absorb(&mut self, fragment: DeltaToolCall) {
        let idx = fragment.index;
        if self.slots.len() <= idx {
            self.slots.resize_with(idx + 1, || None);
        }
        if let Some(id) = fragment.id {
            self.slots[idx] = Some(PendingCall {
                id,
                name: fragment
                    .function
                    .as_ref()
                    .and_then(|f| f.name.clone())
                    .unwrap_or_default(),
                arguments: fragment
                    .function
                    .and_then(|f| f.arguments)
                    .unwrap_or_default(),
            });
        } else if let Some(slot) = self.slots.get_mut(idx).and_then(Option::as_mut) {
            if let Some(args) = fragment.function.and_then(|f| f.arguments) {
                slot.arguments.push_str(&args);
            }
        }
    }

    fn finish(self) -> Vec<ToolCall> {
        self.slots
            .into_iter()
            .flatten()
            .map(|p| ToolCall {
                id: p.id,
                name: p.name,
                arguments: p.arguments,
            })
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Provider for any endpoint speaking the OpenAI chat-completions dialect.
pub struct OpenAiProvider {
    name: &'static str,
    api_key: String,
    base_url: String,
    /// OpenRouter asks gateways to identify the calling app.
    send_app_title: bool,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Provider against api.openai.com (or a compatible `base_url`).
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            name: "openai",
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
            send_app_title: false,
            client: reqwest::Client::new(),
        }
    }

    /// Same dialect through the OpenRouter gateway.
    pub fn openrouter(api_key: String, base_url: Option<String>) -> Self {
        Self {
            name: "openrouter",
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://openrouter.ai/api".to_string()),
            send_app_title: true,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(
        &self,
        request: ChatRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<ChatOutcome, ProviderError> {
        let body = ChatCompletionsRequest {
            model: request.model.to_string(),
            messages: conversation_to_messages(request.conversation, request.system_prompt),
            stream: request.stream,
            tools: tools_to_api(request.tools),
        };

        info!(
            "chat-completions request: model={}, messages={}, stream={}, tools={}",
            request.model,
            body.messages.len(),
            request.stream,
            request.tools.len(),
        );

        let mut builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .timeout(CHAT_TIMEOUT)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        if self.send_app_title {
            builder = builder.header("X-Title", "textlens");
        }

        let response = transport::send(builder).await?;

        if !request.stream {
            let raw = response.text().await.map_err(transport::classify)?;
            let parsed: CompletionResponse =
                serde_json::from_str(&raw).map_err(|e| ProviderError::Parse(e.to_string()))?;
            let message = parsed.choices.into_iter().next().map(|c| c.message);
            let (text, tool_calls) = match message {
                Some(m) => (
                    m.content.unwrap_or_default(),
                    m.tool_calls
                        .unwrap_or_default()
                        .into_iter()
                        .map(|tc| ToolCall {
                            id: tc.id,
                            name: tc.function.name,
                            arguments: tc.function.arguments,
                        })
                        .collect(),
                ),
                None => (String::new(), Vec::new()),
            };
            return Ok(ChatOutcome { text, tool_calls });
        }

        let mut reader = SseReader::new(response);
        let mut text = String::new();
        let mut accumulator = ToolCallAccumulator::default();

        while let Some(data) = reader.next_data().await? {
            if data == "[DONE]" {
                debug!("received [DONE] marker");
                continue;
            }
            // One malformed frame never aborts an otherwise-good stream.
            let frame: StreamFrame = match serde_json::from_str(&data) {
                Ok(f) => f,
                Err(e) => {
                    debug!("skipping unparseable frame: {e}");
                    continue;
                }
            };
            let Some(choice) = frame.choices.into_iter().next() else {
                continue;
            };
            if let Some(delta) = choice.delta.content {
                if !delta.is_empty() {
                    text.push_str(&delta);
                    if sender.send(StreamChunk::Content(delta)).await.is_err() {
                        return Err(ProviderError::ChannelClosed);
                    }
                }
            }
            if let Some(fragments) = choice.delta.tool_calls {
                for fragment in fragments {
                    accumulator.absorb(fragment);
                }
            }
        }

        if !accumulator.is_empty() {
            debug!("stream produced tool calls");
        }
        Ok(ChatOutcome {
            text,
            tool_calls: accumulator.finish(),
        })
    }
}
