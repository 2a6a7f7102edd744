//! Anthropic provider using the Messages API.
//!
//! Differences from the chat-completions dialect this crate otherwise
//! speaks: the system prompt is a top-level field, assistant tool calls are
//! `tool_use` content blocks, and tool results must be sent back as a
//! *user* message holding a `tool_result` block (the API enforces strict
//! user/assistant alternation). Streaming frames are typed events.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;

use crate::inference::transport::{self, SseReader, CHAT_TIMEOUT};
use crate::inference::{
    ChatOutcome, ChatProvider, ChatRequest, Conversation, ProviderError, Role, StreamChunk,
    ToolCall, ToolDefinition,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

// ============================================================================
// Messages API Types
// ============================================================================

#[derive(Serialize, Debug)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Serialize, Debug)]
struct WireMessage {
    role: &'static str,
    content: WireContent,
}

#[derive(Serialize, Debug)]
struct ApiToolDefinition {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Serialize, Debug)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiToolDefinition>>,
}

/// One streamed event. The event type is repeated inside the JSON, so the
/// SSE `event:` line can be ignored.
#[derive(Deserialize, Debug)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    content_block: Option<StartedBlock>,
    #[serde(default)]
    delta: Option<EventDelta>,
}

#[derive(Deserialize, Debug)]
struct StartedBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize, Debug, Default)]
struct EventDelta {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    partial_json: Option<String>,
}

/// Non-streamed response: a flat array of content blocks.
#[derive(Deserialize, Debug)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize, Debug)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<serde_json::Value>,
}

// ============================================================================
// Translation Layer
// ============================================================================

/// Re-encodes the conversation for the Messages API. Tool results become
/// user-wrapped `tool_result` blocks; assistant tool-call turns become
/// `tool_use` blocks with their argument JSON parsed for the wire.
fn conversation_to_messages(conversation: &Conversation) -> Vec<WireMessage> {
    conversation
        .messages()
        .iter()
        .map(|msg| match msg.role {
            Role::Tool => WireMessage {
                role: "user",
                content: WireContent::Blocks(vec![ContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                    content: msg.content.clone().unwrap_or_default(),
                }]),
            },
            Role::Assistant if !msg.tool_calls.is_empty() => WireMessage {
                role: "assistant",
                content: WireContent::Blocks(
                    msg.tool_calls
                        .iter()
                        .map(|tc| ContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            input: serde_json::from_str(&tc.arguments)
                                .unwrap_or_else(|_| serde_json::json!({})),
                        })
                        .collect(),
                ),
            },
            Role::Assistant => WireMessage {
                role: "assistant",
                content: WireContent::Text(msg.content.clone().unwrap_or_default()),
            },
            Role::User => WireMessage {
                role: "user",
                content: WireContent::Text(msg.content.clone().unwrap_or_default()),
            },
        })
        .collect()
}

fn tools_to_api(tools: &[ToolDefinition]) -> Option<Vec<ApiToolDefinition>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect(),
    )
}

/// Tool calls open with `content_block_start` and grow through
/// `input_json_delta` events appended to the most recently opened block.
#[derive(Default)]
struct BlockAccumulator {
    calls: Vec<ToolCall>,
}

impl BlockAccumulator {
    fn open(&mut self, id: String, name: String) {
        self.calls.push(ToolCall {
            id,
            name,
            arguments: String::new(),
        });
    }

    fn append_json(&mut self, fragment: &str) {
        match self.calls.last_mut() {
            Some(call) => call.arguments.push_str(fragment),
            None => warn!("input_json_delta with no open tool_use block"),
        }
    }
}

// ============================================================================
// Provider Implementation
// ============================================================================

pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        request: ChatRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<ChatOutcome, ProviderError> {
        let body = MessagesRequest {
            model: request.model.to_string(),
            max_tokens: MAX_TOKENS,
            system: request.system_prompt.to_string(),
            messages: conversation_to_messages(request.conversation),
            stream: request.stream,
            tools: tools_to_api(request.tools),
        };

        info!(
            "messages request: model={}, messages={}, stream={}, tools={}",
            request.model,
            body.messages.len(),
            request.stream,
            request.tools.len(),
        );

        let builder = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .timeout(CHAT_TIMEOUT)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response = transport::send(builder).await?;

        if !request.stream {
            let raw = response.text().await.map_err(transport::classify)?;
            let parsed: MessagesResponse =
                serde_json::from_str(&raw).map_err(|e| ProviderError::Parse(e.to_string()))?;
            let mut text = String::new();
            let mut tool_calls = Vec::new();
            for block in parsed.content {
                match block.kind.as_str() {
                    "text" => text.push_str(block.text.as_deref().unwrap_or("")),
                    "tool_use" => tool_calls.push(ToolCall {
                        id: block.id.unwrap_or_default(),
                        name: block.name.unwrap_or_default(),
                        arguments: block
                            .input
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "{}".to_string()),
                    }),
                    other => debug!("ignoring content block type '{other}'"),
                }
            }
            return Ok(ChatOutcome { text, tool_calls });
        }

        let mut reader = SseReader::new(response);
        let mut text = String::new();
        let mut accumulator = BlockAccumulator::default();

        while let Some(data) = reader.next_data().await? {
            let event: StreamEvent = match serde_json::from_str(&data) {
                Ok(e) => e,
                Err(e) => {
                    debug!("skipping unparseable frame: {e}");
                    continue;
                }
            };
            match event.event_type.as_str() {
                "content_block_start" => {
                    if let Some(block) = event.content_block
                        && block.kind == "tool_use"
                    {
                        debug!("tool_use block started: {} ({})", block.name, block.id);
                        accumulator.open(block.id, block.name);
                    }
                }
                "content_block_delta" => {
                    let Some(delta) = event.delta else { continue };
                    if delta.kind.as_deref() == Some("input_json_delta") {
                        if let Some(fragment) = delta.partial_json {
                            accumulator.append_json(&fragment);
                        }
                    } else if let Some(chunk) = delta.text
                        && !chunk.is_empty()
                    {
                        text.push_str(&chunk);
                        if sender.send(StreamChunk::Content(chunk)).await.is_err() {
                            return Err(ProviderError::ChannelClosed);
                        }
                    }
                }
                other => debug!("ignoring event type '{other}'"),
            }
        }

        Ok(ChatOutcome {
            text,
            tool_calls: accumulator.calls,
        })
    }
}
