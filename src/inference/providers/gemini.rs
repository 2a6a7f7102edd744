//! Gemini provider using the `streamGenerateContent` API.
//!
//! Gemini has no system/tool role vocabulary: `assistant` maps to `model`
//! and everything else maps to `user`; the system prompt travels as a
//! top-level `systemInstruction`. Tool calling is not offered through this
//! adapter, so tools are force-disabled whenever Gemini is active
//! regardless of which tool keys are configured.

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;

use crate::inference::transport::{self, SseReader, CHAT_TIMEOUT};
use crate::inference::{
    ChatOutcome, ChatProvider, ChatRequest, Conversation, ProviderError, Role, StreamChunk,
};

const TEMPERATURE: f32 = 0.7;

// ============================================================================
// Generate Content API Types
// ============================================================================

#[derive(Serialize, Debug)]
struct Part {
    text: String,
}

#[derive(Serialize, Debug)]
struct Content {
    parts: Vec<Part>,
    role: &'static str,
}

#[derive(Serialize, Debug)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize, Debug)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize, Debug)]
struct StreamFrame {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

// ============================================================================
// Translation Layer
// ============================================================================

fn conversation_to_contents(conversation: &Conversation) -> Vec<Content> {
    conversation
        .messages()
        .iter()
        .map(|msg| Content {
            parts: vec![Part {
                text: msg.content.clone().unwrap_or_default(),
            }],
            role: match msg.role {
                Role::Assistant => "model",
                _ => "user",
            },
        })
        .collect()
}

fn frame_text(frame: StreamFrame) -> String {
    frame
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default()
}

// ============================================================================
// Provider Implementation
// ============================================================================

pub struct GeminiProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn supports_tools(&self) -> bool {
        false
    }

    async fn complete(
        &self,
        request: ChatRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<ChatOutcome, ProviderError> {
        let body = GenerateContentRequest {
            contents: conversation_to_contents(request.conversation),
            system_instruction: if request.system_prompt.is_empty() {
                None
            } else {
                Some(SystemInstruction {
                    parts: vec![Part {
                        text: request.system_prompt.to_string(),
                    }],
                })
            },
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
            },
        };

        info!(
            "generate-content request: model={}, contents={}, stream={}",
            request.model,
            body.contents.len(),
            request.stream,
        );

        // The SSE endpoint serves both modes; a non-streamed round just
        // accumulates without forwarding deltas.
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, request.model, self.api_key
        );
        let builder = self.client.post(url).timeout(CHAT_TIMEOUT).json(&body);
        let response = transport::send(builder).await?;

        let mut reader = SseReader::new(response);
        let mut text = String::new();

        while let Some(data) = reader.next_data().await? {
            let frame: StreamFrame = match serde_json::from_str(&data) {
                Ok(f) => f,
                Err(e) => {
                    debug!("skipping unparseable frame: {e}");
                    continue;
                }
            };
            let chunk = frame_text(frame);
            if chunk.is_empty() {
                continue;
            }
            text.push_str(&chunk);
            if request.stream && sender.send(StreamChunk::Content(chunk)).await.is_err() {
                return Err(ProviderError::ChannelClosed);
            }
        }

        Ok(ChatOutcome {
            text,
            tool_calls: Vec::new(),
        })
    }
}
