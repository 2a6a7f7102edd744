//! # Tool Executor
//!
//! Tools the model can call mid-turn: `web_search` and `add_to_anki`.
//! Definitions are registered in `definitions()` and dispatched by name in
//! `execute()`. Execution failures are recoverable at the turn level, so the
//! error type distinguishes missing configuration from transport and backend
//! failures but all of them render back to the model as plain text.

pub mod anki;
pub mod search;

use serde::Deserialize;
use std::fmt;

use crate::core::config::Settings;
use crate::core::tools::anki::AnkiClient;
use crate::core::tools::search::SearchClient;
use crate::inference::{ToolCall, ToolDefinition};

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ToolError {
    /// Configuration missing; detected before any network traffic.
    Precondition(String),
    /// The model sent arguments we could not decode, or named an unknown tool.
    Arguments(String),
    /// Connection or timeout failure.
    Transport(String),
    /// The backend answered but with an error status or payload.
    Backend(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::Precondition(msg)
            | ToolError::Arguments(msg)
            | ToolError::Transport(msg)
            | ToolError::Backend(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ToolError {}

// ============================================================================
// Argument Shapes
// ============================================================================

#[derive(Deserialize)]
struct WebSearchArgs {
    query: String,
}

#[derive(Deserialize)]
struct AddToAnkiArgs {
    front: String,
    back: String,
    #[serde(rename = "deckName")]
    deck_name: Option<String>,
    tags: Option<Vec<String>>,
}

// ============================================================================
// Dispatch
// ============================================================================

/// Executes a tool call against the configured backends.
pub async fn execute(settings: &Settings, tool_call: &ToolCall) -> Result<String, ToolError> {
    match tool_call.name.as_str() {
        "web_search" => {
            let args: WebSearchArgs = parse_args(&tool_call.arguments)?;
            let client = SearchClient::from_settings(settings)?;
            client.search(&args.query).await
        }
        "add_to_anki" => {
            let args: AddToAnkiArgs = parse_args(&tool_call.arguments)?;
            let client = AnkiClient::from_settings(settings)?;
            let deck = args.deck_name.as_deref().unwrap_or(anki::DEFAULT_DECK);
            let tags = args
                .tags
                .unwrap_or_else(|| vec![anki::DEFAULT_TAG.to_string()]);
            client.add_note(&args.front, &args.back, deck, &tags).await
        }
        other => Err(ToolError::Arguments(format!("Unknown tool: {other}"))),
    }
}

/// Short progress line shown to the user while a tool runs, if the call is
/// well-formed enough to describe.
pub fn status_label(tool_call: &ToolCall) -> Option<String> {
    match tool_call.name.as_str() {
        "web_search" => {
            let args: WebSearchArgs = serde_json::from_str(&tool_call.arguments).ok()?;
            Some(format!("🔍 Searching: {}...", args.query))
        }
        "add_to_anki" => Some("📝 Adding to Anki...".to_string()),
        _ => None,
    }
}

fn parse_args<'a, T: Deserialize<'a>>(raw: &'a str) -> Result<T, ToolError> {
    serde_json::from_str(raw).map_err(|e| ToolError::Arguments(e.to_string()))
}

// ============================================================================
// Definitions
// ============================================================================

const ADD_TO_ANKI_DESCRIPTION: &str = r#"Add a flashcard to Anki. Use when user wants to memorize something.

DECK SELECTION (important!):
- Use "Vocab" deck for: single words, phrases, idioms, expressions, terminology
- Use "Knowledge" deck for: concepts, facts, explanations, how things work, technical knowledge

Use Markdown formatting (will be converted to HTML automatically).

VOCABULARY CARD FORMAT (deckName="Vocab"):
Front: just the word

Back format (Markdown):
**word** /IPA/

**定义:** Part of speech + definition

**语境:** Context explanation

**例句:**
- Example sentence 1
- Example sentence 2

Example:
Front: "turf"
Back: "**turf** /tɜːrf/\n\n**定义:** 名词，草皮；草坪——带有草根和土壤的草皮块。\n\n**语境:** 此处指铺设的草皮草坪，与后文的 mossy mess 形成对比。\n\n**例句:**\n- The gardener laid fresh turf to create a new lawn.\n- After the match, the turf was badly damaged."

FACTS/CONCEPTS CARD FORMAT (deckName="Knowledge"):
Front: Specific question (prefer "why/how" over "what")

Back format (Markdown):
**Answer:** Concise answer

**Why:** Brief reasoning

**Related:** Connection to concepts (optional)

Example:
Front: "Why does QuickSort average O(n log n)?"
Back: "**Answer:** Each partition divides array in half → log n levels, n comparisons each.\n\n**Why:** Pivot selection determines balance—random pivots avoid worst-case O(n²).\n\n**Related:** Similar to merge sort's divide-and-conquer, but in-place.""#;

/// Returns the list of tool definitions available to the model.
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "web_search".into(),
            description: "Search the web for current information. Use when you need up-to-date info or facts you're unsure about.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "The search query" }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: "add_to_anki".into(),
            description: ADD_TO_ANKI_DESCRIPTION.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "front": { "type": "string", "description": "The word/phrase for vocabulary, or a question for facts." },
                    "back": { "type": "string", "description": "Card back in Markdown: pronunciation, definition, context, examples." },
                    "deckName": { "type": "string", "description": "Deck name: 'Vocab' for vocabulary, 'Knowledge' for facts/concepts", "default": "Vocab" },
                    "tags": { "type": "array", "items": { "type": "string" }, "description": "Tags like: topic::science, source::article, priority::high" }
                },
                "required": ["front", "back"]
            }),
        },
    ]
}
