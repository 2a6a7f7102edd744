//! Flashcard creation against an Anki sync server.
//!
//! Authentication uses an `hkey` field in the request body, the SHA-1 hex
//! digest of the configured API key. The card back arrives as markdown and
//! is rendered to sanitized HTML before submission so Anki displays it
//! directly.

use log::info;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::time::Duration;

use crate::core::config::Settings;
use crate::core::render::markdown_to_html;
use crate::core::tools::ToolError;

const ANKI_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_DECK: &str = "Vocab";
pub const DEFAULT_NOTETYPE: &str = "Basic";
pub const DEFAULT_TAG: &str = "text-explainer";

pub struct AnkiClient {
    endpoint: String,
    hkey: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct AddNoteRequest<'a> {
    hkey: &'a str,
    deck: &'a str,
    notetype: &'a str,
    fields: NoteFields<'a>,
    tags: &'a [String],
}

#[derive(Serialize)]
struct NoteFields<'a> {
    #[serde(rename = "Front")]
    front: &'a str,
    #[serde(rename = "Back")]
    back: &'a str,
}

#[derive(Deserialize)]
struct AddNoteResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    data: Option<AddNoteData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct AddNoteData {
    note_id: i64,
}

fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

impl AnkiClient {
    pub fn new(endpoint: String, api_key: &str) -> Self {
        Self {
            endpoint,
            hkey: sha1_hex(api_key),
            client: reqwest::Client::new(),
        }
    }

    /// Builds a client from settings, or a precondition error if the endpoint
    /// or key is missing. No network is touched here.
    pub fn from_settings(settings: &Settings) -> Result<Self, ToolError> {
        let endpoint = settings.anki_endpoint.as_deref().ok_or_else(|| {
            ToolError::Precondition("Anki endpoint not configured. Set it in Settings.".to_string())
        })?;
        let api_key = settings.anki_api_key.as_deref().ok_or_else(|| {
            ToolError::Precondition("Anki API key not configured. Set it in Settings.".to_string())
        })?;
        Ok(Self::new(endpoint.to_string(), api_key))
    }

    /// Adds a note and returns a confirmation line with the new note id.
    pub async fn add_note(
        &self,
        front: &str,
        back_markdown: &str,
        deck: &str,
        tags: &[String],
    ) -> Result<String, ToolError> {
        info!("adding Anki note to deck '{}'", deck);
        let back_html = markdown_to_html(back_markdown);
        let body = AddNoteRequest {
            hkey: &self.hkey,
            deck,
            notetype: DEFAULT_NOTETYPE,
            fields: NoteFields {
                front,
                back: &back_html,
            },
            tags,
        };

        let url = format!("{}/api/v1/notes/add", self.endpoint);
        let response = self
            .client
            .post(url)
            .json(&body)
            .timeout(ANKI_TIMEOUT)
            .send()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Backend(format!(
                "Anki error: {}",
                status.as_u16()
            )));
        }

        let parsed: AddNoteResponse = response
            .json()
            .await
            .map_err(|_| ToolError::Backend("Failed to parse Anki response".to_string()))?;
        if !parsed.ok {
            return Err(ToolError::Backend(
                parsed.error.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }
        let note_id = parsed
            .data
            .map(|d| d.note_id)
            .ok_or_else(|| ToolError::Backend("Failed to parse Anki response".to_string()))?;
        Ok(format!("Card added (ID: {note_id})"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_hex_known_vector() {
        assert_eq!(
            sha1_hex("abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_missing_endpoint_is_precondition() {
        let settings = Settings {
            anki_api_key: Some("key".to_string()),
            ..Default::default()
        };
        let err = AnkiClient::from_settings(&settings)
            .map(|_| ())
            .expect_err("missing endpoint must fail");
        match err {
            ToolError::Precondition(msg) => assert!(msg.contains("endpoint")),
            other => panic!("expected precondition error, got {other}"),
        }
    }

    #[test]
    fn test_missing_key_is_precondition() {
        let settings = Settings {
            anki_endpoint: Some("https://anki.example.com".to_string()),
            ..Default::default()
        };
        assert!(AnkiClient::from_settings(&settings).map(|_| ()).is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let tags = vec![DEFAULT_TAG.to_string()];
        let body = AddNoteRequest {
            hkey: "deadbeef",
            deck: "Vocab",
            notetype: "Basic",
            fields: NoteFields {
                front: "turf",
                back: "<p>grass</p>",
            },
            tags: &tags,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["hkey"], "deadbeef");
        assert_eq!(json["notetype"], "Basic");
        assert_eq!(json["fields"]["Front"], "turf");
        assert_eq!(json["fields"]["Back"], "<p>grass</p>");
        assert_eq!(json["tags"][0], "text-explainer");
    }

    #[test]
    fn test_response_error_shape() {
        let parsed: AddNoteResponse =
            serde_json::from_str(r#"{"ok":false,"error":"deck not found"}"#).unwrap();
        assert!(!parsed.ok);
        assert_eq!(parsed.error.as_deref(), Some("deck not found"));
    }
}
