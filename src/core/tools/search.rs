//! Web search backends (Kagi, Brave, Tavily).
//!
//! All three normalize to the same plain-text result block so the model sees
//! one format regardless of backend: up to five `[title](url)` lines each
//! followed by a snippet, blank-line separated.

use log::info;
use serde::Deserialize;
use std::time::Duration;

use crate::core::config::{SearchBackend, Settings};
use crate::core::tools::ToolError;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RESULTS: usize = 5;

pub struct SearchClient {
    backend: SearchBackend,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

// ============================================================================
// Backend Response Types
// ============================================================================

#[derive(Deserialize)]
struct KagiResponse {
    #[serde(default)]
    data: Vec<KagiItem>,
}

/// `t == 0` marks a regular result; other values are related-search rows.
#[derive(Deserialize)]
struct KagiItem {
    #[serde(default)]
    t: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: BraveWeb,
}

#[derive(Deserialize, Default)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveItem>,
}

#[derive(Deserialize)]
struct BraveItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyItem>,
}

#[derive(Deserialize)]
struct TavilyItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

fn format_results<'a>(items: impl Iterator<Item = (&'a str, &'a str, &'a str)>) -> String {
    let block = items
        .take(MAX_RESULTS)
        .map(|(title, url, snippet)| format!("[{title}]({url})\n{snippet}"))
        .collect::<Vec<_>>()
        .join("\n\n");
    if block.is_empty() {
        "No results found.".to_string()
    } else {
        block
    }
}

// ============================================================================
// Client
// ============================================================================

impl SearchClient {
    pub fn new(backend: SearchBackend, api_key: String, base_url: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| {
            match backend {
                SearchBackend::Kagi => "https://kagi.com",
                SearchBackend::Brave => "https://api.search.brave.com",
                SearchBackend::Tavily => "https://api.tavily.com",
            }
            .to_string()
        });
        Self {
            backend,
            api_key,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Builds a client for the configured backend, or a precondition error if
    /// the backend's key is missing. No network is touched here.
    pub fn from_settings(settings: &Settings) -> Result<Self, ToolError> {
        let key = settings.search_api_key().ok_or_else(|| {
            ToolError::Precondition(format!(
                "{} API key not configured. Set it in Settings.",
                settings.search_backend.as_str()
            ))
        })?;
        Ok(Self::new(
            settings.search_backend,
            key.to_string(),
            settings.search_base_url.clone(),
        ))
    }

    pub async fn search(&self, query: &str) -> Result<String, ToolError> {
        info!("web search ({}): {}", self.backend.as_str(), query);
        match self.backend {
            SearchBackend::Kagi => self.search_kagi(query).await,
            SearchBackend::Brave => self.search_brave(query).await,
            SearchBackend::Tavily => self.search_tavily(query).await,
        }
    }

    async fn search_kagi(&self, query: &str) -> Result<String, ToolError> {
        let url = format!("{}/api/v0/search", self.base_url);
        let response = self
            .client
            .get(url)
            .query(&[("q", query)])
            .header("Accept", "application/json")
            .header("Authorization", format!("Bot {}", self.api_key))
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status("Kagi", response)?;
        let parsed: KagiResponse = response
            .json()
            .await
            .map_err(|_| ToolError::Backend("Failed to parse Kagi response".to_string()))?;
        Ok(format_results(
            parsed
                .data
                .iter()
                .filter(|r| r.t == 0)
                .map(|r| (r.title.as_str(), r.url.as_str(), r.snippet.as_str())),
        ))
    }

    async fn search_brave(&self, query: &str) -> Result<String, ToolError> {
        let url = format!("{}/res/v1/web/search", self.base_url);
        let response = self
            .client
            .get(url)
            .query(&[("q", query)])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status("Brave", response)?;
        let parsed: BraveResponse = response
            .json()
            .await
            .map_err(|_| ToolError::Backend("Failed to parse Brave response".to_string()))?;
        Ok(format_results(
            parsed
                .web
                .results
                .iter()
                .map(|r| (r.title.as_str(), r.url.as_str(), r.description.as_str())),
        ))
    }

    async fn search_tavily(&self, query: &str) -> Result<String, ToolError> {
        let url = format!("{}/search", self.base_url);
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "search_depth": "basic",
            "max_results": MAX_RESULTS,
        });
        let response = self
            .client
            .post(url)
            .json(&body)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status("Tavily", response)?;
        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|_| ToolError::Backend("Failed to parse Tavily response".to_string()))?;
        Ok(format_results(
            parsed
                .results
                .iter()
                .map(|r| (r.title.as_str(), r.url.as_str(), r.content.as_str())),
        ))
    }
}

fn transport_error(e: reqwest::Error) -> ToolError {
    ToolError::Transport(e.to_string())
}

fn check_status(backend: &str, response: reqwest::Response) -> Result<reqwest::Response, ToolError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ToolError::Backend(format!(
            "{} error: {}",
            backend,
            status.as_u16()
        )))
    }
}
