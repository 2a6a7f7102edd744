//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars.
//!
//! Config lives at `~/.textlens/config.toml`. If missing on first load, a
//! commented-out default is generated so users can discover all options.
//!
//! The core never reads this at runtime: callers resolve once into an
//! immutable [`Settings`] snapshot and pass that into each call, so edits
//! between calls never race an in-flight request.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;

// ============================================================================
// Provider / Backend Identifiers
// ============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    #[default]
    OpenRouter,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gemini" => Some(ProviderKind::Gemini),
            "openai" => Some(ProviderKind::OpenAi),
            "openrouter" => Some(ProviderKind::OpenRouter),
            "anthropic" => Some(ProviderKind::Anthropic),
            _ => None,
        }
    }

    /// The provider's well-known API root, used when no base URL is set.
    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
            ProviderKind::OpenAi => "https://api.openai.com",
            ProviderKind::OpenRouter => "https://openrouter.ai/api",
            ProviderKind::Anthropic => "https://api.anthropic.com",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    Kagi,
    #[default]
    Brave,
    Tavily,
}

impl SearchBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchBackend::Kagi => "kagi",
            SearchBackend::Brave => "brave",
            SearchBackend::Tavily => "tavily",
        }
    }
}

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TextlensConfig {
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub anki: AnkiConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ChatConfig {
    pub provider: Option<ProviderKind>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SearchConfig {
    pub provider: Option<SearchBackend>,
    /// Endpoint override for the active backend; defaults to its public API.
    pub base_url: Option<String>,
    pub kagi_api_key: Option<String>,
    pub brave_api_key: Option<String>,
    pub tavily_api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AnkiConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_LANGUAGE: &str = "Chinese";

// ============================================================================
// Resolved Settings (concrete values, no Options unless truly optional)
// ============================================================================

/// Immutable snapshot of everything the core reads for one call.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: ProviderKind,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub language: String,
    pub search_backend: SearchBackend,
    pub search_base_url: Option<String>,
    pub kagi_api_key: Option<String>,
    pub brave_api_key: Option<String>,
    pub tavily_api_key: Option<String>,
    pub anki_endpoint: Option<String>,
    pub anki_api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        // Pure defaults: no config file and no environment.
        resolve_with(&TextlensConfig::default(), |_| None)
    }
}

impl Settings {
    /// Key for the *active* search backend. Gates tool exposure.
    pub fn search_api_key(&self) -> Option<&str> {
        match self.search_backend {
            SearchBackend::Kagi => self.kagi_api_key.as_deref(),
            SearchBackend::Brave => self.brave_api_key.as_deref(),
            SearchBackend::Tavily => self.tavily_api_key.as_deref(),
        }
    }

    /// Whether any search key exists at all (drives the prompt hint, which
    /// is looser than the tool gate on purpose).
    pub fn any_search_key(&self) -> bool {
        self.kagi_api_key.is_some()
            || self.brave_api_key.is_some()
            || self.tavily_api_key.is_some()
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Loading
// ============================================================================

/// Returns the path to `~/.textlens/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".textlens").join("config.toml"))
}

/// Load config from `~/.textlens/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and returns
/// `TextlensConfig::default()`. If it exists but is malformed, returns
/// `ConfigError::Parse`.
pub fn load_config() -> Result<TextlensConfig, ConfigError> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            warn!("Could not determine home directory, using default config");
            return Ok(TextlensConfig::default());
        }
    };

    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(&path);
        return Ok(TextlensConfig::default());
    }

    let contents = fs::read_to_string(&path).map_err(ConfigError::Io)?;
    let config: TextlensConfig = toml::from_str(&contents).map_err(ConfigError::Parse)?;
    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);
    Ok(config)
}

/// Generates a commented-out default config file at the given path.
fn generate_default_config(path: &PathBuf) {
    let default_content = r#"# textlens configuration
# All settings are optional; defaults are used for anything not specified.
# Override hierarchy: defaults → this file → env vars.

# [chat]
# provider = "openrouter"            # "gemini", "openai", "openrouter", "anthropic"
# base_url = "https://openrouter.ai/api"
# api_key = "sk-or-..."              # Or set LLM_API_KEY env var
# model = "openai/gpt-4o-mini"
# language = "Chinese"               # Response language

# [search]
# provider = "brave"                 # "brave", "kagi", "tavily"
# brave_api_key = "..."              # Or BRAVE_API_KEY env var
# kagi_api_key = "..."               # Or KAGI_API_KEY env var
# tavily_api_key = "..."             # Or TAVILY_API_KEY env var

# [anki]
# endpoint = "https://anki.example.com"   # Or ANKI_ENDPOINT env var
# api_key = "..."                         # Or ANKI_API_KEY env var
"#;

    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("Failed to create config directory: {}", e);
            return;
        }
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve final settings by collapsing: defaults → config file → env vars.
pub fn resolve(config: &TextlensConfig) -> Settings {
    resolve_with(config, |var| std::env::var(var).ok())
}

/// Resolution with an injected environment, so callers (and tests) control
/// exactly which variables are visible.
pub fn resolve_with(
    config: &TextlensConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let env_or = |var: &str, fallback: Option<String>| env(var).or(fallback);

    let provider = env("TEXTLENS_PROVIDER")
        .and_then(|s| ProviderKind::parse(&s))
        .or(config.chat.provider)
        .unwrap_or_default();

    let base_url = env_or("LLM_BASE_URL", config.chat.base_url.clone())
        .unwrap_or_else(|| provider.default_base_url().to_string());

    let model = env_or("TEXTLENS_MODEL", config.chat.model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    Settings {
        provider,
        base_url,
        api_key: env_or("LLM_API_KEY", config.chat.api_key.clone()).unwrap_or_default(),
        model,
        language: config
            .chat
            .language
            .clone()
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        search_backend: config.search.provider.unwrap_or_default(),
        search_base_url: config.search.base_url.clone(),
        kagi_api_key: env_or("KAGI_API_KEY", config.search.kagi_api_key.clone()),
        brave_api_key: env_or("BRAVE_API_KEY", config.search.brave_api_key.clone()),
        tavily_api_key: env_or("TAVILY_API_KEY", config.search.tavily_api_key.clone()),
        anki_endpoint: env_or("ANKI_ENDPOINT", config.anki.endpoint.clone()),
        anki_api_key: env_or("ANKI_API_KEY", config.anki.api_key.clone()),
    }
}
