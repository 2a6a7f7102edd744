//! # Core Logic
//!
//! Everything between a text selection and the final rendered answer. It
//! knows nothing about any specific UI technology; callers feed it a
//! conversation and drain a channel of progress events.
//!
//! ## Modules
//!
//! - [`config`]: settings file, env overrides, resolved [`config::Settings`] snapshot
//! - [`prompt`]: builds the opening prompt from a text selection
//! - [`chat`]: the turn orchestrator and its tool-call loop
//! - [`tools`]: web search and flashcard executors plus their registry
//! - [`render`]: markdown to sanitized HTML

pub mod chat;
pub mod config;
pub mod prompt;
pub mod render;
pub mod tools;
