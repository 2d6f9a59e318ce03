//! Text-generation backend implementations for Colloquy.
//!
//! Currently a single backend: a local Ollama server speaking its native
//! `/api/chat` protocol, with streaming, tool calling and reasoning output.

pub mod ollama;

pub use ollama::{OllamaBackend, PullProgress};

use colloquy_config::AppConfig;

/// Build the configured backend.
pub fn build_from_config(config: &AppConfig) -> OllamaBackend {
    OllamaBackend::new(&config.backend.base_url)
}
