//! Configuration loading, validation, and management for Colloquy.
//!
//! Loads configuration from `~/.colloquy/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use colloquy_core::backend::GenerationOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.colloquy/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model to chat with
    #[serde(default = "default_model")]
    pub model: String,

    /// Stream replies fragment by fragment
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Ask the model for a reasoning trace
    #[serde(default)]
    pub think: bool,

    /// Sampling options sent with every request
    #[serde(default)]
    pub options: GenerationOptions,

    /// Maximum backend calls per user turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Markdown file loaded as the system message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_path: Option<PathBuf>,

    /// Inputs that end the interactive session
    #[serde(default = "default_exit_commands")]
    pub exit_commands: Vec<String>,

    /// Backend connection settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Vector store settings for `searchVectorStore`
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
}

fn default_model() -> String {
    "mistral:7b".into()
}
fn default_true() -> bool {
    true
}
fn default_max_iterations() -> u32 {
    10
}
fn default_exit_commands() -> Vec<String> {
    vec!["sair".into(), "exit".into(), "quit".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds; 0 disables it
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Index host, e.g. `https://my-index-abc123.svc.pinecone.io`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default)]
    pub namespace: String,

    #[serde(default = "default_top_k")]
    pub top_k: u32,
}

fn default_top_k() -> u32 {
    5
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            index_host: None,
            api_key: None,
            namespace: String::new(),
            top_k: default_top_k(),
        }
    }
}

impl VectorStoreConfig {
    /// True when both host and key are set.
    pub fn is_configured(&self) -> bool {
        self.index_host.is_some() && self.api_key.is_some()
    }
}

impl std::fmt::Debug for VectorStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreConfig")
            .field("index_host", &self.index_host)
            .field("api_key", &redact(&self.api_key))
            .field("namespace", &self.namespace)
            .field("top_k", &self.top_k)
            .finish()
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl AppConfig {
    /// Load configuration from the default path with env var overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides and re-validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `COLLOQUY_*` and `PINECONE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("COLLOQUY_MODEL") {
            self.model = model;
        }
        if let Some(url) = lookup("COLLOQUY_BASE_URL") {
            self.backend.base_url = url;
        }
        if let Some(key) = lookup("PINECONE_API_KEY") {
            self.vector_store.api_key = Some(key);
        }
        if let Some(host) = lookup("PINECONE_INDEX_HOST") {
            self.vector_store.index_host = Some(host);
        }
        if let Some(ns) = lookup("PINECONE_NAMESPACE") {
            self.vector_store.namespace = ns;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".colloquy")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.options.temperature) {
            return Err(ConfigError::ValidationError(
                "options.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.options.top_p <= 0.0 || self.options.top_p > 1.0 {
            return Err(ConfigError::ValidationError(
                "options.top_p must be in (0.0, 1.0]".into(),
            ));
        }

        if self.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "max_iterations must be at least 1".into(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        Ok(())
    }

    /// Case-insensitive check against the configured exit commands.
    pub fn is_exit_command(&self, input: &str) -> bool {
        let input = input.trim().to_lowercase();
        self.exit_commands.iter().any(|c| c.to_lowercase() == input)
    }

    /// The request timeout, or `None` when disabled.
    pub fn request_timeout(&self) -> Option<std::time::Duration> {
        match self.backend.request_timeout_secs {
            0 => None,
            secs => Some(std::time::Duration::from_secs(secs)),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            stream: true,
            think: false,
            options: GenerationOptions::default(),
            max_iterations: default_max_iterations(),
            system_prompt_path: None,
            exit_commands: default_exit_commands(),
            backend: BackendConfig::default(),
            vector_store: VectorStoreConfig::default(),
        }
    }
}

/// Read the system prompt from a Markdown file.
///
/// Returns `None` (after a warning) when the file cannot be read, so a
/// session can start without one.
pub fn load_system_prompt(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "System prompt file is empty");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Error loading system prompt");
            None
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.model, "mistral:7b");
        assert!(config.stream);
        assert!(!config.think);
        assert_eq!(config.vector_store.top_k, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.backend.base_url, config.backend.base_url);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.options.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let config = AppConfig {
            max_iterations: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.model, "mistral:7b");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
model = "qwen3:1.7b"
think = true

[options]
temperature = 0.2
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.model, "qwen3:1.7b");
        assert!(config.think);
        assert!((config.options.temperature - 0.2).abs() < f32::EPSILON);
        assert!((config.options.top_p - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.max_iterations, 10);
    }

    #[test]
    fn unparseable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("COLLOQUY_MODEL", "llama3.2"),
            ("PINECONE_API_KEY", "pc-secret"),
            ("PINECONE_INDEX_HOST", "https://idx.example.io"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.model, "llama3.2");
        assert!(config.vector_store.is_configured());
        assert_eq!(config.backend.base_url, "http://localhost:11434");
    }

    #[test]
    fn exit_commands_are_case_insensitive() {
        let config = AppConfig::default();
        for cmd in ["exit", "QUIT", "  Sair  "] {
            assert!(config.is_exit_command(cmd), "{cmd} should exit");
        }
        assert!(!config.is_exit_command("exit now"));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let mut config = AppConfig::default();
        assert_eq!(config.request_timeout(), Some(std::time::Duration::from_secs(120)));
        config.backend.request_timeout_secs = 0;
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.vector_store.api_key = Some("pc-secret".into());
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("pc-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn system_prompt_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.md");
        std::fs::write(&path, "# Rules\nBe terse.").unwrap();

        assert_eq!(load_system_prompt(&path).as_deref(), Some("# Rules\nBe terse."));
        assert!(load_system_prompt(&dir.path().join("missing.md")).is_none());
    }
}
