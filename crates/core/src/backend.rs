//! Backend trait: the abstraction over text-generation services.
//!
//! A Backend knows how to send a conversation to a model and get a reply
//! back, either as a complete message or as a stream of fragments.
//!
//! Implementations: Ollama (`colloquy-providers`), scripted mocks in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::BackendError;
use crate::message::{Message, ToolCallRequest};
use crate::tool::ToolDescriptor;

/// Sampling options forwarded to the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
}

fn default_temperature() -> f32 {
    0.8
}
fn default_top_p() -> f32 {
    0.9
}
fn default_repeat_penalty() -> f32 {
    1.1
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            repeat_penalty: default_repeat_penalty(),
        }
    }
}

/// One generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The model to use (e.g., "mistral:7b")
    pub model: String,

    /// The full conversation, in order
    pub messages: Vec<Message>,

    /// Declared tools, in registration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,

    #[serde(default)]
    pub options: GenerationOptions,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Whether the model should emit a reasoning trace
    #[serde(default)]
    pub reasoning: bool,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete (non-streaming) reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// The generated assistant message (content and/or tool calls)
    pub message: Message,

    /// Reasoning trace, when requested and produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded
    pub model: String,
}

/// One incremental unit of a streamed reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Reasoning-channel text delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Content-channel text delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Completed tool calls carried by this fragment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Whether this is the final fragment
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final fragment)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Fragment {
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }
}

/// The receiving half of a fragment stream. Dropping it cancels the stream.
pub type FragmentReceiver = mpsc::Receiver<Result<Fragment, BackendError>>;

/// The core Backend trait.
///
/// The orchestration loop calls `generate()` or `stream()` without knowing
/// which service is on the other side.
#[async_trait]
pub trait Backend: Send + Sync {
    /// A human-readable name for this backend (e.g., "ollama").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, BackendError>;

    /// Send a request and get a stream of fragments.
    ///
    /// Default implementation calls `generate()` and replays the reply as
    /// a single reasoning fragment (if any) followed by one final fragment.
    async fn stream(&self, request: GenerationRequest) -> Result<FragmentReceiver, BackendError> {
        let response = self.generate(request).await?;
        let (tx, rx) = mpsc::channel(2);
        if let Some(reasoning) = response.reasoning {
            let _ = tx.send(Ok(Fragment::reasoning(reasoning))).await;
        }
        let _ = tx
            .send(Ok(Fragment {
                reasoning: None,
                content: Some(response.message.content),
                tool_calls: response.message.tool_calls,
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }

    /// List available models for this backend.
    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend;

    #[async_trait]
    impl Backend for FixedBackend {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, BackendError> {
            Ok(GenerationResponse {
                message: Message::assistant("42"),
                reasoning: Some("thinking hard".into()),
                usage: None,
                model: "fixed".into(),
            })
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "fixed".into(),
            messages: vec![Message::user("question")],
            tools: vec![],
            options: GenerationOptions::default(),
            stream: true,
            reasoning: true,
        }
    }

    #[test]
    fn generation_option_defaults() {
        let opts = GenerationOptions::default();
        assert!((opts.temperature - 0.8).abs() < f32::EPSILON);
        assert!((opts.top_p - 0.9).abs() < f32::EPSILON);
        assert!((opts.repeat_penalty - 1.1).abs() < f32::EPSILON);
    }

    #[test]
    fn options_fill_missing_fields() {
        let opts: GenerationOptions = serde_json::from_str(r#"{"temperature":0.2}"#).unwrap();
        assert!((opts.temperature - 0.2).abs() < f32::EPSILON);
        assert!((opts.top_p - 0.9).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn default_stream_replays_generate() {
        let mut rx = FixedBackend.stream(request()).await.unwrap();

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.reasoning.as_deref(), Some("thinking hard"));
        assert!(!first.done);

        let last = rx.recv().await.unwrap().unwrap();
        assert_eq!(last.content.as_deref(), Some("42"));
        assert!(last.done);

        assert!(rx.recv().await.is_none());
    }
}
