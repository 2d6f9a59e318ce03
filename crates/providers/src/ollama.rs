//! Ollama backend implementation.
//!
//! Speaks Ollama's native API:
//! - `POST /api/chat`: chat completions, single JSON reply or NDJSON stream,
//!   with tool calling and `thinking` output
//! - `GET /api/tags`: installed models
//! - `POST /api/pull`: model download with streamed progress

use async_trait::async_trait;
use colloquy_core::backend::*;
use colloquy_core::error::BackendError;
use colloquy_core::message::{Message, ToolCallRequest};
use colloquy_core::tool::ToolDescriptor;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// A local (or remote) Ollama server.
pub struct OllamaBackend {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a backend for the server at `base_url` (e.g. `http://localhost:11434`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the `/api/chat` body for a request.
    fn chat_body(request: &GenerationRequest, stream: bool) -> ApiChatRequest {
        ApiChatRequest {
            model: request.model.clone(),
            messages: Self::to_api_messages(&request.messages),
            tools: Self::to_api_tools(&request.tools),
            stream,
            think: request.reasoning,
            options: ApiOptions {
                temperature: request.options.temperature,
                top_p: request.options.top_p,
                repeat_penalty: request.options.repeat_penalty,
            },
        }
    }

    /// Convert our Message types to Ollama's format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
                thinking: None,
                tool_calls: m
                    .tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        function: ApiFunction {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect(),
                tool_name: m.tool_name.clone(),
            })
            .collect()
    }

    /// Convert tool descriptors to Ollama's `tools` format.
    fn to_api_tools(tools: &[ToolDescriptor]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    async fn post_chat(&self, body: &ApiChatRequest) -> Result<reqwest::Response, BackendError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        check_status(response, &body.model).await
    }

    /// True if `model` is among the installed models.
    pub async fn has_model(&self, model: &str) -> Result<bool, BackendError> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| m == model || m == &format!("{model}:latest")))
    }

    /// Download a model, reporting each progress line to `on_progress`.
    pub async fn pull_model<F>(&self, model: &str, mut on_progress: F) -> Result<(), BackendError>
    where
        F: FnMut(&PullProgress) + Send,
    {
        let url = format!("{}/api/pull", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "model": model, "stream": true }))
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let response = check_status(response, model).await?;

        let mut lines = LineBuffer::default();
        let mut byte_stream = response.bytes_stream();
        while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(|e| BackendError::StreamInterrupted(e.to_string()))?;
            for line in lines.push(&bytes) {
                handle_pull_line(&line, &mut on_progress)?;
            }
        }
        if let Some(line) = lines.finish() {
            handle_pull_line(&line, &mut on_progress)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, BackendError> {
        let body = Self::chat_body(&request, false);
        debug!(model = %body.model, messages = body.messages.len(), "Sending chat request");

        let response = self.post_chat(&body).await?;
        let api: ApiChatResponse = response
            .json()
            .await
            .map_err(|e| {
                BackendError::MalformedResponse(format!("Failed to parse response: {e}"))
            })?;

        let usage = api.usage();
        if let Some(error) = api.error {
            return Err(BackendError::ApiError {
                status_code: 200,
                message: error,
            });
        }

        let api_message = api
            .message
            .ok_or_else(|| BackendError::MalformedResponse("No message in response".into()))?;

        let reasoning = api_message.thinking.filter(|t| !t.is_empty());
        let mut message = Message::assistant(api_message.content);
        message.tool_calls = api_message
            .tool_calls
            .into_iter()
            .map(ApiToolCall::into_request)
            .collect();

        Ok(GenerationResponse {
            message,
            reasoning,
            usage,
            model: if api.model.is_empty() { request.model } else { api.model },
        })
    }

    async fn stream(&self, request: GenerationRequest) -> Result<FragmentReceiver, BackendError> {
        let body = Self::chat_body(&request, true);
        debug!(
            model = %body.model,
            messages = body.messages.len(),
            "Sending streaming chat request"
        );

        let response = self.post_chat(&body).await?;
        let (tx, rx) = mpsc::channel(64);

        // Spawn task to read the NDJSON byte stream and forward fragments
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(BackendError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    match fragment_from_line(&line) {
                        Ok(Some(fragment)) => {
                            let done = fragment.done;
                            if tx.send(Ok(fragment)).await.is_err() {
                                return; // receiver dropped
                            }
                            if done {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }

            if let Some(line) = lines.finish() {
                match fragment_from_line(&line) {
                    Ok(Some(fragment)) if fragment.done => {
                        let _ = tx.send(Ok(fragment)).await;
                        return;
                    }
                    Ok(Some(fragment)) => {
                        let _ = tx.send(Ok(fragment)).await;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            // Stream ended without a done marker
            trace!("Chat stream closed without done=true");
            let _ = tx.send(Ok(Fragment::done())).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let response = check_status(response, "").await?;

        let tags: ApiTagsResponse = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Map HTTP error statuses onto [`BackendError`].
async fn check_status(
    response: reqwest::Response,
    model: &str,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"].as_str().map(String::from))
        .unwrap_or(body);

    if status == 404 && !model.is_empty() {
        return Err(BackendError::ModelNotFound(model.to_string()));
    }

    warn!(status, body = %message, "Backend returned error");
    Err(BackendError::ApiError {
        status_code: status,
        message,
    })
}

/// Parse one NDJSON line of a chat stream.
fn fragment_from_line(line: &str) -> Result<Option<Fragment>, BackendError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let chunk: ApiChatResponse = serde_json::from_str(line)
        .map_err(|e| BackendError::MalformedResponse(format!("Bad stream line: {e}")))?;

    let usage = chunk.usage();
    if let Some(error) = chunk.error {
        return Err(BackendError::StreamInterrupted(error));
    }

    let (reasoning, content, tool_calls) = match chunk.message {
        Some(m) => (
            m.thinking.filter(|t| !t.is_empty()),
            Some(m.content).filter(|c| !c.is_empty()),
            m.tool_calls.into_iter().map(ApiToolCall::into_request).collect(),
        ),
        None => (None, None, Vec::new()),
    };

    Ok(Some(Fragment {
        reasoning,
        content,
        tool_calls,
        done: chunk.done,
        usage,
    }))
}

fn handle_pull_line<F>(line: &str, on_progress: &mut F) -> Result<(), BackendError>
where
    F: FnMut(&PullProgress),
{
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }
    let progress: PullProgress = serde_json::from_str(line)
        .map_err(|e| BackendError::MalformedResponse(format!("Bad pull progress line: {e}")))?;
    if let Some(error) = progress.error {
        return Err(BackendError::ApiError {
            status_code: 200,
            message: error,
        });
    }
    on_progress(&progress);
    Ok(())
}

/// Splits a byte stream into complete lines without breaking UTF-8.
#[derive(Default)]
struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }
        lines
    }

    fn finish(self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buffer).trim().to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

/// One line of `/api/pull` progress.
#[derive(Debug, Clone, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

impl PullProgress {
    /// Download percentage for layer lines, when known.
    pub fn percent(&self) -> Option<u8> {
        match (self.completed, self.total) {
            (Some(done), Some(total)) if total > 0 => {
                Some(((done as f64 / total as f64) * 100.0).round().min(100.0) as u8)
            }
            _ => None,
        }
    }
}

// --- Ollama API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiToolDefinition>,
    stream: bool,
    think: bool,
    options: ApiOptions,
}

#[derive(Debug, Serialize)]
struct ApiOptions {
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    function: ApiFunction,
}

impl ApiToolCall {
    fn into_request(self) -> ToolCallRequest {
        ToolCallRequest {
            name: self.function.name,
            arguments: normalize_arguments(self.function.arguments),
        }
    }
}

/// Some models send arguments as a JSON-encoded string instead of an object.
fn normalize_arguments(arguments: serde_json::Value) -> serde_json::Value {
    match arguments {
        serde_json::Value::String(s) => {
            serde_json::from_str(&s).unwrap_or(serde_json::Value::String(s))
        }
        other => other,
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    message: Option<ApiMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

impl ApiChatResponse {
    fn usage(&self) -> Option<Usage> {
        match (self.prompt_eval_count, self.eval_count) {
            (Some(prompt), Some(completion)) => Some(Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiTagsResponse {
    #[serde(default)]
    models: Vec<ApiModel>,
}

#[derive(Debug, Deserialize)]
struct ApiModel {
    name: String,
}
