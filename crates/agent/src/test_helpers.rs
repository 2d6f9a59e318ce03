//! Shared test helpers: scripted backends.

use async_trait::async_trait;
use colloquy_core::backend::{
    Backend, Fragment, FragmentReceiver, GenerationRequest, GenerationResponse, Usage,
};
use colloquy_core::error::BackendError;
use colloquy_core::message::{Message, ToolCallRequest};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// A mock backend that returns a sequence of scripted responses.
///
/// Each call to `generate` returns the next response in the queue and
/// records the request it was given.
/// Panics if more calls are made than responses provided.
pub struct SequentialMockBackend {
    responses: Mutex<Vec<GenerationResponse>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl SequentialMockBackend {
    pub fn new(responses: Vec<GenerationResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a backend that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a backend that first returns tool calls, then a final answer.
    pub fn tool_then_answer(
        tool_calls: Vec<ToolCallRequest>,
        preamble: &str,
        answer: &str,
    ) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls, preamble),
            make_text_response(answer),
        ])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for SequentialMockBackend {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, BackendError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let count = requests.len();

        if count >= responses.len() {
            panic!(
                "SequentialMockBackend: no more responses (call #{}, have {})",
                count,
                responses.len()
            );
        }

        requests.push(request);
        Ok(responses[count].clone())
    }
}

/// A backend whose `stream` replays scripted fragment sequences, one
/// sequence per call.
pub struct ScriptedStreamBackend {
    scripts: Mutex<Vec<Vec<Result<Fragment, BackendError>>>>,
}

impl ScriptedStreamBackend {
    pub fn new(mut scripts: Vec<Vec<Result<Fragment, BackendError>>>) -> Self {
        scripts.reverse();
        Self {
            scripts: Mutex::new(scripts),
        }
    }
}

#[async_trait]
impl Backend for ScriptedStreamBackend {
    fn name(&self) -> &str {
        "scripted_stream"
    }

    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<GenerationResponse, BackendError> {
        Err(BackendError::Unavailable("scripted backend only streams".into()))
    }

    async fn stream(&self, _request: GenerationRequest) -> Result<FragmentReceiver, BackendError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop()
            .expect("ScriptedStreamBackend: no more scripts");

        let (tx, rx) = mpsc::channel(script.len().max(1));
        for fragment in script {
            tx.send(fragment).await.unwrap();
        }
        Ok(rx)
    }
}

/// A backend that always fails to connect.
pub struct FailingBackend;

#[async_trait]
impl Backend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<GenerationResponse, BackendError> {
        Err(BackendError::Unavailable("connection refused".into()))
    }

    async fn stream(&self, _request: GenerationRequest) -> Result<FragmentReceiver, BackendError> {
        Err(BackendError::Unavailable("connection refused".into()))
    }
}

/// A backend that answers only after `delay`.
pub struct SlowBackend {
    pub delay: Duration,
}

#[async_trait]
impl Backend for SlowBackend {
    fn name(&self) -> &str {
        "slow"
    }

    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<GenerationResponse, BackendError> {
        tokio::time::sleep(self.delay).await;
        Ok(make_text_response("finally"))
    }
}

/// A streaming backend that sends `opening` and then goes silent with the
/// stream still open.
pub struct StalledStreamBackend {
    opening: Vec<Fragment>,
    held: Mutex<Vec<mpsc::Sender<Result<Fragment, BackendError>>>>,
}

impl StalledStreamBackend {
    pub fn new(opening: Vec<Fragment>) -> Self {
        Self {
            opening,
            held: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Backend for StalledStreamBackend {
    fn name(&self) -> &str {
        "stalled_stream"
    }

    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<GenerationResponse, BackendError> {
        Err(BackendError::Unavailable("stalled backend only streams".into()))
    }

    async fn stream(&self, _request: GenerationRequest) -> Result<FragmentReceiver, BackendError> {
        let (tx, rx) = mpsc::channel(self.opening.len().max(1));
        for fragment in &self.opening {
            tx.send(Ok(fragment.clone())).await.unwrap();
        }
        self.held.lock().unwrap().push(tx);
        Ok(rx)
    }
}

fn mock_usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> GenerationResponse {
    GenerationResponse {
        message: Message::assistant(text),
        reasoning: None,
        usage: mock_usage(),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional accompanying content.
pub fn make_tool_call_response(
    tool_calls: Vec<ToolCallRequest>,
    content: &str,
) -> GenerationResponse {
    let mut message = Message::assistant_tool_calls(tool_calls);
    message.content = content.to_string();
    GenerationResponse {
        message,
        reasoning: None,
        usage: mock_usage(),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest::new(name, args)
}
