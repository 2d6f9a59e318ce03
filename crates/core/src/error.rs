//! Error types for the Colloquy domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] wraps them.
//!
//! Propagation policy: anything raised inside a tool call is contained and
//! fed back to the model as data. Anything raised by the transport aborts
//! the current turn and reaches the caller.

use thiserror::Error;

/// The top-level error type for all Colloquy operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Conversation context errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Orchestration ---
    #[error("Tool loop exceeded {max_iterations} backend calls without a final answer")]
    ToolLoopExceeded { max_iterations: u32 },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the turn was aborted by the transport layer.
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

// --- Bounded context errors ---

/// Failures talking to the text-generation backend. All of them are fatal
/// to the current turn and are never retried automatically.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Model not found: {0}")]
    ModelNotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("Conversation already has a system message")]
    DuplicateSystemMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool already registered: {0}")]
    DuplicateToolName(String),

    #[error("{reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("{reason}")]
    InvalidArgument { tool_name: String, reason: String },
}

impl ToolError {
    pub fn execution_failed(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }
}
