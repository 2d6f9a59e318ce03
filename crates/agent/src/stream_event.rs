//! Turn-level streaming events.
//!
//! `AgentStreamEvent` wraps decoded fragments and tool activity into the
//! events a front end renders while a turn is in progress:
//! - `reasoning_started` / `reasoning`: the model's reasoning channel
//! - `content_started` / `chunk`: partial answer text
//! - `tool_call`: the loop is invoking a tool
//! - `tool_result`: tool execution completed
//! - `done`: the turn is complete
//! - `error`: the turn was aborted

use colloquy_core::backend::Usage;
use serde::{Deserialize, Serialize};

use crate::stream_decoder::DecodedEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    ReasoningStarted,

    /// Reasoning-channel text.
    Reasoning { content: String },

    ContentStarted,

    /// Partial answer text.
    Chunk { content: String },

    /// The loop is calling a tool.
    ToolCall {
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed.
    ToolResult {
        name: String,
        output: String,
        success: bool,
    },

    /// The turn is complete.
    Done {
        conversation_id: String,
        usage: Option<Usage>,
        iterations: u32,
        tool_calls_made: usize,
    },

    /// The turn was aborted.
    Error { message: String },
}

impl AgentStreamEvent {
    /// Event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ReasoningStarted => "reasoning_started",
            Self::Reasoning { .. } => "reasoning",
            Self::ContentStarted => "content_started",
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

impl From<DecodedEvent> for AgentStreamEvent {
    fn from(event: DecodedEvent) -> Self {
        match event {
            DecodedEvent::ReasoningStarted => Self::ReasoningStarted,
            DecodedEvent::Reasoning(content) => Self::Reasoning { content },
            DecodedEvent::ContentStarted => Self::ContentStarted,
            DecodedEvent::Content(content) => Self::Chunk { content },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_chunk() {
        let event = AgentStreamEvent::Chunk {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn event_serialization_markers() {
        let json = serde_json::to_string(&AgentStreamEvent::ReasoningStarted).unwrap();
        assert_eq!(json, r#"{"type":"reasoning_started"}"#);
    }

    #[test]
    fn event_serialization_tool_call() {
        let event = AgentStreamEvent::ToolCall {
            name: "addNumbers".into(),
            input: serde_json::json!({"array": [2, 2]}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""name":"addNumbers""#));
    }

    #[test]
    fn event_serialization_done() {
        let event = AgentStreamEvent::Done {
            conversation_id: "abc".into(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
            iterations: 2,
            tool_calls_made: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""iterations":2"#));
    }

    #[test]
    fn decoded_events_convert() {
        assert_eq!(
            AgentStreamEvent::from(DecodedEvent::Content("x".into())),
            AgentStreamEvent::Chunk { content: "x".into() }
        );
        assert_eq!(
            AgentStreamEvent::from(DecodedEvent::Reasoning("y".into())).event_type(),
            "reasoning"
        );
        assert_eq!(
            AgentStreamEvent::from(DecodedEvent::ContentStarted),
            AgentStreamEvent::ContentStarted
        );
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{
            "type": "tool_result",
            "name": "divideTwoNumbers",
            "output": "Error: Division by zero is not allowed",
            "success": false
        }"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        match event {
            AgentStreamEvent::ToolResult { name, success, .. } => {
                assert_eq!(name, "divideTwoNumbers");
                assert!(!success);
            }
            _ => panic!("Wrong variant"),
        }
    }
}
