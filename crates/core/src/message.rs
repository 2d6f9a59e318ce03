//! Message and conversation context domain types.
//!
//! These are the core value objects that flow through the entire system:
//! the operator types a line → it becomes a user [`Message`] → the context is
//! sent to the backend → replies and tool results are appended in order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ContextError;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The human operator
    User,
    /// The backend model
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request from the backend to run a named local function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON value
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// For tool results, the tool that produced this content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with the given role and text.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// An assistant message that only carries tool-call requests.
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, "")
        }
    }

    /// Create a tool result message.
    pub fn tool_result(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The ordered, append-only message log of one session.
///
/// Invariant: a system message, if present, sits at index 0 and there is at
/// most one. Insertion order is the order sent to the backend on every call.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationContext {
    id: ConversationId,
    messages: Vec<Message>,
}

impl ConversationContext {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
        }
    }

    /// Create a context seeded with a system message.
    pub fn with_system(prompt: impl Into<String>) -> Self {
        let mut ctx = Self::new();
        ctx.messages.push(Message::system(prompt));
        ctx
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    /// Append a plain text message.
    ///
    /// System messages go to index 0; a second one is rejected and the
    /// context is left untouched.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> Result<(), ContextError> {
        self.append_message(Message::new(role, content))
    }

    /// Append a prebuilt message, with the same placement rules as [`append`](Self::append).
    pub fn append_message(&mut self, message: Message) -> Result<(), ContextError> {
        if message.role == Role::System {
            if self.has_system_message() {
                return Err(ContextError::DuplicateSystemMessage);
            }
            self.messages.insert(0, message);
        } else {
            self.messages.push(message);
        }
        Ok(())
    }

    /// An independent copy of the current sequence.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Drop every message, including the system prompt.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Read-only view of the messages.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_system_message(&self) -> bool {
        self.messages
            .first()
            .is_some_and(|m| m.role == Role::System)
    }
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert!(msg.tool_calls.is_empty());
        assert!(msg.tool_name.is_none());
    }

    #[test]
    fn append_keeps_insertion_order() {
        let mut ctx = ConversationContext::new();
        ctx.append(Role::User, "Hello").unwrap();
        ctx.append(Role::Assistant, "Hi there!").unwrap();

        let roles: Vec<Role> = ctx.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(ctx.messages()[1].content, "Hi there!");
    }

    #[test]
    fn system_message_goes_to_front() {
        let mut ctx = ConversationContext::new();
        ctx.append(Role::User, "Hello").unwrap();
        ctx.append(Role::System, "Be terse").unwrap();

        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.messages()[0].role, Role::System);
        assert_eq!(ctx.messages()[0].content, "Be terse");
        assert!(ctx.has_system_message());
    }

    #[test]
    fn second_system_message_is_rejected() {
        let mut ctx = ConversationContext::with_system("Be terse");
        ctx.append(Role::User, "2+2").unwrap();

        let err = ctx.append(Role::System, "Be verbose").unwrap_err();
        assert_eq!(err, ContextError::DuplicateSystemMessage);
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.messages()[0].content, "Be terse");
    }

    #[test]
    fn snapshot_is_independent() {
        let mut ctx = ConversationContext::new();
        ctx.append(Role::User, "Hello").unwrap();

        let mut copy = ctx.snapshot();
        copy.push(Message::user("Modified"));
        copy[0].content = "changed".into();

        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.messages()[0].content, "Hello");
        assert_eq!(copy.len(), 2);
    }

    #[test]
    fn snapshot_of_empty_context() {
        assert!(ConversationContext::new().snapshot().is_empty());
    }

    #[test]
    fn clear_removes_everything() {
        let mut ctx = ConversationContext::with_system("sys");
        ctx.append(Role::User, "Hello").unwrap();
        ctx.clear();

        assert!(ctx.is_empty());
        assert!(!ctx.has_system_message());
        // A fresh system prompt is accepted after a reset.
        ctx.append(Role::System, "again").unwrap();
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn tool_messages_carry_tool_name() {
        let msg = Message::tool_result("addNumbers", "4");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_name.as_deref(), Some("addNumbers"));

        let call = Message::assistant_tool_calls(vec![ToolCallRequest::new(
            "addNumbers",
            serde_json::json!({"array": [2, 2]}),
        )]);
        assert!(call.has_tool_calls());
        assert!(call.content.is_empty());
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::system("x")).unwrap();
        assert!(json.contains(r#""role":"system""#));
        assert!(!json.contains("tool_calls"));
    }
}
