//! Tool trait: the abstraction over locally callable functions.
//!
//! Tools are what the backend may ask the session to run on its behalf:
//! arithmetic, vector-store search, and anything registered at startup.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use tracing::debug;

use crate::error::ToolError;
use crate::message::Message;

/// A tool declaration sent to the backend so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name (unique key)
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The outcome of one tool invocation, ready to be fed back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_name: String,
    pub outcome: Result<String, ToolError>,
}

impl ToolResult {
    pub fn new(tool_name: impl Into<String>, outcome: Result<String, ToolError>) -> Self {
        Self {
            tool_name: tool_name.into(),
            outcome,
        }
    }

    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// The text placed in the `tool` message: the output, or `Error: <reason>`.
    pub fn text(&self) -> String {
        match &self.outcome {
            Ok(output) => output.clone(),
            Err(e) => format!("Error: {e}"),
        }
    }

    pub fn into_message(self) -> Message {
        let text = self.text();
        Message::tool_result(self.tool_name, text)
    }
}

/// The shared "callable tool" capability.
///
/// Each built-in tool implements this trait and is registered in the
/// [`ToolRegistry`] before the first turn.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "addNumbers").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the backend).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments and return its text output.
    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError>;

    /// Convert this tool into a descriptor for the backend.
    fn to_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

type ToolFn = dyn Fn(serde_json::Value) -> Result<String, ToolError> + Send + Sync;

/// A tool built from a descriptor and a plain synchronous function.
pub struct FnTool {
    descriptor: ToolDescriptor,
    func: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(descriptor: ToolDescriptor, func: F) -> Self
    where
        F: Fn(serde_json::Value) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.descriptor.parameters.clone()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        (self.func)(arguments)
    }
}

/// A registry of available tools, kept in registration order.
///
/// The orchestration loop uses this to:
/// 1. Get the declared tool list to send to the backend
/// 2. Look up and invoke tools when the backend requests them
///
/// No schema validation happens here beyond name lookup; each tool checks
/// its own arguments.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool. Fails if the name is already taken.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ToolError::DuplicateToolName(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Register a plain function under the given descriptor.
    pub fn register_fn<F>(&mut self, descriptor: ToolDescriptor, func: F) -> Result<(), ToolError>
    where
        F: Fn(serde_json::Value) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        self.register(Box::new(FnTool::new(descriptor, func)))
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.index.get(name).map(|&i| self.tools[i].as_ref())
    }

    /// All descriptors, in registration order.
    pub fn describe_all(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.to_descriptor()).collect()
    }

    /// Invoke a tool by name.
    ///
    /// Errors and panics raised by the implementation are converted to
    /// [`ToolError`] here and never unwind past this call.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        debug!(tool = name, "Invoking tool");

        match AssertUnwindSafe(tool.execute(arguments)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool panicked".to_string());
                Err(ToolError::execution_failed(name, reason))
            }
        }
    }

    /// List all registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
