//! Arithmetic tools: `addNumbers`, `subtractNumbers`, `multiplyNumbers`
//! and `divideTwoNumbers`.
//!
//! The three list operations share one implementation keyed by
//! [`ListOperation`]; division takes two named operands.

use async_trait::async_trait;
use colloquy_core::error::ToolError;
use colloquy_core::tool::Tool;
use serde_json::Value;

/// The fold applied by a [`ListArithmeticTool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOperation {
    Add,
    Subtract,
    Multiply,
}

impl ListOperation {
    fn tool_name(self) -> &'static str {
        match self {
            Self::Add => "addNumbers",
            Self::Subtract => "subtractNumbers",
            Self::Multiply => "multiplyNumbers",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::Add => "Sum a list of numbers",
            Self::Subtract => "Subtract numbers: the first number minus each of the following ones",
            Self::Multiply => "Multiply numbers together",
        }
    }

    /// Apply the operation. Subtraction starts from the first element.
    pub fn apply(self, numbers: &[f64]) -> f64 {
        match self {
            Self::Add => numbers.iter().sum(),
            Self::Subtract => match numbers.split_first() {
                Some((first, rest)) => rest.iter().fold(*first, |acc, n| acc - n),
                None => 0.0,
            },
            Self::Multiply => numbers.iter().product(),
        }
    }
}

/// `addNumbers` / `subtractNumbers` / `multiplyNumbers` over `{"array": [...]}`.
pub struct ListArithmeticTool {
    op: ListOperation,
}

impl ListArithmeticTool {
    pub fn new(op: ListOperation) -> Self {
        Self { op }
    }

    pub fn add() -> Self {
        Self::new(ListOperation::Add)
    }

    pub fn subtract() -> Self {
        Self::new(ListOperation::Subtract)
    }

    pub fn multiply() -> Self {
        Self::new(ListOperation::Multiply)
    }
}

#[async_trait]
impl Tool for ListArithmeticTool {
    fn name(&self) -> &str {
        self.op.tool_name()
    }

    fn description(&self) -> &str {
        self.op.description()
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "array": {
                    "type": "array",
                    "items": { "type": "number" },
                    "description": "list of numbers"
                }
            },
            "required": ["array"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let numbers = number_list(self.name(), &arguments)?;
        Ok(format_number(self.op.apply(&numbers)))
    }
}

/// `divideTwoNumbers` over `{"a": dividend, "b": divisor}`.
pub struct DivideTool;

#[async_trait]
impl Tool for DivideTool {
    fn name(&self) -> &str {
        "divideTwoNumbers"
    }

    fn description(&self) -> &str {
        "Divide the first number by the second number"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "a": {
                    "type": "number",
                    "description": "The dividend (number to be divided)"
                },
                "b": {
                    "type": "number",
                    "description": "The divisor (number to divide by)"
                }
            },
            "required": ["a", "b"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let a = number_field(self.name(), &arguments, "a")?;
        let b = number_field(self.name(), &arguments, "b")?;

        if b == 0.0 {
            return Err(ToolError::invalid_argument(
                self.name(),
                "Division by zero is not allowed",
            ));
        }
        Ok(format_number(a / b))
    }
}

/// Accept a JSON number or a numeric string (models send both).
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Extract the number list from `{"array": [...]}` or a bare array.
fn number_list(tool: &str, arguments: &Value) -> Result<Vec<f64>, ToolError> {
    let not_a_list = || ToolError::invalid_argument(tool, "Input must be an array of number");

    let items = match arguments {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("array")
            .and_then(Value::as_array)
            .ok_or_else(not_a_list)?,
        _ => return Err(not_a_list()),
    };

    items
        .iter()
        .map(|v| as_number(v).ok_or_else(not_a_list))
        .collect()
}

fn number_field(tool: &str, arguments: &Value, field: &str) -> Result<f64, ToolError> {
    arguments
        .get(field)
        .and_then(as_number)
        .ok_or_else(|| ToolError::invalid_argument(tool, format!("'{field}' must be a number")))
}

/// Format nicely: remove trailing .0 for integers.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
