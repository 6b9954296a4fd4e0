//! Result types for model turns and multi-step runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A request from the model to invoke a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Provider-assigned call id, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name.
    pub name: String,
    /// Raw JSON arguments.
    pub input: serde_json::Value,
}

impl ToolCall {
    /// Create a tool call.
    pub fn new(id: Option<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id,
            name: name.into(),
            input,
        }
    }
}

/// The outcome of executing one tool call.
///
/// Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolExecution {
    /// Call id this execution answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name.
    pub name: String,
    /// Successful output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolExecution {
    /// A successful execution.
    pub fn ok(call: &ToolCall, result: serde_json::Value) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            result: Some(result),
            error: None,
        }
    }

    /// A failed execution.
    pub fn failed(call: &ToolCall, error: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            result: None,
            error: Some(error.into()),
        }
    }

    /// Whether the execution succeeded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// One model turn plus the tool executions that followed it.
///
/// `tool_results` pairs with `tool_calls` by index and id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Text produced by the model in this turn.
    pub text: String,
    /// Tool calls the model requested.
    pub tool_calls: Vec<ToolCall>,
    /// Executions answering `tool_calls`, in the same order.
    pub tool_results: Vec<ToolExecution>,
    /// 1-based step number.
    pub step_number: usize,
    /// When the step completed.
    pub timestamp: DateTime<Utc>,
}

impl Step {
    /// Whether the model requested any tools in this step.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Build a usage record, deriving the total when the provider did not
    /// report one authoritatively.
    pub fn new(input_tokens: u32, output_tokens: u32, total_tokens: Option<u32>) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: total_tokens.unwrap_or(input_tokens + output_tokens),
        }
    }

    /// Accumulate another usage record into this one.
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Aggregated result of a text generation (single- or multi-step).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TextResult {
    /// Final text; equals the text of the last step when steps exist.
    pub text: String,
    /// Auditable step history. Empty on single-shot fast paths.
    pub steps: Vec<Step>,
    /// Accumulated usage.
    pub usage: Usage,
    /// Tool calls the adapter extracted from the final model turn.
    ///
    /// This is the canonical extraction path the runner consults; `raw` is
    /// kept for callers but never re-parsed by the loop.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Raw provider payload of the final turn, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

/// Result of a structured-object generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectResult {
    /// Parsed object.
    pub object: serde_json::Value,
    /// Usage of the underlying generation.
    pub usage: Usage,
    /// Raw provider payload, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}
