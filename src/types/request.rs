//! Chat request types

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::message::ChatMessage;
use crate::stop::StopCondition;
use crate::tool::ToolHandle;

/// How the model may use the request's tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", content = "tool", rename_all = "lowercase")]
pub enum ToolChoice {
    /// The model decides.
    #[default]
    Auto,
    /// Tools are disabled for this turn.
    None,
    /// The model must call some tool.
    Required,
    /// The model must call the named tool.
    Specific(String),
}

/// Safety category of generated or prompted content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SafetyCategory {
    Harassment,
    Hate,
    Sexual,
    Dangerous,
}

/// Blocking threshold ladder for a safety category.
///
/// `Always` has no direct equivalent on some providers; adapters map it to
/// the strictest threshold they offer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    None,
    Low,
    Medium,
    High,
    Always,
}

/// A per-category blocking threshold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SafetySetting {
    pub category: SafetyCategory,
    pub threshold: SafetyLevel,
}

impl SafetySetting {
    pub const fn new(category: SafetyCategory, threshold: SafetyLevel) -> Self {
        Self {
            category,
            threshold,
        }
    }
}

/// A request to generate text or a structured object.
///
/// `tools` and `stop_when` are runtime capabilities and are never
/// serialized.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    /// Caller-chosen request id for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Idempotency key forwarded to providers that support one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Model override; the adapter default applies when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Output token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Tools available to the model.
    #[serde(skip)]
    pub tools: Vec<Arc<dyn ToolHandle>>,
    /// Tool usage policy.
    #[serde(default)]
    pub tool_choice: ToolChoice,
    /// Termination predicate for multi-step runs. Never serialized.
    #[serde(skip)]
    pub stop_when: Option<Arc<dyn StopCondition>>,
    /// Per-request safety thresholds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety: Option<Vec<SafetySetting>>,
    /// Session identifier for providers with server-side state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Provider-specific options (e.g. `response_schema`).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub provider_options: HashMap<String, serde_json::Value>,
    /// Free-form request metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    /// Whether the caller intends to stream.
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    /// Create a request from messages.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the output token cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Add a tool.
    pub fn with_tool(mut self, tool: Arc<dyn ToolHandle>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Replace the tool set.
    pub fn with_tools(mut self, tools: Vec<Arc<dyn ToolHandle>>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the tool usage policy.
    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }

    /// Set the termination predicate.
    pub fn with_stop_when(mut self, stop: Arc<dyn StopCondition>) -> Self {
        self.stop_when = Some(stop);
        self
    }

    /// Set per-request safety thresholds.
    pub fn with_safety(mut self, safety: Vec<SafetySetting>) -> Self {
        self.safety = Some(safety);
        self
    }

    /// Set a provider-specific option.
    pub fn with_provider_option(
        mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.provider_options.insert(key.into(), value);
        self
    }

    /// Look up a tool handle by name.
    pub fn find_tool(&self, name: &str) -> Option<&Arc<dyn ToolHandle>> {
        self.tools.iter().find(|t| t.name() == name)
    }
}

impl std::fmt::Debug for ChatRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRequest")
            .field("request_id", &self.request_id)
            .field("model", &self.model)
            .field("messages", &self.messages.len())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name().to_string()).collect::<Vec<_>>(),
            )
            .field("tool_choice", &self.tool_choice)
            .field("stop_when", &self.stop_when.is_some())
            .field("stream", &self.stream)
            .finish()
    }
}
