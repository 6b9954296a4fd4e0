//! Chat message types

use serde::{Deserialize, Serialize};

use super::content::Part;

/// Message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in a conversation.
///
/// Parts are order-significant. `name` identifies the tool a tool-role
/// message reports for, and may name a participant on other roles.
///
/// # Examples
///
/// ```rust
/// use laksa::types::{ChatMessage, MediaSource, Part};
///
/// // Simple text message
/// let msg = ChatMessage::user("Hello!");
///
/// // Message with a file attachment (e.g. PDF)
/// let msg = ChatMessage::user("Please summarize this document").with_part(Part::file(
///     MediaSource::url("https://example.com/doc.pdf"),
///     Some("doc.pdf".to_string()),
/// ));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Role
    pub role: MessageRole,
    /// Ordered multimodal content
    pub parts: Vec<Part>,
    /// Optional participant / tool name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    /// Creates a message with the given role and a single text part.
    pub fn new_text(role: MessageRole, text: impl Into<String>) -> Self {
        let text = text.into();
        let parts = if text.is_empty() {
            Vec::new()
        } else {
            vec![Part::text(text)]
        };
        Self {
            role,
            parts,
            name: None,
        }
    }

    /// Creates a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new_text(MessageRole::User, text)
    }

    /// Creates a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::new_text(MessageRole::System, text)
    }

    /// Creates an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new_text(MessageRole::Assistant, text)
    }

    /// Creates a tool-role message reporting a result for `tool_name`.
    ///
    /// The body is carried as a single text part (the runner serializes
    /// structured results to JSON text before appending them).
    pub fn tool(tool_name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            parts: vec![Part::text(body)],
            name: Some(tool_name.into()),
        }
    }

    /// Appends a content part.
    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Sets the participant name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// Whether the message has no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}
