//! Provider-agnostic data types
//!
//! Messages, multimodal parts, requests, and result records shared by the
//! runner, the streaming coordinator, and provider adapters.

pub mod content;
pub mod message;
pub mod request;
pub mod response;

pub use content::{ImageDetail, MediaSource, Part};
pub use message::{ChatMessage, MessageRole};
pub use request::{ChatRequest, SafetyCategory, SafetyLevel, SafetySetting, ToolChoice};
pub use response::{ObjectResult, Step, TextResult, ToolCall, ToolExecution, Usage};
