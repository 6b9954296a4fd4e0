//! Provider contract
//!
//! The four-operation interface that decouples the runner and the streaming
//! coordinator from provider wire formats. Every operation takes a
//! cancellation token; adapters must observe it at each suspension point.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::AiError;
use crate::stream::{ObjectStream, TextStream};
use crate::types::{ChatRequest, ObjectResult, TextResult};

/// An LLM provider.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider identifier (e.g. `"gemini"`).
    fn id(&self) -> &str;

    /// One non-streaming model turn.
    async fn generate_text(
        &self,
        cancel: CancellationToken,
        request: ChatRequest,
    ) -> Result<TextResult, AiError>;

    /// One streaming model turn.
    async fn stream_text(
        &self,
        cancel: CancellationToken,
        request: ChatRequest,
    ) -> Result<TextStream, AiError>;

    /// Non-streaming structured-object generation against a JSON Schema.
    async fn generate_object(
        &self,
        cancel: CancellationToken,
        request: ChatRequest,
        schema: serde_json::Value,
    ) -> Result<ObjectResult, AiError>;

    /// Streaming structured-object generation against a JSON Schema.
    async fn stream_object(
        &self,
        cancel: CancellationToken,
        request: ChatRequest,
        schema: serde_json::Value,
    ) -> Result<ObjectStream, AiError>;
}
