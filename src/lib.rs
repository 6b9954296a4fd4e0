//! # Laksa
//!
//! A multi-step AI agent runtime for Rust: a provider-agnostic orchestrator
//! that interleaves model calls with bounded-parallel tool execution and
//! surfaces either an aggregated result or a live event stream.
//!
//! The crate is organized leaf-first:
//!
//! - [`error`] — the stable error taxonomy every failure is normalized into
//! - [`types`] — messages, multimodal parts, requests, steps, and results
//! - [`stop`] — composable stop conditions for multi-step runs
//! - [`tool`] — the tool contract, typed tool wrappers, and the registry
//! - [`provider`] — the four-operation provider interface
//! - [`runner`] — the multi-step runner and the streaming coordinator
//! - [`providers::gemini`] — the reference HTTP+SSE provider adapter
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use laksa::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), AiError> {
//! let provider = GeminiProvider::new(GeminiConfig::new("api-key"))?;
//! let runner = Runner::new(provider);
//!
//! let request = ChatRequest::new(vec![ChatMessage::user("What's the weather in Tokyo?")])
//!     .with_stop_when(no_more_tools());
//!
//! let result = runner
//!     .execute_request(CancellationToken::new(), request)
//!     .await?;
//! println!("{}", result.text);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod metrics;
pub mod provider;
pub mod providers;
pub mod retry;
pub mod runner;
pub mod stop;
pub mod stream;
pub mod tool;
pub mod types;
pub mod utils;

pub use error::{AiError, ErrorCode};
pub use provider::Provider;
pub use runner::{Runner, RunnerOptions};
pub use stream::{ObjectStream, StreamEvent, TextStream};
pub use types::{ChatMessage, ChatRequest, TextResult};

/// Commonly used items, importable in one line.
pub mod prelude {
    pub use crate::error::{AiError, ErrorCode};
    pub use crate::metrics::{MetricsCollector, NoopMetrics};
    pub use crate::provider::Provider;
    pub use crate::providers::gemini::{GeminiConfig, GeminiProvider};
    pub use crate::runner::{Runner, RunnerOptions};
    pub use crate::stop::{any_of, max_steps, no_more_tools, until_tool_seen};
    pub use crate::stream::{ObjectStream, StreamEvent, TextStream};
    pub use crate::tool::{ExecutionMeta, FunctionTool, ToolHandle, ToolOptions, ToolRegistry};
    pub use crate::types::{
        ChatMessage, ChatRequest, MediaSource, MessageRole, Part, Step, TextResult, ToolCall,
        ToolChoice, ToolExecution, Usage,
    };
}
