//! Streaming event types and stream handles
//!
//! A [`TextStream`] is a lazy, finite, non-restartable sequence of
//! [`StreamEvent`]s with an idempotent [`TextStream::close`]. The events
//! form a total order: one leading `Start`, exactly one terminal `Finish`
//! or `Error`, and nothing after the terminator.

use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::AiError;
use crate::types::{ToolCall, ToolExecution, Usage};
use crate::utils::json_repair::parse_with_repair;

/// A provider citation attached to generated text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// Start byte offset into the generated text.
    pub start_index: u32,
    /// End byte offset (exclusive).
    pub end_index: u32,
    /// Source URI.
    pub uri: String,
    /// Source title, when the provider reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A safety signal from the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetySignal {
    /// Category the signal concerns (`"prompt"` for prompt-level feedback).
    pub category: String,
    /// Action the provider took, e.g. `"block"`.
    pub action: String,
    /// Probability score, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Free-form note (e.g. the provider's block reason).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A discriminated streaming event.
///
/// Every variant carries only the fields meaningful for its type plus the
/// emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// Stream (or provider turn) opened.
    Start { timestamp: DateTime<Utc> },
    /// Incremental text.
    TextDelta {
        text_delta: String,
        timestamp: DateTime<Utc>,
    },
    /// Incremental audio.
    AudioDelta {
        #[serde(with = "audio_bytes")]
        audio_delta: Vec<u8>,
        timestamp: DateTime<Utc>,
    },
    /// The model requested a tool invocation.
    ToolCall {
        call: ToolCall,
        timestamp: DateTime<Utc>,
    },
    /// A tool invocation completed.
    ToolResult {
        execution: ToolExecution,
        timestamp: DateTime<Utc>,
    },
    /// Citations for text emitted so far.
    Citations {
        citations: Vec<Citation>,
        timestamp: DateTime<Utc>,
    },
    /// A safety signal.
    Safety {
        safety: SafetySignal,
        timestamp: DateTime<Utc>,
    },
    /// A step of a multi-step run completed.
    FinishStep {
        step_number: usize,
        timestamp: DateTime<Utc>,
    },
    /// Terminal success.
    Finish {
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        timestamp: DateTime<Utc>,
    },
    /// Terminal failure.
    Error {
        error: String,
        code: crate::error::ErrorCode,
        timestamp: DateTime<Utc>,
    },
    /// Provider payload passed through unmapped.
    Raw {
        raw: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
}

mod audio_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(de)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

impl StreamEvent {
    /// A `Start` stamped now.
    pub fn start() -> Self {
        Self::Start {
            timestamp: Utc::now(),
        }
    }

    /// A `TextDelta` stamped now.
    pub fn text_delta(delta: impl Into<String>) -> Self {
        Self::TextDelta {
            text_delta: delta.into(),
            timestamp: Utc::now(),
        }
    }

    /// A `ToolCall` stamped now.
    pub fn tool_call(call: ToolCall) -> Self {
        Self::ToolCall {
            call,
            timestamp: Utc::now(),
        }
    }

    /// A `ToolResult` stamped now.
    pub fn tool_result(execution: ToolExecution) -> Self {
        Self::ToolResult {
            execution,
            timestamp: Utc::now(),
        }
    }

    /// A `Citations` stamped now.
    pub fn citations(citations: Vec<Citation>) -> Self {
        Self::Citations {
            citations,
            timestamp: Utc::now(),
        }
    }

    /// A `Safety` stamped now.
    pub fn safety(safety: SafetySignal) -> Self {
        Self::Safety {
            safety,
            timestamp: Utc::now(),
        }
    }

    /// A `FinishStep` stamped now.
    pub fn finish_step(step_number: usize) -> Self {
        Self::FinishStep {
            step_number,
            timestamp: Utc::now(),
        }
    }

    /// A `Finish` stamped now.
    pub fn finish(usage: Option<Usage>) -> Self {
        Self::Finish {
            usage,
            timestamp: Utc::now(),
        }
    }

    /// An `Error` stamped now.
    pub fn error(err: &AiError) -> Self {
        Self::Error {
            error: err.message.clone(),
            code: err.code,
            timestamp: Utc::now(),
        }
    }

    /// Whether this event terminates its stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error { .. })
    }
}

type BoxedEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// A finite, single-consumer stream of [`StreamEvent`]s.
///
/// Dropping the stream releases the underlying I/O; [`TextStream::close`]
/// additionally waits for the producing worker (when one exists) and may be
/// called more than once.
pub struct TextStream {
    inner: BoxedEventStream,
    cancel: CancellationToken,
    worker: Option<tokio::task::JoinHandle<()>>,
}

impl TextStream {
    /// Wrap an event stream with its cancellation token.
    pub fn new(inner: BoxedEventStream, cancel: CancellationToken) -> Self {
        Self {
            inner,
            cancel,
            worker: None,
        }
    }

    /// Wrap an event stream produced by a background worker.
    pub fn with_worker(
        inner: BoxedEventStream,
        cancel: CancellationToken,
        worker: tokio::task::JoinHandle<()>,
    ) -> Self {
        Self {
            inner,
            cancel,
            worker: Some(worker),
        }
    }

    /// The token that cancels this stream.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Next event, or `None` once the stream is exhausted.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        StreamExt::next(&mut self.inner).await
    }

    /// Cancel the stream and wait for its worker to finish. Idempotent.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    /// Drain all remaining events into a vector.
    pub async fn collect_events(mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        while let Some(ev) = self.next().await {
            out.push(ev);
        }
        out
    }
}

impl Drop for TextStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Stream for TextStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for TextStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextStream")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("has_worker", &self.worker.is_some())
            .finish()
    }
}

/// A streaming structured-object generation.
///
/// Events can be consumed incrementally; [`ObjectStream::finish`] drains the
/// remainder and parses the accumulated text as JSON, applying the repair
/// pass before surfacing a parse failure.
pub struct ObjectStream {
    stream: TextStream,
    buffer: String,
    usage: Option<Usage>,
    failure: Option<AiError>,
}

impl ObjectStream {
    /// Wrap a text stream carrying a JSON object.
    pub fn new(stream: TextStream) -> Self {
        Self {
            stream,
            buffer: String::new(),
            usage: None,
            failure: None,
        }
    }

    /// Next event; text deltas are also accumulated for [`Self::finish`].
    pub async fn next(&mut self) -> Option<StreamEvent> {
        let event = self.stream.next().await?;
        self.observe(&event);
        Some(event)
    }

    fn observe(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::TextDelta { text_delta, .. } => self.buffer.push_str(text_delta),
            StreamEvent::Finish { usage, .. } => self.usage = *usage,
            StreamEvent::Error { error, code, .. } => {
                self.failure = Some(AiError::new(*code, error.clone()));
            }
            _ => {}
        }
    }

    /// Block until the stream completes, then parse the accumulated text.
    pub async fn finish(mut self) -> Result<ObjectOutcome, AiError> {
        while let Some(event) = self.stream.next().await {
            self.observe(&event);
        }
        if let Some(err) = self.failure {
            return Err(err);
        }
        let object = parse_with_repair(&self.buffer).map_err(|e| {
            AiError::invalid_request(format!("structured output is not valid JSON: {e}"))
        })?;
        Ok(ObjectOutcome {
            object,
            usage: self.usage.unwrap_or_default(),
        })
    }

    /// Cancel the underlying stream. Idempotent.
    pub async fn close(&mut self) {
        self.stream.close().await;
    }
}

/// Final parsed object of an [`ObjectStream`].
#[derive(Debug, Clone)]
pub struct ObjectOutcome {
    pub object: serde_json::Value,
    pub usage: Usage,
}
