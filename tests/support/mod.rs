//! Shared test support: a scriptable in-memory provider.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use laksa::error::AiError;
use laksa::provider::Provider;
use laksa::stream::{ObjectStream, StreamEvent, TextStream};
use laksa::types::{ChatMessage, ChatRequest, ObjectResult, TextResult, ToolCall, Usage};

/// One scripted model turn.
#[derive(Debug, Clone, Default)]
pub struct MockTurn {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// Explicit event script for streaming; when absent a default script of
    /// Start / TextDelta / ToolCall… / Finish is synthesized.
    pub events: Option<Vec<StreamEvent>>,
}

impl MockTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_tool_call(mut self, name: &str, input: serde_json::Value) -> Self {
        let n = self.tool_calls.len();
        self.tool_calls
            .push(ToolCall::new(Some(format!("call-{name}-{n}")), name, input));
        self
    }

    pub fn with_events(mut self, events: Vec<StreamEvent>) -> Self {
        self.events = Some(events);
        self
    }
}

/// Scriptable provider: pops one [`MockTurn`] per call. With `repeat_last`
/// the final turn replays forever (for ceiling tests).
#[derive(Default)]
pub struct MockProvider {
    turns: Mutex<VecDeque<MockTurn>>,
    repeat_last: bool,
    pub calls: AtomicUsize,
    /// Messages of every request seen, in call order.
    pub seen_messages: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockProvider {
    pub fn new(turns: Vec<MockTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            ..Default::default()
        }
    }

    pub fn repeating(turn: MockTurn) -> Self {
        Self {
            turns: Mutex::new(vec![turn].into()),
            repeat_last: true,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_turn(&self, request: &ChatRequest) -> Result<MockTurn, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_messages
            .lock()
            .unwrap()
            .push(request.messages.clone());
        let mut turns = self.turns.lock().unwrap();
        if self.repeat_last && turns.len() == 1 {
            return Ok(turns.front().cloned().unwrap());
        }
        turns
            .pop_front()
            .ok_or_else(|| AiError::internal("mock provider script exhausted"))
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &str {
        "mock"
    }

    async fn generate_text(
        &self,
        _cancel: CancellationToken,
        request: ChatRequest,
    ) -> Result<TextResult, AiError> {
        let turn = self.next_turn(&request)?;
        Ok(TextResult {
            text: turn.text,
            steps: Vec::new(),
            usage: Usage::new(1, 1, None),
            tool_calls: turn.tool_calls,
            raw: None,
        })
    }

    async fn stream_text(
        &self,
        cancel: CancellationToken,
        request: ChatRequest,
    ) -> Result<TextStream, AiError> {
        let turn = self.next_turn(&request)?;
        let events = turn.events.unwrap_or_else(|| {
            let mut events = vec![StreamEvent::start()];
            if !turn.text.is_empty() {
                events.push(StreamEvent::text_delta(turn.text.clone()));
            }
            for call in &turn.tool_calls {
                events.push(StreamEvent::tool_call(call.clone()));
            }
            events.push(StreamEvent::finish(Some(Usage::new(1, 1, None))));
            events
        });
        Ok(TextStream::new(
            Box::pin(futures::stream::iter(events)),
            cancel.child_token(),
        ))
    }

    async fn generate_object(
        &self,
        _cancel: CancellationToken,
        _request: ChatRequest,
        _schema: serde_json::Value,
    ) -> Result<ObjectResult, AiError> {
        Err(AiError::unsupported("mock provider has no object mode"))
    }

    async fn stream_object(
        &self,
        _cancel: CancellationToken,
        _request: ChatRequest,
        _schema: serde_json::Value,
    ) -> Result<ObjectStream, AiError> {
        Err(AiError::unsupported("mock provider has no object mode"))
    }
}

/// Compact label for an event, for order assertions.
pub fn event_label(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Start { .. } => "start".into(),
        StreamEvent::TextDelta { text_delta, .. } => format!("text:{text_delta}"),
        StreamEvent::AudioDelta { .. } => "audio".into(),
        StreamEvent::ToolCall { call, .. } => format!("tool-call:{}", call.name),
        StreamEvent::ToolResult { execution, .. } => format!("tool-result:{}", execution.name),
        StreamEvent::Citations { .. } => "citations".into(),
        StreamEvent::Safety { .. } => "safety".into(),
        StreamEvent::FinishStep { step_number, .. } => format!("finish-step:{step_number}"),
        StreamEvent::Finish { .. } => "finish".into(),
        StreamEvent::Error { .. } => "error".into(),
        StreamEvent::Raw { .. } => "raw".into(),
    }
}
