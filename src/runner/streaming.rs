//! Streaming coordinator
//!
//! Multi-step variant of the runner that surfaces a live event stream.
//! One background worker drives provider streams step by step, runs tools
//! between steps, and multiplexes everything into a single ordered channel.
//!
//! Ordering guarantees per run: the coordinator's `Start` is the first
//! event; within a step the provider's events are forwarded in arrival
//! order; `ToolResult`s follow the step's forwarded events in call order;
//! `FinishStep` closes its step; exactly one `Finish` or `Error` terminates
//! the stream and nothing follows it.

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::{MAX_STEP_LIMIT, Runner, append_step_messages};
use crate::error::AiError;
use crate::provider::Provider;
use crate::stream::{StreamEvent, TextStream};
use crate::types::{ChatRequest, Step, Usage};

/// Capacity of the downstream event channel. A slow consumer blocks the
/// worker once this many events are buffered; `close()` releases the block.
const EVENT_CHANNEL_CAPACITY: usize = 100;

impl<P: Provider + 'static> Runner<P> {
    /// Execute a request as a live event stream.
    ///
    /// With no tools or no stop condition this delegates to the provider's
    /// own stream. Otherwise the returned stream is fed by a background
    /// worker; closing it cancels the worker and everything in flight.
    pub async fn stream_execute_request(
        &self,
        cancel: CancellationToken,
        request: ChatRequest,
    ) -> Result<TextStream, AiError> {
        if request.tools.is_empty() || request.stop_when.is_none() {
            return self.provider.stream_text(cancel, request).await;
        }

        let stream_cancel = cancel.child_token();
        let (tx, rx) = mpsc::channel::<StreamEvent>(EVENT_CHANNEL_CAPACITY);

        let worker = tokio::spawn(run_stream_loop(
            self.clone(),
            stream_cancel.clone(),
            request,
            tx,
        ));

        Ok(TextStream::with_worker(
            Box::pin(ReceiverStream::new(rx)),
            stream_cancel,
            worker,
        ))
    }
}

/// Send one event downstream; returns false when the consumer is gone or
/// the stream was cancelled.
async fn send_event(
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    event: StreamEvent,
) -> bool {
    tokio::select! {
        sent = tx.send(event) => sent.is_ok(),
        _ = cancel.cancelled() => false,
    }
}

async fn run_stream_loop<P: Provider + 'static>(
    runner: Runner<P>,
    cancel: CancellationToken,
    request: ChatRequest,
    tx: mpsc::Sender<StreamEvent>,
) {
    let stop_when = request
        .stop_when
        .clone()
        .expect("streaming loop requires a stop condition");
    let mut messages = request.messages.clone();
    let mut usage = Usage::default();

    if !send_event(&tx, &cancel, StreamEvent::start()).await {
        return;
    }

    for step_number in 1.. {
        if cancel.is_cancelled() {
            let _ = tx.try_send(StreamEvent::error(&AiError::canceled()));
            return;
        }

        let mut turn = request.clone();
        turn.messages = messages.clone();
        turn.stop_when = None;
        turn.stream = true;

        let mut provider_stream = match runner
            .provider()
            .stream_text(cancel.child_token(), turn)
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                let err = AiError::wrap(format!("step {step_number}"), err);
                let _ = send_event(&tx, &cancel, StreamEvent::error(&err)).await;
                return;
            }
        };

        let mut step_text = String::new();
        let mut tool_calls = Vec::new();
        let mut provider_failed = false;

        while let Some(event) = provider_stream.next().await {
            match &event {
                StreamEvent::Start { .. } => {
                    // The coordinator already emitted the leading Start;
                    // re-forwarding step 1's would duplicate it.
                    if step_number == 1 {
                        continue;
                    }
                }
                StreamEvent::TextDelta { text_delta, .. } => step_text.push_str(text_delta),
                StreamEvent::ToolCall { call, .. } => tool_calls.push(call.clone()),
                StreamEvent::Finish {
                    usage: turn_usage, ..
                } => {
                    // Per-turn Finish frames carry usage; the coordinator
                    // emits the run's single terminal Finish itself.
                    if let Some(u) = turn_usage {
                        usage.add(u);
                    }
                    continue;
                }
                StreamEvent::Error { .. } => provider_failed = true,
                _ => {}
            }
            if !send_event(&tx, &cancel, event).await {
                provider_stream.close().await;
                return;
            }
            if provider_failed {
                provider_stream.close().await;
                return;
            }
        }
        provider_stream.close().await;

        let mut step = Step {
            text: step_text,
            tool_calls,
            tool_results: Vec::new(),
            step_number,
            timestamp: Utc::now(),
        };

        if step.has_tool_calls() {
            let results = match runner
                .executor()
                .execute(
                    &cancel,
                    &step.tool_calls,
                    &request.tools,
                    &messages,
                    step_number,
                )
                .await
            {
                Ok(results) => results,
                Err(err) => {
                    let _ = send_event(&tx, &cancel, StreamEvent::error(&err)).await;
                    return;
                }
            };
            for execution in &results {
                if !send_event(&tx, &cancel, StreamEvent::tool_result(execution.clone())).await {
                    return;
                }
            }
            step.tool_results = results;
            append_step_messages(&mut messages, &step);
        }

        if !send_event(&tx, &cancel, StreamEvent::finish_step(step_number)).await {
            return;
        }

        if stop_when.should_stop(step_number, &step) || !step.has_tool_calls() {
            break;
        }
        if step_number > MAX_STEP_LIMIT {
            let err = AiError::internal(format!(
                "maximum step limit ({MAX_STEP_LIMIT}) exceeded"
            ));
            let _ = send_event(&tx, &cancel, StreamEvent::error(&err)).await;
            return;
        }
    }

    let _ = send_event(&tx, &cancel, StreamEvent::finish(Some(usage))).await;
}
