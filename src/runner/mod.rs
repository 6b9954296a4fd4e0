//! Multi-step runner
//!
//! Drives the ask → tool-calls → tool exec → re-ask loop against a
//! [`Provider`]. [`Runner::execute_request`] aggregates the run into a
//! [`TextResult`]; [`Runner::stream_execute_request`] (see
//! [`streaming`]) surfaces the same loop as a live event stream.

mod executor;
pub mod streaming;

pub use executor::{DEFAULT_MAX_PARALLEL, DEFAULT_TOOL_TIMEOUT, ToolExecutor};

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::AiError;
use crate::metrics::{MetricsCollector, NoopMetrics};
use crate::provider::Provider;
use crate::types::{ChatMessage, ChatRequest, Step, TextResult, ToolExecution, Usage};

/// Hard ceiling on steps per run, applied regardless of the stop condition.
pub const MAX_STEP_LIMIT: usize = 100;

/// Runner configuration.
#[derive(Clone)]
pub struct RunnerOptions {
    /// Concurrent tool executions per step.
    pub max_parallel: usize,
    /// Per-tool deadline; zero disables it.
    pub tool_timeout: Duration,
    /// Best-effort observer.
    pub metrics: Arc<dyn MetricsCollector>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            metrics: Arc::new(NoopMetrics),
        }
    }
}

/// Orchestrates multi-step tool-using conversations against a provider.
pub struct Runner<P> {
    provider: Arc<P>,
    options: RunnerOptions,
    executor: ToolExecutor,
}

impl<P> Clone for Runner<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            options: self.options.clone(),
            executor: self.executor.clone(),
        }
    }
}

impl<P: Provider + 'static> Runner<P> {
    /// Create a runner with default options.
    pub fn new(provider: P) -> Self {
        Self::with_options(provider, RunnerOptions::default())
    }

    /// Create a runner with explicit options.
    pub fn with_options(provider: P, options: RunnerOptions) -> Self {
        let executor = ToolExecutor::new(
            options.max_parallel,
            options.tool_timeout,
            options.metrics.clone(),
        );
        Self {
            provider: Arc::new(provider),
            options,
            executor,
        }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub(crate) fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// Execute a request to completion.
    ///
    /// With no tools or no stop condition this is a single provider call.
    /// Otherwise the runner loops: model turn, bounded-parallel tool
    /// execution, synthetic conversation turns, until the stop condition or
    /// the 100-step ceiling fires.
    pub async fn execute_request(
        &self,
        cancel: CancellationToken,
        request: ChatRequest,
    ) -> Result<TextResult, AiError> {
        let Some(stop_when) = request.stop_when.clone() else {
            return self.provider.generate_text(cancel, request).await;
        };
        if request.tools.is_empty() {
            return self.provider.generate_text(cancel, request).await;
        }

        let run_started = Instant::now();
        let mut messages = request.messages.clone();
        let mut steps: Vec<Step> = Vec::new();
        let mut usage = Usage::default();

        for step_number in 1.. {
            if cancel.is_cancelled() {
                return Err(AiError::canceled());
            }

            let mut turn = request.clone();
            turn.messages = messages.clone();
            turn.stop_when = None;
            turn.stream = false;

            let step_started = Instant::now();
            let result = self
                .provider
                .generate_text(cancel.clone(), turn)
                .await
                .map_err(|e| AiError::wrap(format!("step {step_number}"), e))?;
            usage.add(&result.usage);

            let mut step = Step {
                text: result.text,
                tool_calls: result.tool_calls,
                tool_results: Vec::new(),
                step_number,
                timestamp: Utc::now(),
            };

            if step.has_tool_calls() {
                step.tool_results = self
                    .executor
                    .execute(
                        &cancel,
                        &step.tool_calls,
                        &request.tools,
                        &messages,
                        step_number,
                    )
                    .await?;
                append_step_messages(&mut messages, &step);
            } else if !step.text.is_empty() {
                messages.push(ChatMessage::assistant(step.text.clone()));
            }

            self.options
                .metrics
                .record_step(&step, step_started.elapsed());
            let stop = stop_when.should_stop(step_number, &step);
            let had_tool_calls = step.has_tool_calls();
            steps.push(step);

            if stop {
                break;
            }
            if step_number > MAX_STEP_LIMIT {
                return Err(AiError::internal(format!(
                    "maximum step limit ({MAX_STEP_LIMIT}) exceeded"
                )));
            }
            if !had_tool_calls {
                // The model produced no tool calls; it has chosen to stop.
                break;
            }
        }

        self.options
            .metrics
            .record_total_execution(steps.len(), run_started.elapsed());

        Ok(TextResult {
            text: steps.last().map(|s| s.text.clone()).unwrap_or_default(),
            steps,
            usage,
            tool_calls: Vec::new(),
            raw: None,
        })
    }
}

/// Append the synthetic turns a completed tool step contributes: the
/// assistant text, then one tool-role message per execution in call order.
///
/// Successful results are serialized to JSON text; failures become a plain
/// line naming the tool and the error.
pub(crate) fn append_step_messages(messages: &mut Vec<ChatMessage>, step: &Step) {
    messages.push(ChatMessage::assistant(step.text.clone()));
    for execution in &step.tool_results {
        messages.push(tool_message(execution));
    }
}

fn tool_message(execution: &ToolExecution) -> ChatMessage {
    match (&execution.result, &execution.error) {
        (Some(result), _) => {
            let body = serde_json::to_string(result).unwrap_or_else(|_| result.to_string());
            ChatMessage::tool(execution.name.clone(), body)
        }
        (None, Some(error)) => ChatMessage::tool(
            execution.name.clone(),
            format!("tool {} failed: {error}", execution.name),
        ),
        (None, None) => ChatMessage::tool(execution.name.clone(), "null"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageRole, ToolCall};

    #[test]
    fn tool_messages_carry_json_or_plain_error() {
        let call = ToolCall::new(Some("c1".into()), "echo", serde_json::json!({}));
        let ok = ToolExecution::ok(&call, serde_json::json!({"v": "hi"}));
        let msg = tool_message(&ok);
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.name.as_deref(), Some("echo"));
        assert_eq!(msg.text(), r#"{"v":"hi"}"#);

        let failed = ToolExecution::failed(&call, "boom");
        let msg = tool_message(&failed);
        assert_eq!(msg.text(), "tool echo failed: boom");
    }

    #[test]
    fn append_keeps_assistant_before_tool_turns() {
        let call = ToolCall::new(Some("c1".into()), "echo", serde_json::json!({}));
        let step = Step {
            text: "thinking".into(),
            tool_calls: vec![call.clone()],
            tool_results: vec![ToolExecution::ok(&call, serde_json::json!(1))],
            step_number: 1,
            timestamp: Utc::now(),
        };
        let mut messages = vec![ChatMessage::user("go")];
        append_step_messages(&mut messages, &step);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[2].role, MessageRole::Tool);
    }
}
