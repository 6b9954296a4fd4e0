//! Bounded-parallel tool executor
//!
//! Runs a step's tool calls concurrently under a semaphore of
//! `max_parallel` permits. Results land at their call's original index
//! regardless of completion order. Individual failures (unknown tool, tool
//! error, panic, per-tool timeout) become error executions and the step
//! continues; a fired cancellation token fails the whole invocation.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::AiError;
use crate::metrics::MetricsCollector;
use crate::tool::{ExecutionMeta, ToolHandle};
use crate::types::{ChatMessage, ToolCall, ToolExecution};

/// Default number of concurrently running tools.
pub const DEFAULT_MAX_PARALLEL: usize = 10;

/// Default per-tool deadline.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

enum WorkerOutcome {
    Done(ToolExecution),
    Canceled(AiError),
}

/// Executes a step's tool calls with bounded parallelism.
#[derive(Clone)]
pub struct ToolExecutor {
    max_parallel: usize,
    tool_timeout: Duration,
    metrics: Arc<dyn MetricsCollector>,
}

impl ToolExecutor {
    /// Create an executor. `max_parallel` is clamped to at least 1; a zero
    /// `tool_timeout` disables the per-tool deadline.
    pub fn new(
        max_parallel: usize,
        tool_timeout: Duration,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            tool_timeout,
            metrics,
        }
    }

    /// Run `calls` against `tools`, returning executions in call order.
    ///
    /// `messages` is the working conversation snapshot handed to each tool
    /// via [`ExecutionMeta`].
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        calls: &[ToolCall],
        tools: &[Arc<dyn ToolHandle>],
        messages: &[ChatMessage],
        step_number: usize,
    ) -> Result<Vec<ToolExecution>, AiError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let canceled = Arc::new(AtomicBool::new(false));
        let messages: Arc<[ChatMessage]> = messages.into();

        let mut workers = Vec::with_capacity(calls.len());
        for call in calls {
            let call = call.clone();
            let tool = tools.iter().find(|t| t.name() == call.name).cloned();
            let semaphore = semaphore.clone();
            let canceled = canceled.clone();
            let cancel = cancel.clone();
            let messages = messages.clone();
            let default_timeout = self.tool_timeout;
            let metrics = self.metrics.clone();

            workers.push(tokio::spawn(async move {
                if canceled.load(Ordering::Relaxed) || cancel.is_cancelled() {
                    canceled.store(true, Ordering::Relaxed);
                    return WorkerOutcome::Canceled(AiError::canceled());
                }

                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => return WorkerOutcome::Canceled(AiError::canceled()),
                    },
                    _ = cancel.cancelled() => {
                        canceled.store(true, Ordering::Relaxed);
                        return WorkerOutcome::Canceled(AiError::canceled());
                    }
                };

                let Some(tool) = tool else {
                    tracing::warn!(tool = %call.name, "model requested an unregistered tool");
                    return WorkerOutcome::Done(ToolExecution::failed(
                        &call,
                        format!("unknown tool: {}", call.name),
                    ));
                };

                let timeout = tool.options().timeout.unwrap_or(default_timeout);
                let meta = ExecutionMeta {
                    call_id: call.id.clone(),
                    messages: messages.to_vec(),
                    step_number,
                };

                let started = Instant::now();
                let fut = AssertUnwindSafe(tool.execute(
                    cancel.child_token(),
                    call.input.clone(),
                    meta,
                ))
                .catch_unwind();

                let outcome = if timeout.is_zero() {
                    fut.await
                } else {
                    match tokio::time::timeout(timeout, fut).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            let execution = ToolExecution::failed(
                                &call,
                                format!("tool {} timed out after {timeout:?}", call.name),
                            );
                            metrics.record_tool_execution(
                                &call.name,
                                started.elapsed(),
                                execution.error.as_deref(),
                            );
                            return WorkerOutcome::Done(execution);
                        }
                    }
                };

                let execution = match outcome {
                    Ok(Ok(result)) => ToolExecution::ok(&call, result),
                    Ok(Err(err)) => ToolExecution::failed(&call, err.to_string()),
                    Err(panic) => {
                        let reason = panic
                            .downcast_ref::<String>()
                            .map(String::as_str)
                            .or_else(|| panic.downcast_ref::<&str>().copied())
                            .unwrap_or("unknown panic");
                        ToolExecution::failed(
                            &call,
                            format!("tool {} panicked: {reason}", call.name),
                        )
                    }
                };
                metrics.record_tool_execution(
                    &call.name,
                    started.elapsed(),
                    execution.error.as_deref(),
                );
                WorkerOutcome::Done(execution)
            }));
        }

        let mut results: Vec<Option<ToolExecution>> = vec![None; calls.len()];
        let mut pool_error: Option<AiError> = None;
        for (index, worker) in workers.into_iter().enumerate() {
            match worker.await {
                Ok(WorkerOutcome::Done(execution)) => results[index] = Some(execution),
                Ok(WorkerOutcome::Canceled(err)) => pool_error = Some(err),
                Err(join_err) => {
                    // Worker bookkeeping never panics; treat a lost worker
                    // as a failed execution of its call.
                    results[index] = Some(ToolExecution::failed(
                        &calls[index],
                        format!("tool {} worker failed: {join_err}", calls[index].name),
                    ));
                }
            }
        }

        if let Some(err) = pool_error {
            return Err(err);
        }

        Ok(results
            .into_iter()
            .map(|r| r.expect("every worker reports an outcome"))
            .collect())
    }
}
