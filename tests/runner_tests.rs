//! Runner integration tests: fast path, multi-step tool loops, failure
//! semantics, and the parallelism cap.

mod support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use laksa::error::AiError;
use laksa::runner::{Runner, RunnerOptions};
use laksa::stop::{max_steps, no_more_tools};
use laksa::tool::{ExecutionMeta, FunctionTool, ToolHandle};
use laksa::types::{ChatMessage, ChatRequest, MessageRole};

use support::{MockProvider, MockTurn};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct EchoPayload {
    v: String,
}

fn echo_tool() -> Arc<dyn ToolHandle> {
    FunctionTool::new(
        "echo",
        "echoes its input",
        |input: EchoPayload, _meta: ExecutionMeta| async move { Ok(input) },
    )
    .into_handle()
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SleepInput {
    millis: u64,
    tag: String,
}

#[derive(Debug, Serialize, JsonSchema)]
struct SleepOutput {
    tag: String,
}

fn sleep_tool() -> Arc<dyn ToolHandle> {
    FunctionTool::new(
        "sleep",
        "sleeps then returns its tag",
        |input: SleepInput, _meta: ExecutionMeta| async move {
            tokio::time::sleep(Duration::from_millis(input.millis)).await;
            Ok(SleepOutput { tag: input.tag })
        },
    )
    .into_handle()
}

fn user_request(text: &str) -> ChatRequest {
    ChatRequest::new(vec![ChatMessage::user(text)])
}

#[tokio::test]
async fn single_shot_without_tools_is_one_provider_call() {
    let provider = MockProvider::new(vec![MockTurn::text("hello there")]);
    let runner = Runner::new(provider);

    let result = runner
        .execute_request(CancellationToken::new(), user_request("hi"))
        .await
        .unwrap();

    assert_eq!(result.text, "hello there");
    assert!(result.steps.is_empty());
    assert_eq!(runner.provider().call_count(), 1);
}

#[tokio::test]
async fn stop_condition_without_tools_still_takes_the_fast_path() {
    let provider = MockProvider::new(vec![MockTurn::text("plain")]);
    let runner = Runner::new(provider);

    let request = user_request("hi").with_stop_when(no_more_tools());
    let result = runner
        .execute_request(CancellationToken::new(), request)
        .await
        .unwrap();
    assert!(result.steps.is_empty());
    assert_eq!(runner.provider().call_count(), 1);
}

#[tokio::test]
async fn two_step_run_executes_the_tool_and_returns_final_text() {
    let provider = MockProvider::new(vec![
        MockTurn::text("").with_tool_call("echo", serde_json::json!({"v": "hi"})),
        MockTurn::text("hi-done"),
    ]);
    let runner = Runner::new(provider);

    let request = user_request("use echo")
        .with_tool(echo_tool())
        .with_stop_when(no_more_tools());
    let result = runner
        .execute_request(CancellationToken::new(), request)
        .await
        .unwrap();

    assert_eq!(result.text, "hi-done");
    assert_eq!(result.steps.len(), 2);

    let first = &result.steps[0];
    assert_eq!(first.step_number, 1);
    assert_eq!(first.text, "");
    assert_eq!(first.tool_calls.len(), 1);
    assert_eq!(first.tool_results.len(), 1);
    assert_eq!(first.tool_results[0].id, first.tool_calls[0].id);
    assert_eq!(
        first.tool_results[0].result,
        Some(serde_json::json!({"v": "hi"}))
    );

    let second = &result.steps[1];
    assert_eq!(second.step_number, 2);
    assert_eq!(second.text, "hi-done");
    assert!(second.tool_calls.is_empty());

    // The follow-up call saw the synthetic assistant and tool turns.
    let seen = runner.provider().seen_messages.lock().unwrap();
    let second_call = &seen[1];
    assert_eq!(second_call.len(), 3);
    assert_eq!(second_call[1].role, MessageRole::Assistant);
    assert_eq!(second_call[2].role, MessageRole::Tool);
    assert_eq!(second_call[2].name.as_deref(), Some("echo"));
    assert_eq!(second_call[2].text(), r#"{"v":"hi"}"#);
}

#[tokio::test]
async fn max_steps_one_stops_after_the_first_step() {
    let provider = MockProvider::repeating(
        MockTurn::text("looping").with_tool_call("echo", serde_json::json!({"v": "x"})),
    );
    let runner = Runner::new(provider);

    let request = user_request("go")
        .with_tool(echo_tool())
        .with_stop_when(max_steps(1));
    let result = runner
        .execute_request(CancellationToken::new(), request)
        .await
        .unwrap();

    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].tool_results.len(), 1);
    assert_eq!(runner.provider().call_count(), 1);
}

#[tokio::test]
async fn step_numbers_are_contiguous_and_one_based() {
    let provider = MockProvider::new(vec![
        MockTurn::text("a").with_tool_call("echo", serde_json::json!({"v": "1"})),
        MockTurn::text("b").with_tool_call("echo", serde_json::json!({"v": "2"})),
        MockTurn::text("c"),
    ]);
    let runner = Runner::new(provider);

    let request = user_request("go")
        .with_tool(echo_tool())
        .with_stop_when(no_more_tools());
    let result = runner
        .execute_request(CancellationToken::new(), request)
        .await
        .unwrap();

    let numbers: Vec<usize> = result.steps.iter().map(|s| s.step_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(result.text, result.steps.last().unwrap().text);
}

#[tokio::test]
async fn ceiling_fires_on_step_101() {
    let provider = MockProvider::repeating(
        MockTurn::text("").with_tool_call("echo", serde_json::json!({"v": "x"})),
    );
    let runner = Runner::new(provider);

    // A stop condition that never fires.
    let never: Arc<dyn laksa::stop::StopCondition> =
        Arc::new(|_: usize, _: &laksa::types::Step| false);
    let request = user_request("go")
        .with_tool(echo_tool())
        .with_stop_when(never);

    let err = runner
        .execute_request(CancellationToken::new(), request)
        .await
        .unwrap_err();
    assert!(
        err.message.contains("maximum step limit (100)"),
        "unexpected message: {}",
        err.message
    );
    assert_eq!(runner.provider().call_count(), 101);
}

#[tokio::test]
async fn parallelism_cap_bounds_wall_clock_and_keeps_order() {
    let mut first = MockTurn::text("");
    for i in 0..5 {
        first = first.with_tool_call(
            "sleep",
            serde_json::json!({"millis": 100, "tag": format!("t{i}")}),
        );
    }
    let provider = MockProvider::new(vec![first, MockTurn::text("done")]);
    let runner = Runner::with_options(
        provider,
        RunnerOptions {
            max_parallel: 2,
            ..Default::default()
        },
    );

    let request = user_request("go")
        .with_tool(sleep_tool())
        .with_stop_when(no_more_tools());

    let started = Instant::now();
    let result = runner
        .execute_request(CancellationToken::new(), request)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // Five 100 ms sleeps under two permits need three batches.
    assert!(elapsed >= Duration::from_millis(300), "too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(600), "too slow: {elapsed:?}");

    let tags: Vec<&str> = result.steps[0]
        .tool_results
        .iter()
        .map(|r| r.result.as_ref().unwrap()["tag"].as_str().unwrap())
        .collect();
    assert_eq!(tags, vec!["t0", "t1", "t2", "t3", "t4"]);
}

#[tokio::test]
async fn unknown_tool_is_captured_in_the_step_and_the_run_continues() {
    let provider = MockProvider::new(vec![
        MockTurn::text("").with_tool_call("missing", serde_json::json!({})),
        MockTurn::text("recovered"),
    ]);
    let runner = Runner::new(provider);

    let request = user_request("go")
        .with_tool(echo_tool())
        .with_stop_when(no_more_tools());
    let result = runner
        .execute_request(CancellationToken::new(), request)
        .await
        .unwrap();

    assert_eq!(result.text, "recovered");
    let failure = &result.steps[0].tool_results[0];
    assert_eq!(failure.error.as_deref(), Some("unknown tool: missing"));

    // The failure went back to the model as a plain tool message.
    let seen = runner.provider().seen_messages.lock().unwrap();
    let tool_msg = seen[1].last().unwrap();
    assert!(tool_msg.text().contains("tool missing failed"));
}

#[tokio::test]
async fn cancellation_surfaces_the_raw_cancellation_error() {
    let provider = MockProvider::repeating(
        MockTurn::text("").with_tool_call("echo", serde_json::json!({"v": "x"})),
    );
    let runner = Runner::new(provider);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let request = user_request("go")
        .with_tool(echo_tool())
        .with_stop_when(no_more_tools());

    let err = runner.execute_request(cancel, request).await.unwrap_err();
    assert!(err.is_canceled());
    assert_eq!(runner.provider().call_count(), 0);
}

#[tokio::test]
async fn provider_errors_are_wrapped_with_the_step_number() {
    let provider = MockProvider::new(vec![
        MockTurn::text("").with_tool_call("echo", serde_json::json!({"v": "x"})),
        // script exhausted on the second call -> provider error
    ]);
    let runner = Runner::new(provider);

    let request = user_request("go")
        .with_tool(echo_tool())
        .with_stop_when(no_more_tools());
    let err = runner
        .execute_request(CancellationToken::new(), request)
        .await
        .unwrap_err();
    assert!(err.message.starts_with("step 2:"), "{}", err.message);
}

#[tokio::test]
async fn usage_accumulates_across_steps() {
    let provider = MockProvider::new(vec![
        MockTurn::text("").with_tool_call("echo", serde_json::json!({"v": "x"})),
        MockTurn::text("end"),
    ]);
    let runner = Runner::new(provider);

    let request = user_request("go")
        .with_tool(echo_tool())
        .with_stop_when(no_more_tools());
    let result = runner
        .execute_request(CancellationToken::new(), request)
        .await
        .unwrap();

    // Each mock turn reports 1 input + 1 output token.
    assert_eq!(result.usage.input_tokens, 2);
    assert_eq!(result.usage.output_tokens, 2);
    assert_eq!(result.usage.total_tokens, 4);
}

#[tokio::test]
async fn tool_error_from_user_code_is_not_fatal() {
    #[derive(Debug, Deserialize, JsonSchema)]
    struct Empty {}
    #[derive(Debug, Serialize, JsonSchema)]
    struct Nothing {}
    let failing: Arc<dyn ToolHandle> = FunctionTool::new(
        "fail",
        "always fails",
        |_: Empty, _meta: ExecutionMeta| async move {
            Err::<Nothing, _>(AiError::internal("database unreachable"))
        },
    )
    .into_handle();

    let provider = MockProvider::new(vec![
        MockTurn::text("").with_tool_call("fail", serde_json::json!({})),
        MockTurn::text("handled"),
    ]);
    let runner = Runner::new(provider);

    let request = user_request("go")
        .with_tool(failing)
        .with_stop_when(no_more_tools());
    let result = runner
        .execute_request(CancellationToken::new(), request)
        .await
        .unwrap();

    assert_eq!(result.text, "handled");
    let failure = &result.steps[0].tool_results[0];
    assert!(failure.error.as_deref().unwrap().contains("database unreachable"));
}
