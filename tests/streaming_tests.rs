//! Streaming coordinator tests: event ordering, framing invariants, and
//! failure semantics.

mod support;

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use laksa::runner::Runner;
use laksa::stop::no_more_tools;
use laksa::stream::StreamEvent;
use laksa::tool::{ExecutionMeta, FunctionTool, ToolHandle};
use laksa::types::{ChatMessage, ChatRequest, ToolCall, Usage};

use support::{MockProvider, MockTurn, event_label};

#[derive(Debug, Deserialize, JsonSchema)]
struct OkInput {
    #[serde(default)]
    #[allow(dead_code)]
    v: Option<String>,
}

fn ok_tool() -> Arc<dyn ToolHandle> {
    FunctionTool::new(
        "check",
        "always returns OK",
        |_: OkInput, _meta: ExecutionMeta| async move { Ok("OK".to_string()) },
    )
    .into_handle()
}

fn request_with_tool() -> ChatRequest {
    ChatRequest::new(vec![ChatMessage::user("go")])
        .with_tool(ok_tool())
        .with_stop_when(no_more_tools())
}

#[tokio::test]
async fn two_step_stream_preserves_the_expected_order() {
    let tc = ToolCall::new(Some("tc-1".into()), "check", serde_json::json!({}));
    let provider = MockProvider::new(vec![
        MockTurn::text("").with_events(vec![
            StreamEvent::start(),
            StreamEvent::text_delta("a"),
            StreamEvent::text_delta("b"),
            StreamEvent::tool_call(tc.clone()),
            StreamEvent::finish(Some(Usage::new(2, 2, None))),
        ]),
        MockTurn::text("").with_events(vec![
            StreamEvent::start(),
            StreamEvent::text_delta("done"),
            StreamEvent::finish(Some(Usage::new(1, 1, None))),
        ]),
    ]);
    let runner = Runner::new(provider);

    let stream = runner
        .stream_execute_request(CancellationToken::new(), request_with_tool())
        .await
        .unwrap();
    let events = stream.collect_events().await;
    let labels: Vec<String> = events.iter().map(event_label).collect();

    assert_eq!(
        labels,
        vec![
            "start",
            "text:a",
            "text:b",
            "tool-call:check",
            "tool-result:check",
            "finish-step:1",
            "start", // provider's step-2 start is forwarded as-is
            "text:done",
            "finish-step:2",
            "finish",
        ]
    );

    // The tool result carries the tool's output and the call's id.
    let result = events
        .iter()
        .find_map(|e| match e {
            StreamEvent::ToolResult { execution, .. } => Some(execution.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(result.id.as_deref(), Some("tc-1"));
    assert_eq!(result.result, Some(serde_json::json!("OK")));

    // Usage from both provider turns is aggregated onto the terminal Finish.
    match events.last().unwrap() {
        StreamEvent::Finish { usage, .. } => {
            assert_eq!(usage.unwrap().total_tokens, 6);
        }
        other => panic!("expected terminal finish, got {other:?}"),
    }
}

#[tokio::test]
async fn exactly_one_start_leads_and_one_terminator_ends() {
    let provider = MockProvider::new(vec![
        MockTurn::text("").with_tool_call("check", serde_json::json!({})),
        MockTurn::text("end"),
    ]);
    let runner = Runner::new(provider);

    let stream = runner
        .stream_execute_request(CancellationToken::new(), request_with_tool())
        .await
        .unwrap();
    let events = stream.collect_events().await;

    assert!(matches!(events.first().unwrap(), StreamEvent::Start { .. }));
    let terminators = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminators, 1);
    assert!(events.last().unwrap().is_terminal());

    // FinishStep appears once per step and after that step's tool results.
    let labels: Vec<String> = events.iter().map(|e| event_label(e)).collect();
    let fs1 = labels.iter().position(|l| l == "finish-step:1").unwrap();
    let tr = labels
        .iter()
        .position(|l| l == "tool-result:check")
        .unwrap();
    assert!(tr < fs1);
    assert_eq!(labels.iter().filter(|l| l.starts_with("finish-step")).count(), 2);
}

#[tokio::test]
async fn fast_path_streams_straight_from_the_provider() {
    let provider = MockProvider::new(vec![MockTurn::text("plain")]);
    let runner = Runner::new(provider);

    // No stop condition: the provider's own stream is returned.
    let request = ChatRequest::new(vec![ChatMessage::user("hi")]);
    let stream = runner
        .stream_execute_request(CancellationToken::new(), request)
        .await
        .unwrap();
    let labels: Vec<String> = stream
        .collect_events()
        .await
        .iter()
        .map(event_label)
        .collect();
    assert_eq!(labels, vec!["start", "text:plain", "finish"]);
}

#[tokio::test]
async fn provider_error_terminates_the_stream() {
    let err = laksa::error::AiError::internal("boom");
    let provider = MockProvider::new(vec![MockTurn::text("").with_events(vec![
        StreamEvent::start(),
        StreamEvent::text_delta("a"),
        StreamEvent::error(&err),
    ])]);
    let runner = Runner::new(provider);

    let stream = runner
        .stream_execute_request(CancellationToken::new(), request_with_tool())
        .await
        .unwrap();
    let events = stream.collect_events().await;
    let labels: Vec<String> = events.iter().map(event_label).collect();

    assert_eq!(labels, vec!["start", "text:a", "error"]);
}

#[tokio::test]
async fn streaming_ceiling_emits_an_explicit_error() {
    let provider = MockProvider::repeating(
        MockTurn::text("").with_tool_call("check", serde_json::json!({})),
    );
    let runner = Runner::new(provider);

    let never: Arc<dyn laksa::stop::StopCondition> =
        Arc::new(|_: usize, _: &laksa::types::Step| false);
    let request = ChatRequest::new(vec![ChatMessage::user("go")])
        .with_tool(ok_tool())
        .with_stop_when(never);

    let stream = runner
        .stream_execute_request(CancellationToken::new(), request)
        .await
        .unwrap();
    let events = stream.collect_events().await;

    match events.last().unwrap() {
        StreamEvent::Error { error, .. } => {
            assert!(error.contains("maximum step limit (100)"), "{error}");
        }
        other => panic!("expected terminal error, got {other:?}"),
    }
    // 101 FinishStep events were emitted before the ceiling fired.
    let finish_steps = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::FinishStep { .. }))
        .count();
    assert_eq!(finish_steps, 101);
}

#[tokio::test]
async fn close_cancels_the_worker() {
    let provider = MockProvider::repeating(
        MockTurn::text("").with_tool_call("check", serde_json::json!({})),
    );
    let runner = Runner::new(provider);

    let never: Arc<dyn laksa::stop::StopCondition> =
        Arc::new(|_: usize, _: &laksa::types::Step| false);
    let request = ChatRequest::new(vec![ChatMessage::user("go")])
        .with_tool(ok_tool())
        .with_stop_when(never);

    let mut stream = runner
        .stream_execute_request(CancellationToken::new(), request)
        .await
        .unwrap();
    // Read a couple of events, then close mid-run.
    let first = stream.next().await.unwrap();
    assert!(matches!(first, StreamEvent::Start { .. }));
    stream.close().await;
    stream.close().await; // idempotent
}
