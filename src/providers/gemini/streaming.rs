//! Gemini streaming implementation using eventsource-stream
//!
//! Each SSE `data:` payload is a JSON chunk shaped like a partial
//! `GenerateContentResponse`. The converter maps one chunk into zero or
//! more framework events; the surrounding stream adds the leading `Start`,
//! the terminal `Finish` (with the last seen usage), and `Error` framing.

use super::convert::{convert_citations, convert_usage, map_safety_category, new_tool_call};
use super::types::{GenerateContentResponse, Part as WirePart};
use crate::error::AiError;
use crate::stream::{SafetySignal, StreamEvent};
use crate::types::{ToolExecution, Usage};

/// Converts Gemini stream chunks into framework events.
///
/// The converter records the most recent `usageMetadata` so the stream can
/// attach it to its terminal `Finish`.
#[derive(Default)]
pub struct GeminiEventConverter {
    usage: Option<Usage>,
}

impl GeminiEventConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Usage reported by the final chunk, when any chunk carried it.
    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    /// Parse one SSE data payload. `[DONE]` and blank payloads yield no
    /// events; an unparsable payload is an error.
    pub fn convert_data(&mut self, data: &str) -> Result<Vec<StreamEvent>, AiError> {
        let trimmed = data.trim();
        if trimmed.is_empty() || trimmed == "[DONE]" {
            return Ok(Vec::new());
        }
        let chunk: GenerateContentResponse = serde_json::from_str(trimmed).map_err(|e| {
            AiError::internal(format!("failed to parse stream chunk: {e}"))
        })?;
        Ok(self.convert_chunk(chunk))
    }

    /// Map one parsed chunk into events.
    pub fn convert_chunk(&mut self, chunk: GenerateContentResponse) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(feedback) = &chunk.prompt_feedback {
            if let Some(reason) = &feedback.block_reason {
                events.push(StreamEvent::safety(SafetySignal {
                    category: "prompt".to_string(),
                    action: "block".to_string(),
                    score: None,
                    note: Some(reason.clone()),
                }));
            }
        }

        if let Some(usage) = &chunk.usage_metadata {
            self.usage = Some(convert_usage(Some(usage)));
        }

        for candidate in &chunk.candidates {
            for rating in &candidate.safety_ratings {
                if rating.blocked == Some(true) {
                    events.push(StreamEvent::safety(SafetySignal {
                        category: map_safety_category(&rating.category),
                        action: "block".to_string(),
                        score: rating.probability_score,
                        note: rating.probability.clone(),
                    }));
                }
            }

            if let Some(content) = &candidate.content {
                for part in &content.parts {
                    match part {
                        WirePart::Text { text } => {
                            if !text.is_empty() {
                                events.push(StreamEvent::text_delta(text.clone()));
                            }
                        }
                        WirePart::FunctionCall { function_call } => {
                            events.push(StreamEvent::tool_call(new_tool_call(function_call)));
                        }
                        WirePart::FunctionResponse { function_response } => {
                            events.push(StreamEvent::tool_result(ToolExecution {
                                id: None,
                                name: function_response.name.clone(),
                                result: Some(function_response.response.clone()),
                                error: None,
                            }));
                        }
                        WirePart::InlineData { .. } | WirePart::FileData { .. } => {}
                    }
                }
            }

            if let Some(metadata) = &candidate.citation_metadata {
                let citations = convert_citations(metadata);
                if !citations.is_empty() {
                    events.push(StreamEvent::citations(citations));
                }
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_chunk_becomes_a_delta() {
        let mut converter = GeminiEventConverter::new();
        let events = converter
            .convert_data(r#"{"candidates":[{"content":{"parts":[{"text":"Hello"}]}}]}"#)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(
            matches!(&events[0], StreamEvent::TextDelta { text_delta, .. } if text_delta == "Hello")
        );
    }

    #[test]
    fn done_and_blank_payloads_are_skipped() {
        let mut converter = GeminiEventConverter::new();
        assert!(converter.convert_data("[DONE]").unwrap().is_empty());
        assert!(converter.convert_data("   ").unwrap().is_empty());
    }

    #[test]
    fn function_call_becomes_tool_call_with_minted_id() {
        let mut converter = GeminiEventConverter::new();
        let events = converter
            .convert_data(
                r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"echo","args":{"v":"hi"}}}]}}]}"#,
            )
            .unwrap();
        match &events[0] {
            StreamEvent::ToolCall { call, .. } => {
                assert_eq!(call.name, "echo");
                assert_eq!(call.input["v"], "hi");
                assert!(call.id.as_deref().unwrap().starts_with("call_"));
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn blocked_prompt_becomes_a_safety_event() {
        let mut converter = GeminiEventConverter::new();
        let events = converter
            .convert_data(r#"{"candidates":[],"promptFeedback":{"blockReason":"SAFETY"}}"#)
            .unwrap();
        match &events[0] {
            StreamEvent::Safety { safety, .. } => {
                assert_eq!(safety.category, "prompt");
                assert_eq!(safety.action, "block");
                assert_eq!(safety.note.as_deref(), Some("SAFETY"));
            }
            other => panic!("expected safety event, got {other:?}"),
        }
    }

    #[test]
    fn blocked_rating_maps_category() {
        let mut converter = GeminiEventConverter::new();
        let events = converter
            .convert_data(
                r#"{"candidates":[{"safetyRatings":[{"category":"HARM_CATEGORY_HATE_SPEECH","blocked":true,"probabilityScore":0.9}]}]}"#,
            )
            .unwrap();
        match &events[0] {
            StreamEvent::Safety { safety, .. } => {
                assert_eq!(safety.category, "hate");
                assert_eq!(safety.score, Some(0.9));
            }
            other => panic!("expected safety event, got {other:?}"),
        }
    }

    #[test]
    fn citations_are_converted_when_non_empty() {
        let mut converter = GeminiEventConverter::new();
        let events = converter
            .convert_data(
                r#"{"candidates":[{"citationMetadata":{"citationSources":[{"startIndex":0,"endIndex":5,"uri":"https://src","title":"Src"}]}}]}"#,
            )
            .unwrap();
        match &events[0] {
            StreamEvent::Citations { citations, .. } => {
                assert_eq!(citations.len(), 1);
                assert_eq!(citations[0].uri, "https://src");
                assert_eq!(citations[0].title.as_deref(), Some("Src"));
            }
            other => panic!("expected citations, got {other:?}"),
        }
    }

    #[test]
    fn usage_metadata_is_recorded_for_finish() {
        let mut converter = GeminiEventConverter::new();
        converter
            .convert_data(
                r#"{"candidates":[{"content":{"parts":[{"text":"x"}]}}],"usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":4,"totalTokenCount":7}}"#,
            )
            .unwrap();
        let usage = converter.usage().unwrap();
        assert_eq!(usage.input_tokens, 3);
        assert_eq!(usage.output_tokens, 4);
        assert_eq!(usage.total_tokens, 7);
    }

    #[test]
    fn garbage_payload_is_an_error() {
        let mut converter = GeminiEventConverter::new();
        assert!(converter.convert_data("{not json").is_err());
    }
}
