//! Gemini error classification
//!
//! Failures are classified by HTTP status first, then refined by the
//! payload's gRPC-style status string, then by message substrings. The raw
//! payload is preserved on the error.

use std::time::Duration;

use super::types::GeminiErrorResponse;
use crate::error::{AiError, ErrorCode};

/// Classify an HTTP error response body.
pub fn classify_http_error(status: u16, body: &str, model: &str) -> AiError {
    let parsed: Option<GeminiErrorResponse> = serde_json::from_str(body).ok();
    let (message, api_status) = match &parsed {
        Some(envelope) => (
            envelope
                .error
                .message
                .clone()
                .unwrap_or_else(|| body.to_string()),
            envelope.error.status.clone(),
        ),
        None => (body.to_string(), None),
    };

    let mut err = AiError::from_http_status(status, message.clone());

    if let Some(api_status) = api_status.as_deref() {
        err = refine_by_status(err, api_status);
    }
    err = refine_by_message(err, &message);

    err = err.with_provider("gemini").with_model(model);
    if let Ok(raw) = serde_json::from_str::<serde_json::Value>(body) {
        err = err.with_raw(raw);
    }
    err
}

fn recode(mut err: AiError, code: ErrorCode) -> AiError {
    err.code = code;
    err.temporary = code.is_transient();
    err.retry_after = code.default_retry_after();
    err
}

fn refine_by_status(err: AiError, api_status: &str) -> AiError {
    match api_status {
        "RESOURCE_EXHAUSTED" => recode(err, ErrorCode::RateLimited),
        "DEADLINE_EXCEEDED" => recode(err, ErrorCode::Timeout).with_temporary(true),
        "UNAVAILABLE" => recode(err, ErrorCode::ProviderUnavailable).with_temporary(true),
        "UNIMPLEMENTED" => recode(err, ErrorCode::Unsupported),
        "INVALID_ARGUMENT" | "FAILED_PRECONDITION" => recode(err, ErrorCode::InvalidRequest),
        "PERMISSION_DENIED" => recode(err, ErrorCode::Forbidden),
        "UNAUTHENTICATED" => recode(err, ErrorCode::Unauthorized),
        "NOT_FOUND" => recode(err, ErrorCode::NotFound),
        "INTERNAL" => recode(err, ErrorCode::Internal),
        _ => err,
    }
}

fn refine_by_message(err: AiError, message: &str) -> AiError {
    let lower = message.to_ascii_lowercase();
    if ["safety", "blocked", "harmful"]
        .iter()
        .any(|n| lower.contains(n))
    {
        return recode(err, ErrorCode::SafetyBlocked);
    }
    if ["context length", "token limit", "too long"]
        .iter()
        .any(|n| lower.contains(n))
    {
        return recode(err, ErrorCode::ContextLengthExceeded);
    }
    if ["overloaded", "capacity"].iter().any(|n| lower.contains(n)) {
        return recode(err, ErrorCode::Overloaded).with_retry_after(Duration::from_secs(10));
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wins_over_http_fallback() {
        let body = r#"{"error": {"code": 400, "message": "slow down", "status": "RESOURCE_EXHAUSTED"}}"#;
        let err = classify_http_error(400, body, "gemini-2.5-flash");
        assert_eq!(err.code, ErrorCode::RateLimited);
        assert!(err.temporary);
        assert_eq!(err.http_status, Some(400));
        assert_eq!(err.provider.as_deref(), Some("gemini"));
    }

    #[test]
    fn unimplemented_maps_to_unsupported() {
        let body = r#"{"error": {"message": "no such method", "status": "UNIMPLEMENTED"}}"#;
        let err = classify_http_error(501, body, "m");
        assert_eq!(err.code, ErrorCode::Unsupported);
        assert!(!err.temporary);
    }

    #[test]
    fn safety_substring_refines_the_code() {
        let body = r#"{"error": {"message": "Response blocked for safety reasons"}}"#;
        let err = classify_http_error(400, body, "m");
        assert_eq!(err.code, ErrorCode::SafetyBlocked);
    }

    #[test]
    fn context_length_substring_refines_the_code() {
        let body = r#"{"error": {"message": "input exceeds the model token limit"}}"#;
        let err = classify_http_error(400, body, "m");
        assert_eq!(err.code, ErrorCode::ContextLengthExceeded);
    }

    #[test]
    fn overloaded_substring_sets_short_retry() {
        let body = r#"{"error": {"message": "model is overloaded, try again"}}"#;
        let err = classify_http_error(500, body, "m");
        assert_eq!(err.code, ErrorCode::Overloaded);
        assert_eq!(err.retry_after, Duration::from_secs(10));
    }

    #[test]
    fn unparsable_body_falls_back_to_http_status() {
        let err = classify_http_error(503, "upstream connect error", "m");
        assert_eq!(err.code, ErrorCode::Overloaded);
        assert!(err.temporary);
    }
}
