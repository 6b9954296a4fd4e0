//! Best-effort repair of almost-JSON model output
//!
//! Structured-object generations sometimes arrive wrapped in fenced code
//! blocks or preceded by prose. The repair pass strips that wrapping so the
//! payload can be parsed; it never rewrites the JSON itself.

/// Extract the JSON payload from model text.
///
/// Returns the input unchanged when no wrapping is detected.
pub fn repair_json_text(text: &str) -> &str {
    let trimmed = text.trim();

    // Fenced code block, with or without a language tag.
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = match rest.split_once('\n') {
            Some((_lang, body)) => body,
            None => rest,
        };
        let body = rest.strip_suffix("```").unwrap_or(rest);
        return body.trim();
    }

    // Leading prose before the first JSON bracket.
    let start = trimmed.find(['{', '[']);
    if let Some(start) = start {
        let open = trimmed.as_bytes()[start];
        let close = if open == b'{' { '}' } else { ']' };
        if let Some(end) = trimmed.rfind(close) {
            if end >= start {
                return &trimmed[start..=end];
            }
        }
    }

    trimmed
}

/// Parse model text as JSON, applying [`repair_json_text`] when a direct
/// parse fails.
pub fn parse_with_repair(text: &str) -> Result<serde_json::Value, serde_json::Error> {
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            let repaired = repair_json_text(text);
            if repaired == text {
                Err(first_err)
            } else {
                serde_json::from_str(repaired)
            }
        }
    }
}
