//! Request and response conversion
//!
//! These helpers convert the framework's messages, tools, and options into
//! Gemini's typed request structures and translate responses back, without
//! performing HTTP calls.

use base64::Engine;

use super::types::{
    Blob, Candidate, Content, FileData, FunctionCall, FunctionCallingConfig, FunctionCallingMode,
    FunctionDeclaration, FunctionResponse, GeminiTool, GenerateContentRequest,
    GenerateContentResponse, GenerationConfig, HarmBlockThreshold, HarmCategory, Part as WirePart,
    ToolConfig, WireSafetySetting,
};
use crate::error::{AiError, ErrorCode};
use crate::stream::Citation;
use crate::types::{
    ChatMessage, ChatRequest, MediaSource, MessageRole, Part, SafetyCategory, SafetyLevel,
    SafetySetting, TextResult, ToolCall, ToolChoice, Usage,
};

/// Request option key carrying a response schema for structured output.
pub const RESPONSE_SCHEMA_OPTION: &str = "response_schema";

/// Build the wire request body for one model turn.
///
/// System-role messages are pulled out into `systemInstruction`; everything
/// else flattens into the content list in order.
pub fn build_request_body(
    request: &ChatRequest,
    default_safety: Option<&[SafetySetting]>,
) -> Result<GenerateContentRequest, AiError> {
    let mut system_texts = Vec::new();
    let mut contents = Vec::new();

    for message in &request.messages {
        match message.role {
            MessageRole::System => {
                let text = message.text();
                if !text.is_empty() {
                    system_texts.push(text);
                }
            }
            _ => {
                if let Some(content) = convert_message(message)? {
                    contents.push(content);
                }
            }
        }
    }

    if contents.is_empty() {
        return Err(AiError::invalid_request(
            "request has no non-system messages",
        ));
    }

    let system_instruction = if system_texts.is_empty() {
        None
    } else {
        Some(Content {
            role: None,
            parts: vec![WirePart::Text {
                text: system_texts.join("\n\n"),
            }],
        })
    };

    let tools = convert_tools(request);
    let tool_config = convert_tool_choice(&request.tool_choice, tools.is_some());

    let safety = request
        .safety
        .as_deref()
        .or(default_safety)
        .map(convert_safety_settings);

    let mut generation_config = GenerationConfig {
        temperature: request.temperature,
        max_output_tokens: request.max_tokens,
        ..Default::default()
    };
    if let Some(schema) = request.provider_options.get(RESPONSE_SCHEMA_OPTION) {
        generation_config.response_schema = Some(schema.clone());
        generation_config.response_mime_type = Some("application/json".to_string());
    }

    Ok(GenerateContentRequest {
        contents,
        system_instruction,
        tools,
        tool_config,
        safety_settings: safety,
        generation_config: if generation_config.is_empty() {
            None
        } else {
            Some(generation_config)
        },
    })
}

/// Convert a non-system message into a wire content turn.
///
/// Tool-role messages become user turns carrying a `functionResponse` part;
/// messages with no convertible parts are dropped (e.g. an empty assistant
/// turn recorded after a tool-only step).
fn convert_message(message: &ChatMessage) -> Result<Option<Content>, AiError> {
    if message.role == MessageRole::Tool {
        let name = message
            .name
            .clone()
            .ok_or_else(|| AiError::invalid_request("tool message is missing the tool name"))?;
        let body = message.text();
        let content: serde_json::Value =
            serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));
        return Ok(Some(Content {
            role: Some("user".to_string()),
            parts: vec![WirePart::FunctionResponse {
                function_response: FunctionResponse {
                    name: name.clone(),
                    response: serde_json::json!({ "name": name, "content": content }),
                },
            }],
        }));
    }

    let role = match message.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "model",
        MessageRole::System | MessageRole::Tool => unreachable!("handled by the caller"),
    };

    let mut parts = Vec::new();
    for part in &message.parts {
        match part {
            Part::Text { text } => {
                if !text.is_empty() {
                    parts.push(WirePart::Text { text: text.clone() });
                }
            }
            Part::Image { url, .. } => parts.push(media_part(
                &MediaSource::Url { url: url.clone() },
                Some("image/jpeg"),
            )?),
            Part::Audio { source, .. } => parts.push(media_part(source, Some("audio/wav"))?),
            Part::Video { source, .. } => parts.push(media_part(source, Some("video/mp4"))?),
            Part::File { source, name, .. } => {
                let guessed = name
                    .as_deref()
                    .and_then(|n| mime_guess::from_path(n).first_raw());
                parts.push(media_part(source, guessed)?)
            }
        }
    }

    if parts.is_empty() {
        return Ok(None);
    }

    Ok(Some(Content {
        role: Some(role.to_string()),
        parts,
    }))
}

fn media_part(source: &MediaSource, fallback_mime: Option<&str>) -> Result<WirePart, AiError> {
    match source {
        MediaSource::Url { url } => {
            if let Some(stripped) = url.strip_prefix("data:") {
                // data URL: "mime;base64,payload"
                let (header, data) = stripped.split_once(',').ok_or_else(|| {
                    AiError::invalid_request(format!("malformed data URL: {url}"))
                })?;
                let mime_type = header.split(';').next().unwrap_or_default().to_string();
                Ok(WirePart::InlineData {
                    inline_data: Blob {
                        mime_type,
                        data: data.to_string(),
                    },
                })
            } else {
                let mime_type = mime_guess::from_path(url)
                    .first_raw()
                    .or(fallback_mime)
                    .map(str::to_string);
                Ok(WirePart::FileData {
                    file_data: FileData {
                        file_uri: url.clone(),
                        mime_type,
                    },
                })
            }
        }
        MediaSource::Bytes { data, mime } => Ok(WirePart::InlineData {
            inline_data: Blob {
                mime_type: mime
                    .clone()
                    .or_else(|| fallback_mime.map(str::to_string))
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                data: base64::engine::general_purpose::STANDARD.encode(data),
            },
        }),
        MediaSource::ProviderFile { file_id, uri } => Ok(WirePart::FileData {
            file_data: FileData {
                file_uri: uri.clone().unwrap_or_else(|| format!("files/{file_id}")),
                mime_type: fallback_mime.map(str::to_string),
            },
        }),
    }
}

fn convert_tools(request: &ChatRequest) -> Option<Vec<GeminiTool>> {
    if request.tools.is_empty() || request.tool_choice == ToolChoice::None {
        return None;
    }
    let declarations = request
        .tools
        .iter()
        .map(|tool| FunctionDeclaration {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: Some(tool.input_schema()),
        })
        .collect();
    Some(vec![GeminiTool {
        function_declarations: declarations,
    }])
}

fn convert_tool_choice(choice: &ToolChoice, has_tools: bool) -> Option<ToolConfig> {
    if !has_tools && !matches!(choice, ToolChoice::None) {
        return None;
    }
    let config = match choice {
        ToolChoice::Auto => FunctionCallingConfig {
            mode: FunctionCallingMode::Auto,
            allowed_function_names: None,
        },
        ToolChoice::None => FunctionCallingConfig {
            mode: FunctionCallingMode::None,
            allowed_function_names: None,
        },
        ToolChoice::Required => FunctionCallingConfig {
            mode: FunctionCallingMode::Any,
            allowed_function_names: None,
        },
        ToolChoice::Specific(name) => FunctionCallingConfig {
            mode: FunctionCallingMode::Any,
            allowed_function_names: Some(vec![name.clone()]),
        },
    };
    Some(ToolConfig {
        function_calling_config: config,
    })
}

fn convert_safety_settings(settings: &[SafetySetting]) -> Vec<WireSafetySetting> {
    settings
        .iter()
        .map(|s| WireSafetySetting {
            category: match s.category {
                SafetyCategory::Harassment => HarmCategory::Harassment,
                SafetyCategory::Hate => HarmCategory::HateSpeech,
                SafetyCategory::Sexual => HarmCategory::SexuallyExplicit,
                SafetyCategory::Dangerous => HarmCategory::DangerousContent,
            },
            threshold: match s.threshold {
                SafetyLevel::None => HarmBlockThreshold::BlockNone,
                SafetyLevel::Low => HarmBlockThreshold::BlockOnlyHigh,
                SafetyLevel::Medium => HarmBlockThreshold::BlockMediumAndAbove,
                // The API has no "always"; BLOCK_LOW_AND_ABOVE is its
                // strictest rung.
                SafetyLevel::High | SafetyLevel::Always => HarmBlockThreshold::BlockLowAndAbove,
            },
        })
        .collect()
}

/// Map a wire harm category string onto the framework category name.
pub(crate) fn map_safety_category(category: &str) -> String {
    match category {
        "HARM_CATEGORY_HARASSMENT" => "harassment".to_string(),
        "HARM_CATEGORY_HATE_SPEECH" => "hate".to_string(),
        "HARM_CATEGORY_SEXUALLY_EXPLICIT" => "sexual".to_string(),
        "HARM_CATEGORY_DANGEROUS_CONTENT" => "dangerous".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

/// Translate a full (non-streaming) response into a [`TextResult`].
///
/// The first candidate's concatenated text parts form the result text, and
/// its `functionCall` parts are pre-extracted into `tool_calls` (the
/// canonical path the runner consults).
pub fn convert_response(
    response: GenerateContentResponse,
    raw: serde_json::Value,
) -> Result<TextResult, AiError> {
    if let Some(feedback) = &response.prompt_feedback {
        if let Some(reason) = &feedback.block_reason {
            return Err(AiError::new(
                ErrorCode::SafetyBlocked,
                format!("prompt blocked: {reason}"),
            )
            .with_raw(raw));
        }
    }

    let candidate = response
        .candidates
        .first()
        .ok_or_else(|| AiError::internal("response contains no candidates"))?;

    Ok(TextResult {
        text: candidate_text(candidate),
        steps: Vec::new(),
        usage: convert_usage(response.usage_metadata.as_ref()),
        tool_calls: extract_tool_calls(candidate),
        raw: Some(raw),
    })
}

/// Concatenated text parts of a candidate.
pub fn candidate_text(candidate: &Candidate) -> String {
    let Some(content) = &candidate.content else {
        return String::new();
    };
    content
        .parts
        .iter()
        .filter_map(|p| match p {
            WirePart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Pre-extract the candidate's function calls in order.
pub fn extract_tool_calls(candidate: &Candidate) -> Vec<ToolCall> {
    let Some(content) = &candidate.content else {
        return Vec::new();
    };
    content
        .parts
        .iter()
        .filter_map(|p| match p {
            WirePart::FunctionCall { function_call } => Some(new_tool_call(function_call)),
            _ => None,
        })
        .collect()
}

/// Build a framework tool call from a wire function call, minting an id
/// (Gemini does not assign one).
pub fn new_tool_call(call: &FunctionCall) -> ToolCall {
    ToolCall::new(
        Some(format!("call_{}", uuid::Uuid::new_v4())),
        call.name.clone(),
        call.args.clone().unwrap_or_else(|| serde_json::json!({})),
    )
}

/// Translate usage metadata.
pub fn convert_usage(metadata: Option<&super::types::UsageMetadata>) -> Usage {
    match metadata {
        Some(meta) => Usage::new(
            meta.prompt_token_count.unwrap_or(0),
            meta.candidates_token_count.unwrap_or(0),
            meta.total_token_count,
        ),
        None => Usage::default(),
    }
}

/// Convert citation sources into framework citations, dropping entries with
/// no URI.
pub fn convert_citations(metadata: &super::types::CitationMetadata) -> Vec<Citation> {
    metadata
        .citation_sources
        .iter()
        .filter_map(|source| {
            Some(Citation {
                start_index: source.start_index.unwrap_or(0),
                end_index: source.end_index.unwrap_or(0),
                uri: source.uri.clone()?,
                title: source.title.clone(),
            })
        })
        .collect()
}
