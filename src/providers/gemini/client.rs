//! Gemini provider client
//!
//! Implements the [`Provider`] contract over Gemini's HTTP+JSON API with an
//! SSE variant for streaming. Non-streaming calls run inside the retry
//! loop; streaming connections are never retried mid-stream.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;

use super::config::GeminiConfig;
use super::convert::{RESPONSE_SCHEMA_OPTION, build_request_body, convert_response};
use super::error::classify_http_error;
use super::files::{FileStore, preprocess_messages};
use super::streaming::GeminiEventConverter;
use super::types::{GenerateContentRequest, GenerateContentResponse};
use crate::error::AiError;
use crate::provider::Provider;
use crate::retry::RetryPolicy;
use crate::stream::{ObjectStream, StreamEvent, TextStream};
use crate::types::{ChatRequest, ObjectResult, TextResult};
use crate::utils::json_repair::parse_with_repair;

/// Gemini adapter implementing the four-operation provider contract.
pub struct GeminiProvider {
    config: GeminiConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
    files: FileStore,
}

impl GeminiProvider {
    /// Create a provider from configuration.
    pub fn new(config: GeminiConfig) -> Result<Self, AiError> {
        let http = match &config.http_client {
            Some(client) => client.clone(),
            None => reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|e| {
                    AiError::internal(format!("failed to build HTTP client: {e}"))
                })?,
        };
        let retry = RetryPolicy::new(config.max_retries, config.retry_delay);
        Ok(Self {
            config,
            http,
            retry,
            files: FileStore::new(),
        })
    }

    /// The file reference cache.
    pub fn file_store(&self) -> &FileStore {
        &self.files
    }

    /// The active configuration.
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn model_for(&self, request: &ChatRequest) -> String {
        request
            .model
            .clone()
            .unwrap_or_else(|| self.config.model.clone())
    }

    fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/{}/models/{}:generateContent?key={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_version,
            model,
            self.config.api_key.expose_secret()
        )
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_version,
            model,
            self.config.api_key.expose_secret()
        )
    }

    /// Upload pending media and build the wire body.
    async fn prepare(
        &self,
        request: &ChatRequest,
    ) -> Result<(String, GenerateContentRequest), AiError> {
        let model = self.model_for(request);
        let mut prepared = request.clone();
        preprocess_messages(
            &self.http,
            &self.config,
            &self.files,
            &mut prepared.messages,
        )
        .await?;
        let body = build_request_body(&prepared, self.config.default_safety.as_deref())?;
        Ok((model, body))
    }

    /// One HTTP attempt of a non-streaming generation.
    async fn request_once(
        &self,
        cancel: &CancellationToken,
        url: &str,
        model: &str,
        body: &GenerateContentRequest,
    ) -> Result<TextResult, AiError> {
        let send = self.http.post(url).json(body).send();
        let response = tokio::select! {
            response = send => response?,
            _ = cancel.cancelled() => return Err(AiError::canceled()),
        };

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(std::time::Duration::from_secs);
            let text = response.text().await.unwrap_or_default();
            let mut err = classify_http_error(status.as_u16(), &text, model);
            if let Some(delay) = retry_after {
                err = err.with_retry_after(delay);
            }
            return Err(err);
        }

        let raw: serde_json::Value = response.json().await?;
        let parsed: GenerateContentResponse = serde_json::from_value(raw.clone())
            .map_err(|e| AiError::internal(format!("failed to parse response: {e}")).with_raw(raw.clone()))?;
        convert_response(parsed, raw).map_err(|e| e.with_provider("gemini").with_model(model))
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn id(&self) -> &str {
        "gemini"
    }

    async fn generate_text(
        &self,
        cancel: CancellationToken,
        request: ChatRequest,
    ) -> Result<TextResult, AiError> {
        let (model, body) = self.prepare(&request).await?;
        let url = self.generate_url(&model);
        let started = std::time::Instant::now();
        let result = self
            .retry
            .execute(&cancel, || self.request_once(&cancel, &url, &model, &body))
            .await;
        self.config.metrics.record_provider_call(
            self.id(),
            started.elapsed(),
            result.as_ref().err().map(|e| e.code),
        );
        result
    }

    async fn stream_text(
        &self,
        cancel: CancellationToken,
        request: ChatRequest,
    ) -> Result<TextStream, AiError> {
        let (model, body) = self.prepare(&request).await?;
        let url = self.stream_url(&model);
        let http = self.http.clone();
        let token = cancel.child_token();
        let stream_token = token.clone();

        let events = async_stream::stream! {
            yield StreamEvent::start();

            let send = http
                .post(&url)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .json(&body)
                .send();
            let response = tokio::select! {
                response = send => response,
                _ = stream_token.cancelled() => {
                    yield StreamEvent::error(&AiError::canceled());
                    return;
                }
            };
            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    yield StreamEvent::error(&AiError::from(e));
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                yield StreamEvent::error(&classify_http_error(status.as_u16(), &text, &model));
                return;
            }

            let mut converter = GeminiEventConverter::new();
            let mut frames = response.bytes_stream().eventsource();
            loop {
                let next = tokio::select! {
                    next = frames.next() => next,
                    _ = stream_token.cancelled() => {
                        yield StreamEvent::error(&AiError::canceled());
                        return;
                    }
                };
                match next {
                    Some(Ok(frame)) => match converter.convert_data(&frame.data) {
                        Ok(events) => {
                            for event in events {
                                yield event;
                            }
                        }
                        Err(e) => {
                            yield StreamEvent::error(&e);
                            return;
                        }
                    },
                    Some(Err(e)) => {
                        yield StreamEvent::error(&AiError::internal(format!(
                            "stream read failed: {e}"
                        )));
                        return;
                    }
                    None => break,
                }
            }

            yield StreamEvent::finish(converter.usage());
        };

        Ok(TextStream::new(Box::pin(events), token))
    }

    async fn generate_object(
        &self,
        cancel: CancellationToken,
        request: ChatRequest,
        schema: serde_json::Value,
    ) -> Result<ObjectResult, AiError> {
        let request = request.with_provider_option(RESPONSE_SCHEMA_OPTION, schema);
        let result = self.generate_text(cancel, request).await?;
        let object = parse_with_repair(&result.text).map_err(|e| {
            AiError::invalid_request(format!("structured output is not valid JSON: {e}"))
                .with_provider("gemini")
        })?;
        Ok(ObjectResult {
            object,
            usage: result.usage,
            raw: result.raw,
        })
    }

    async fn stream_object(
        &self,
        cancel: CancellationToken,
        request: ChatRequest,
        schema: serde_json::Value,
    ) -> Result<ObjectStream, AiError> {
        let request = request.with_provider_option(RESPONSE_SCHEMA_OPTION, schema);
        let stream = self.stream_text(cancel, request).await?;
        Ok(ObjectStream::new(stream))
    }
}
