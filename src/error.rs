//! Error Handling Module
//!
//! Every failure in the runtime is normalized into a single [`AiError`]
//! carrying a stable [`ErrorCode`], a retry hint, and optional provider
//! context. Adapters construct errors from HTTP statuses and provider
//! payloads; the runner and streams propagate them unchanged.
//!
//! # Example
//!
//! ```rust
//! use laksa::error::{AiError, ErrorCode};
//!
//! let err = AiError::from_http_status(429, "quota exhausted");
//! assert_eq!(err.code, ErrorCode::RateLimited);
//! assert!(err.temporary);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stable classification of runtime failures.
///
/// The set is closed; adapters map provider-specific conditions onto it and
/// callers match on it to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    ContextLengthExceeded,
    Unsupported,
    RateLimited,
    Overloaded,
    SafetyBlocked,
    Timeout,
    Network,
    ProviderUnavailable,
    Internal,
}

impl ErrorCode {
    /// Whether errors with this code are transient by default.
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::Overloaded
                | Self::Timeout
                | Self::Network
                | Self::ProviderUnavailable
                | Self::Internal
        )
    }

    /// Default retry delay for this code when the provider did not send one.
    pub const fn default_retry_after(self) -> Duration {
        match self {
            Self::RateLimited => Duration::from_secs(60),
            Self::ProviderUnavailable => Duration::from_secs(30),
            Self::Overloaded => Duration::from_secs(10),
            Self::Network | Self::Timeout => Duration::from_secs(5),
            _ => Duration::ZERO,
        }
    }

    /// Stable snake_case string form (matches the serde representation).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::ContextLengthExceeded => "context_length_exceeded",
            Self::Unsupported => "unsupported",
            Self::RateLimited => "rate_limited",
            Self::Overloaded => "overloaded",
            Self::SafetyBlocked => "safety_blocked",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The runtime's single error type.
///
/// `temporary` and `retry_after` are derived from `code` at construction and
/// may be overridden by adapters that know better (e.g. a `Retry-After`
/// header).
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AiError {
    /// Stable classification code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Whether a retry may succeed.
    pub temporary: bool,
    /// Suggested delay before retrying. Zero for permanent errors.
    pub retry_after: Duration,
    /// Whether `retry_after` was supplied by the provider (as opposed to
    /// the code's built-in default). Retry loops only let an explicit
    /// delay override their backoff schedule.
    pub retry_after_explicit: bool,
    /// Provider identifier, when the error originated in an adapter.
    pub provider: Option<String>,
    /// Model the failing request targeted.
    pub model: Option<String>,
    /// HTTP status, when the error came from an HTTP round trip.
    pub http_status: Option<u16>,
    /// Raw provider payload, when one was available.
    pub raw: Option<serde_json::Value>,
    /// Underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AiError {
    /// Create an error with defaults derived from the code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            temporary: code.is_transient(),
            retry_after: code.default_retry_after(),
            retry_after_explicit: false,
            provider: None,
            model: None,
            http_status: None,
            raw: None,
            source: None,
        }
    }

    /// Shorthand for an `invalid_request` error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Shorthand for an `internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Shorthand for an `unsupported` error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unsupported, message)
    }

    /// Shorthand for a `timeout` error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    /// Shorthand for a cancellation surfaced as a `timeout`-class error.
    ///
    /// The runner returns this unwrapped when its token fires.
    pub fn canceled() -> Self {
        let mut err = Self::new(ErrorCode::Timeout, "operation canceled");
        err.temporary = false;
        err.retry_after = Duration::ZERO;
        err
    }

    /// Whether this error is a cancellation produced by [`AiError::canceled`].
    pub fn is_canceled(&self) -> bool {
        self.code == ErrorCode::Timeout && self.message == "operation canceled"
    }

    /// Classify an HTTP status into an error.
    ///
    /// Exact for the common codes; other 4xx fall back to `invalid_request`
    /// and other 5xx to `internal`. The status is always recorded so
    /// `from_http_status(s).http_status == Some(s)`.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let code = match status {
            400 => ErrorCode::InvalidRequest,
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            408 => ErrorCode::Timeout,
            413 => ErrorCode::ContextLengthExceeded,
            422 => ErrorCode::InvalidRequest,
            429 => ErrorCode::RateLimited,
            500 => ErrorCode::Internal,
            502 => ErrorCode::ProviderUnavailable,
            503 => ErrorCode::Overloaded,
            504 => ErrorCode::Timeout,
            s if (400..500).contains(&s) => ErrorCode::InvalidRequest,
            _ => ErrorCode::Internal,
        };
        let mut err = Self::new(code, message);
        err.http_status = Some(status);
        err
    }

    /// Wrap an existing error with added context.
    ///
    /// The code, retry hints, and provider context are preserved; only the
    /// message gains a prefix and the original becomes the source.
    pub fn wrap(context: impl Into<String>, inner: AiError) -> Self {
        Self {
            code: inner.code,
            message: format!("{}: {}", context.into(), inner.message),
            temporary: inner.temporary,
            retry_after: inner.retry_after,
            retry_after_explicit: inner.retry_after_explicit,
            provider: inner.provider.clone(),
            model: inner.model.clone(),
            http_status: inner.http_status,
            raw: inner.raw.clone(),
            source: Some(Box::new(inner)),
        }
    }

    /// Override the transient flag.
    pub fn with_temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    /// Override the retry delay with a provider-supplied value.
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = delay;
        self.retry_after_explicit = true;
        self
    }

    /// Attach the provider identifier.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Attach the target model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Attach the raw provider payload.
    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Whether the default retry policy would retry this error.
    pub fn is_retryable(&self) -> bool {
        self.temporary
    }
}

impl Clone for AiError {
    fn clone(&self) -> Self {
        // The boxed source is not cloneable; the clone keeps everything else.
        Self {
            code: self.code,
            message: self.message.clone(),
            temporary: self.temporary,
            retry_after: self.retry_after,
            retry_after_explicit: self.retry_after_explicit,
            provider: self.provider.clone(),
            model: self.model.clone(),
            http_status: self.http_status,
            raw: self.raw.clone(),
            source: None,
        }
    }
}

impl PartialEq for AiError {
    /// Errors compare equal when their codes match, which is what pattern
    /// matching call sites care about.
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            ErrorCode::Timeout
        } else {
            ErrorCode::Network
        };
        let mut out = Self::new(code, err.to_string());
        out.source = Some(Box::new(err));
        out
    }
}

impl From<serde_json::Error> for AiError {
    fn from(err: serde_json::Error) -> Self {
        let mut out = Self::new(ErrorCode::InvalidRequest, err.to_string());
        out.source = Some(Box::new(err));
        out
    }
}
