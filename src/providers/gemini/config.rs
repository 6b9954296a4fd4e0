//! Gemini adapter configuration

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::metrics::{MetricsCollector, NoopMetrics};
use crate::types::SafetySetting;

/// Configuration for the Gemini adapter.
#[derive(Clone)]
pub struct GeminiConfig {
    /// API key for authentication (securely stored).
    pub api_key: SecretString,
    /// Base URL without the API version segment.
    pub base_url: String,
    /// API version path segment.
    pub api_version: String,
    /// Default model.
    pub model: String,
    /// HTTP timeout.
    pub timeout: Duration,
    /// Retries after the initial attempt for non-streaming calls.
    pub max_retries: u32,
    /// Base delay of the retry backoff.
    pub retry_delay: Duration,
    /// Default safety settings applied when the request has none.
    pub default_safety: Option<Vec<SafetySetting>>,
    /// Shared HTTP client; one is built from `timeout` when absent.
    pub http_client: Option<reqwest::Client>,
    /// Best-effort observer.
    pub metrics: Arc<dyn MetricsCollector>,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use secrecy::ExposeSecret;
        f.debug_struct("GeminiConfig")
            .field(
                "api_key_present",
                &(!self.api_key.expose_secret().is_empty()),
            )
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("default_safety_present", &self.default_safety.is_some())
            .finish()
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: SecretString::from(String::new()),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_version: "v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            default_safety: None,
            http_client: None,
            metrics: Arc::new(NoopMetrics),
        }
    }
}

impl GeminiConfig {
    /// Create a configuration with the given API key.
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            ..Default::default()
        }
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the base URL (without the version segment).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the HTTP timeout.
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget.
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the retry base delay.
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set default safety settings.
    pub fn with_default_safety(mut self, safety: Vec<SafetySetting>) -> Self {
        self.default_safety = Some(safety);
        self
    }

    /// Provide a shared HTTP client.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Set the metrics observer.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }
}
