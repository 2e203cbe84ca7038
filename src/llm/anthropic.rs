//! Hosted completion service client (Anthropic messages API).
//!
//! Transient failures (timeouts, rate limits, 5xx) are retried a bounded
//! number of times with exponential backoff; authentication failures are
//! surfaced immediately.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::llm::types::CompletionRequest;
use crate::llm::LlmGateway;

/// Default timeout for a single API request.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default API endpoint.
const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Maximum attempts per request (first try included).
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff.
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// Bearer credential.
    pub api_key: String,
    /// Model to use.
    pub model: String,
    /// Endpoint URL; overridable for proxies and tests.
    pub endpoint: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            endpoint: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Completion service client.
#[derive(Debug, Clone)]
pub struct AnthropicGateway {
    config: AnthropicConfig,
    client: Client,
}

impl AnthropicGateway {
    /// Creates a gateway with the given configuration.
    pub fn new(config: AnthropicConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Classifies an HTTP error response.
    fn parse_error(status: reqwest::StatusCode, body: &str) -> GatewayError {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return GatewayError::AuthFailure;
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return GatewayError::RateLimited;
        }

        if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(body) {
            return GatewayError::Unavailable(format!(
                "API error ({}): {}",
                status, error_response.error.message
            ));
        }

        GatewayError::Unavailable(format!("API error ({status})"))
    }

    /// Classifies a request-level (pre-response) failure.
    fn parse_request_error(error: &reqwest::Error) -> GatewayError {
        if error.is_timeout() {
            GatewayError::Timeout
        } else if error.is_connect() {
            GatewayError::Unavailable("failed to connect to the completion service".to_string())
        } else {
            GatewayError::Unavailable(format!("request failed: {error}"))
        }
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let api_request = ApiRequest {
            model: self.config.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Self::parse_request_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::parse_error(status, &body));
        }

        let parsed: ApiResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Unavailable(format!("failed to parse response: {e}")))?;

        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| (block.content_type == "text").then_some(block.text))
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(GatewayError::Unavailable(
                "empty completion from the service".to_string(),
            ));
        }

        Ok(text)
    }
}

#[async_trait]
impl LlmGateway for AnthropicGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let mut last_error = GatewayError::Unavailable("no attempt was made".to_string());
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("completion attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            match self.attempt(request).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    if !e.is_transient() || attempt >= MAX_RETRY_ATTEMPTS {
                        return Err(e);
                    }
                    warn!(
                        "completion attempt {} failed ({}), retrying in {:?}",
                        attempt, e, delay
                    );
                    last_error = e;
                }
            }

            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        Err(last_error)
    }
}

// API wire types

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ApiContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = AnthropicConfig::new("sk-test", "claude-sonnet-4-20250514");
        assert_eq!(config.endpoint, DEFAULT_API_URL);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn config_builders() {
        let config = AnthropicConfig::new("sk-test", "m")
            .with_endpoint("http://localhost:9999/v1/messages")
            .with_timeout(5);
        assert_eq!(config.endpoint, "http://localhost:9999/v1/messages");
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn unauthorized_maps_to_auth_failure() {
        let err = AnthropicGateway::parse_error(reqwest::StatusCode::UNAUTHORIZED, "");
        assert_eq!(err, GatewayError::AuthFailure);
        assert!(!err.is_transient());
    }

    #[test]
    fn too_many_requests_maps_to_rate_limited() {
        let err = AnthropicGateway::parse_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert_eq!(err, GatewayError::RateLimited);
        assert!(err.is_transient());
    }

    #[test]
    fn server_error_maps_to_unavailable_with_message() {
        let body = r#"{"error":{"message":"overloaded"}}"#;
        let err =
            AnthropicGateway::parse_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, body);
        assert!(matches!(err, GatewayError::Unavailable(ref m) if m.contains("overloaded")));
    }
}
