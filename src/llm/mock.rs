//! Mock gateway for testing.
//!
//! Responses are scripted in call order, so a test can hand the generator
//! a SQL completion and the explainer a summary (or a failure) in one
//! setup. Received requests are captured for assertions on prompt content.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::GatewayError;
use crate::llm::types::CompletionRequest;
use crate::llm::LlmGateway;

/// Scripted mock gateway.
#[derive(Debug, Default)]
pub struct MockGateway {
    responses: Mutex<VecDeque<Result<String, GatewayError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    latency: Option<Duration>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a text completion.
    pub fn push_text(self, text: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    /// Queues a failure.
    pub fn push_error(self, error: GatewayError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Adds artificial latency to every call, for budget tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns the requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of completions performed.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmGateway for MockGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.requests.lock().unwrap().push(request.clone());

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(GatewayError::Unavailable(
                    "no scripted response left".to_string(),
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    fn request(content: &str) -> CompletionRequest {
        CompletionRequest::new("system", vec![ChatMessage::user(content)], 128)
    }

    #[tokio::test]
    async fn responses_come_back_in_order() {
        let gateway = MockGateway::new().push_text("first").push_text("second");

        assert_eq!(gateway.complete(&request("a")).await.unwrap(), "first");
        assert_eq!(gateway.complete(&request("b")).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn scripted_error_is_returned() {
        let gateway = MockGateway::new().push_error(GatewayError::AuthFailure);
        let err = gateway.complete(&request("a")).await.unwrap_err();
        assert_eq!(err, GatewayError::AuthFailure);
    }

    #[tokio::test]
    async fn exhausted_script_fails() {
        let gateway = MockGateway::new();
        let err = gateway.complete(&request("a")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[tokio::test]
    async fn requests_are_captured() {
        let gateway = MockGateway::new().push_text("ok");
        gateway.complete(&request("what is fraud?")).await.unwrap();

        let captured = gateway.requests();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].last_user_content(), Some("what is fraud?"));
        assert_eq!(gateway.call_count(), 1);
    }
}
