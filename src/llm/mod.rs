//! LLM integration.
//!
//! The gateway trait is a pure text-in/text-out boundary: it knows nothing
//! about SQL or the database, which lets the generator, explainer, and
//! orchestrator run against a fake gateway in tests.

pub mod anthropic;
pub mod explainer;
pub mod generator;
pub mod mock;
pub mod parser;
pub mod prompt;
pub mod types;

pub use anthropic::{AnthropicConfig, AnthropicGateway};
pub use explainer::{Explanation, ResultExplainer};
pub use generator::{CandidateStatement, GeneratedSql, SqlGenerator};
pub use mock::MockGateway;
pub use types::{ChatMessage, CompletionRequest, Role};

use crate::error::GatewayError;
use async_trait::async_trait;

/// Trait for completion service clients.
///
/// Implementations must be thread-safe and must handle their own retry
/// policy for transient failures; `AuthFailure` is surfaced immediately.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Sends a completion request and returns the raw response text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_gateway_implements_trait() {
        let gateway: Box<dyn LlmGateway> =
            Box::new(MockGateway::new().push_text("```sql\nSELECT 1;\n```"));
        let request = CompletionRequest::new("system", vec![ChatMessage::user("hi")], 128);
        let response = gateway.complete(&request).await.unwrap();
        assert!(response.contains("SELECT"));
    }
}
