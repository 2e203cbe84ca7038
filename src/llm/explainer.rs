//! Best-effort result explanation.
//!
//! A second gateway call turns the executed result into a plain-language
//! summary. Explanation is strictly advisory: any failure is logged and
//! swallowed, and the chat response ships without it.

use std::sync::Arc;
use tracing::warn;

use crate::db::QueryResult;
use crate::llm::prompt::explanation_prompt;
use crate::llm::types::{ChatMessage, CompletionRequest};
use crate::llm::LlmGateway;

/// A plain-language summary of an executed result.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Explanation {
    pub text: String,
}

/// Result Explainer: executed result in, optional summary out.
pub struct ResultExplainer {
    gateway: Arc<dyn LlmGateway>,
    max_tokens: u32,
}

impl ResultExplainer {
    pub fn new(gateway: Arc<dyn LlmGateway>, max_tokens: u32) -> Self {
        Self {
            gateway,
            max_tokens,
        }
    }

    /// Asks the gateway to summarize the result. Never fails the caller.
    pub async fn explain(&self, question: &str, result: &QueryResult) -> Option<Explanation> {
        let request = CompletionRequest::new(
            "You summarize SQL query results for a fraud-analytics dashboard. Answer concisely in plain language.",
            vec![ChatMessage::user(explanation_prompt(question, result))],
            self.max_tokens,
        );

        match self.gateway.complete(&request).await {
            Ok(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    None
                } else {
                    Some(Explanation { text })
                }
            }
            Err(e) => {
                warn!("explanation skipped: {e}");
                None
            }
        }
    }
}
