//! Schema-aware SQL generation.
//!
//! Builds the generation prompt, calls the gateway, and extracts a single
//! candidate statement from the completion. The candidate is untrusted
//! output; the safety validator decides whether it ever executes.

use std::sync::Arc;
use tracing::debug;

use crate::db::Schema;
use crate::error::GenerationError;
use crate::llm::parser::extract_statement;
use crate::llm::prompt::generation_system_prompt;
use crate::llm::types::{ChatMessage, CompletionRequest};
use crate::llm::LlmGateway;

/// A generated statement, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateStatement {
    /// The statement as it appeared in the completion.
    pub raw_text: String,
    /// Trimmed form with at most one trailing semicolon removed.
    pub normalized_text: String,
}

impl CandidateStatement {
    fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        let normalized = trimmed
            .strip_suffix(';')
            .map(str::trim_end)
            .unwrap_or(trimmed);
        Self {
            raw_text: raw.to_string(),
            normalized_text: normalized.to_string(),
        }
    }
}

/// Output of a successful generation.
#[derive(Debug, Clone)]
pub struct GeneratedSql {
    /// The extracted candidate statement.
    pub statement: CandidateStatement,
    /// Prose surrounding the statement in the completion, if any.
    pub commentary: String,
}

/// SQL Generator: question + schema in, candidate statement out.
pub struct SqlGenerator {
    gateway: Arc<dyn LlmGateway>,
    max_tokens: u32,
}

impl SqlGenerator {
    pub fn new(gateway: Arc<dyn LlmGateway>, max_tokens: u32) -> Self {
        Self {
            gateway,
            max_tokens,
        }
    }

    /// Generates a candidate statement for the question.
    ///
    /// `history` is the windowed conversation so far; the current question
    /// is appended as the final user turn. Fails with
    /// [`GenerationError::NoStatement`] (carrying the completion text)
    /// when nothing extractable came back — never returns an empty or
    /// partial statement.
    pub async fn generate(
        &self,
        question: &str,
        schema: &Schema,
        history: &[ChatMessage],
    ) -> Result<GeneratedSql, GenerationError> {
        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(question));

        let request = CompletionRequest::new(
            generation_system_prompt(schema),
            messages,
            self.max_tokens,
        );

        let completion = self.gateway.complete(&request).await?;

        match extract_statement(&completion) {
            Some(extracted) => {
                debug!("extracted candidate statement: {}", extracted.sql);
                Ok(GeneratedSql {
                    statement: CandidateStatement::from_raw(&extracted.sql),
                    commentary: extracted.commentary,
                })
            }
            None => Err(GenerationError::NoStatement { completion }),
        }
    }
}
