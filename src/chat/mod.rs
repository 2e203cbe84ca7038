//! Conversation orchestrator.
//!
//! Drives one chat exchange through generate → validate → execute →
//! explain and assembles the response. Expected failures (no usable
//! statement, policy rejection, database error) are folded into a normal
//! answer; only an authentication fault or an exhausted request budget
//! aborts the exchange.
//!
//! Conversation state lives with the caller: prior turns come in on the
//! request and the extended list goes back out. Nothing is stored here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::db::{QueryResult, Schema};
use crate::error::{ChatError, GatewayError, GenerationError};
use crate::llm::{ChatMessage, Explanation, ResultExplainer, SqlGenerator};
use crate::query::{ExecOutcome, QueryExecutor};

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One message in a conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
    /// Stamped when absent so callers may send bare `{role, text}` turns.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The assembled answer for one exchange.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Narrative reply (the model's prose, or a status message).
    pub reply: String,
    /// The generated statement, if any was extracted.
    pub sql_query: Option<String>,
    /// True only when a statement passed validation and executed.
    pub sql_executed: bool,
    /// The executed result, when there is one.
    pub query_results: Option<QueryResult>,
    /// Best-effort summary of the result.
    pub explanation: Option<Explanation>,
    /// The single text a UI would show for this exchange.
    pub final_response: String,
    /// Input history plus this exchange's user and assistant turns.
    pub conversation: Vec<ChatTurn>,
}

/// Per-exchange budgets.
#[derive(Debug, Clone, Copy)]
pub struct ChatLimits {
    /// Wall-clock budget for the whole exchange (both gateway calls plus
    /// execution).
    pub request_budget: Duration,
    /// Number of past exchanges forwarded to the model.
    pub history_window: usize,
}

impl Default for ChatLimits {
    fn default() -> Self {
        Self {
            request_budget: Duration::from_secs(60),
            history_window: 10,
        }
    }
}

/// Pipeline phase, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Generating,
    Validating,
    Executing,
    Explaining,
}

/// Orchestrator for chat exchanges.
pub struct Orchestrator {
    generator: SqlGenerator,
    explainer: ResultExplainer,
    executor: Arc<QueryExecutor>,
    schema: Arc<Schema>,
    limits: ChatLimits,
}

impl Orchestrator {
    pub fn new(
        generator: SqlGenerator,
        explainer: ResultExplainer,
        executor: Arc<QueryExecutor>,
        schema: Arc<Schema>,
        limits: ChatLimits,
    ) -> Self {
        Self {
            generator,
            explainer,
            executor,
            schema,
            limits,
        }
    }

    /// Handles one incoming message under the request budget.
    pub async fn handle(
        &self,
        message: &str,
        history: Vec<ChatTurn>,
    ) -> Result<ChatOutcome, ChatError> {
        let budget = self.limits.request_budget;
        tokio::time::timeout(budget, self.run(message, history))
            .await
            .map_err(|_| {
                warn!("chat exchange exceeded the {budget:?} budget");
                ChatError::TimeoutExceeded(budget)
            })?
    }

    async fn run(
        &self,
        message: &str,
        history: Vec<ChatTurn>,
    ) -> Result<ChatOutcome, ChatError> {
        // Always attempt generation and let the validator gate execution;
        // questions that need no lookup come back without a statement and
        // degrade to a plain reply.
        debug!(phase = ?Phase::Generating);
        let window = history_window(&history, self.limits.history_window);
        let generated = match self.generator.generate(message, &self.schema, &window).await {
            Ok(generated) => generated,
            Err(GenerationError::Gateway(GatewayError::AuthFailure)) => {
                return Err(ChatError::AuthFailure);
            }
            Err(GenerationError::Gateway(e)) => {
                warn!("generation failed: {e}");
                let reply = "I couldn't reach the language model to answer that. \
                             Please try again shortly."
                    .to_string();
                return Ok(self.answer_without_sql(message, history, reply));
            }
            Err(GenerationError::NoStatement { completion }) => {
                let reply = if completion.trim().is_empty() {
                    "I couldn't produce a query for that question.".to_string()
                } else {
                    completion.trim().to_string()
                };
                return Ok(self.answer_without_sql(message, history, reply));
            }
        };

        let sql = generated.statement.normalized_text.clone();
        let reply = if generated.commentary.is_empty() {
            "I generated a query for that and ran it against the transactions data.".to_string()
        } else {
            generated.commentary.clone()
        };

        debug!(phase = ?Phase::Validating);
        debug!(phase = ?Phase::Executing);
        match self.executor.run(&sql).await {
            ExecOutcome::Rejected { reason } => {
                // The statement never executes; the reason is the answer.
                let text = format!("query rejected: {reason}");
                Ok(self.assemble(
                    message,
                    history,
                    text.clone(),
                    Some(sql),
                    false,
                    None,
                    None,
                    text,
                ))
            }
            ExecOutcome::Failed(e) => {
                // The statement is at fault; re-running it cannot help.
                let text = format!("The query failed to execute: {e}");
                Ok(self.assemble(
                    message,
                    history,
                    text.clone(),
                    Some(sql),
                    false,
                    None,
                    None,
                    text,
                ))
            }
            ExecOutcome::Executed(result) => {
                debug!(phase = ?Phase::Explaining);
                let explanation = self.explainer.explain(message, &result).await;

                let final_response = match &explanation {
                    Some(explanation) => explanation.text.clone(),
                    None => fallback_summary(&result),
                };

                Ok(self.assemble(
                    message,
                    history,
                    reply,
                    Some(sql),
                    true,
                    Some(result),
                    explanation,
                    final_response,
                ))
            }
        }
    }

    fn answer_without_sql(
        &self,
        message: &str,
        history: Vec<ChatTurn>,
        reply: String,
    ) -> ChatOutcome {
        self.assemble(message, history, reply.clone(), None, false, None, None, reply)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        message: &str,
        mut history: Vec<ChatTurn>,
        reply: String,
        sql_query: Option<String>,
        sql_executed: bool,
        query_results: Option<QueryResult>,
        explanation: Option<Explanation>,
        final_response: String,
    ) -> ChatOutcome {
        history.push(ChatTurn::user(message));
        history.push(ChatTurn::assistant(final_response.clone()));

        ChatOutcome {
            reply,
            sql_query,
            sql_executed,
            query_results,
            explanation,
            final_response,
            conversation: history,
        }
    }
}

/// Deterministic summary used when explanation is unavailable.
fn fallback_summary(result: &QueryResult) -> String {
    if result.truncated {
        format!(
            "The query returned {} rows (truncated at the row cap).",
            result.row_count
        )
    } else if result.row_count == 1 {
        "The query returned 1 row.".to_string()
    } else {
        format!("The query returned {} rows.", result.row_count)
    }
}

/// Converts the last `window` exchanges of history into gateway messages.
fn history_window(history: &[ChatTurn], window: usize) -> Vec<ChatMessage> {
    let keep = window.saturating_mul(2);
    let start = history.len().saturating_sub(keep);

    history[start..]
        .iter()
        .map(|turn| match turn.role {
            TurnRole::User => ChatMessage::user(turn.text.as_str()),
            TurnRole::Assistant => ChatMessage::assistant(turn.text.as_str()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseClient, ExecLimits, MockDatabaseClient};
    use crate::llm::MockGateway;
    use crate::safety::SqlValidator;

    async fn orchestrator_with(gateway: MockGateway) -> Orchestrator {
        let db = Arc::new(MockDatabaseClient::new());
        let schema = Arc::new(db.introspect_schema().await.unwrap());
        let gateway = Arc::new(gateway);
        let executor = Arc::new(QueryExecutor::new(
            db,
            SqlValidator::default(),
            ExecLimits::default(),
        ));

        Orchestrator::new(
            SqlGenerator::new(gateway.clone(), 2048),
            ResultExplainer::new(gateway, 1024),
            executor,
            schema,
            ChatLimits::default(),
        )
    }

    #[tokio::test]
    async fn count_question_executes_and_explains() {
        let orchestrator = orchestrator_with(
            MockGateway::new()
                .push_text("```sql\nSELECT COUNT(*) FROM transactions;\n```")
                .push_text("There are 1,000,000 transactions in total."),
        )
        .await;

        let outcome = orchestrator
            .handle("How many transactions are there in total?", Vec::new())
            .await
            .unwrap();

        assert!(outcome.sql_executed);
        assert_eq!(
            outcome.sql_query.as_deref(),
            Some("SELECT COUNT(*) FROM transactions")
        );
        assert!(outcome.query_results.is_some());
        assert!(outcome.final_response.contains("1,000,000"));
        assert_eq!(outcome.conversation.len(), 2);
        assert_eq!(outcome.conversation[0].role, TurnRole::User);
        assert_eq!(outcome.conversation[1].role, TurnRole::Assistant);
    }

    #[tokio::test]
    async fn destructive_statement_is_rejected_with_reason() {
        let orchestrator = orchestrator_with(
            MockGateway::new().push_text("```sql\nDROP TABLE transactions;\n```"),
        )
        .await;

        let outcome = orchestrator
            .handle("Drop the transactions table", Vec::new())
            .await
            .unwrap();

        assert!(!outcome.sql_executed);
        assert!(outcome.query_results.is_none());
        assert!(outcome.final_response.contains("DROP"));
        assert!(outcome.final_response.contains("rejected"));
    }

    #[tokio::test]
    async fn prose_completion_becomes_plain_reply() {
        let orchestrator = orchestrator_with(
            MockGateway::new().push_text("Fraud detection flags suspicious transactions."),
        )
        .await;

        let outcome = orchestrator
            .handle("What is fraud detection?", Vec::new())
            .await
            .unwrap();

        assert!(!outcome.sql_executed);
        assert!(outcome.sql_query.is_none());
        assert!(outcome.final_response.contains("suspicious"));
    }

    #[tokio::test]
    async fn explanation_failure_keeps_results() {
        let orchestrator = orchestrator_with(
            MockGateway::new()
                .push_text("```sql\nSELECT COUNT(*) FROM transactions;\n```")
                .push_error(GatewayError::Unavailable("down".into())),
        )
        .await;

        let outcome = orchestrator.handle("count them", Vec::new()).await.unwrap();

        assert!(outcome.sql_executed);
        assert!(outcome.query_results.is_some());
        assert!(outcome.explanation.is_none());
        // The deterministic fallback still answers.
        assert!(outcome.final_response.contains("1 row"));
    }

    #[tokio::test]
    async fn auth_failure_fails_the_exchange() {
        let orchestrator =
            orchestrator_with(MockGateway::new().push_error(GatewayError::AuthFailure)).await;

        let err = orchestrator.handle("count", Vec::new()).await.unwrap_err();
        assert_eq!(err, ChatError::AuthFailure);
    }

    #[tokio::test]
    async fn transient_gateway_failure_degrades_to_answer() {
        let orchestrator =
            orchestrator_with(MockGateway::new().push_error(GatewayError::RateLimited)).await;

        let outcome = orchestrator.handle("count", Vec::new()).await.unwrap();
        assert!(!outcome.sql_executed);
        assert!(outcome.final_response.contains("try again"));
    }

    #[tokio::test]
    async fn history_is_extended_not_replaced() {
        let orchestrator = orchestrator_with(
            MockGateway::new().push_text("Plain answer."),
        )
        .await;

        let history = vec![
            ChatTurn::user("earlier question"),
            ChatTurn::assistant("earlier answer"),
        ];
        let outcome = orchestrator
            .handle("follow-up", history)
            .await
            .unwrap();

        assert_eq!(outcome.conversation.len(), 4);
        assert_eq!(outcome.conversation[0].text, "earlier question");
        assert_eq!(outcome.conversation[2].text, "follow-up");
    }

    #[test]
    fn history_window_keeps_last_exchanges() {
        let mut history = Vec::new();
        for i in 0..30 {
            history.push(ChatTurn::user(format!("q{i}")));
            history.push(ChatTurn::assistant(format!("a{i}")));
        }

        let window = history_window(&history, 10);
        assert_eq!(window.len(), 20);
        assert_eq!(window[0].content, "q20");
        assert_eq!(window[19].content, "a29");
    }

    #[test]
    fn chat_turn_serde_round_trip() {
        let turn = ChatTurn::user("hello");
        let json = serde_json::to_string(&turn).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        let back: ChatTurn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, turn);
    }

    #[test]
    fn fallback_summary_variants() {
        let one = QueryResult::with_data(vec!["n".into()], vec![vec![crate::db::Value::Int(1)]]);
        assert_eq!(fallback_summary(&one), "The query returned 1 row.");

        let mut truncated = one.clone();
        truncated.truncated = true;
        assert!(fallback_summary(&truncated).contains("truncated"));
    }
}
