//! Validator + executor composition.
//!
//! Every statement that reaches the database goes through here, whether it
//! came from the generator or straight off the wire. The three-way outcome
//! lets the caller distinguish a policy rejection (never executed) from a
//! database failure (executed and failed).

use std::sync::Arc;
use tracing::{debug, info};

use crate::db::{DatabaseClient, ExecLimits, QueryResult};
use crate::error::ExecutionError;
use crate::safety::{SqlValidator, Verdict};

/// Outcome of a guarded execution.
#[derive(Debug)]
pub enum ExecOutcome {
    /// The statement passed validation and executed.
    Executed(QueryResult),
    /// The statement violated the read-only policy and was never executed.
    Rejected { reason: String },
    /// The statement passed validation but the database rejected or
    /// failed it. Never retried.
    Failed(ExecutionError),
}

impl ExecOutcome {
    /// Returns the result if the statement executed.
    pub fn result(&self) -> Option<&QueryResult> {
        match self {
            Self::Executed(result) => Some(result),
            _ => None,
        }
    }
}

/// Guarded query executor with configured limits.
pub struct QueryExecutor {
    db: Arc<dyn DatabaseClient>,
    validator: SqlValidator,
    limits: ExecLimits,
}

impl QueryExecutor {
    pub fn new(db: Arc<dyn DatabaseClient>, validator: SqlValidator, limits: ExecLimits) -> Self {
        Self {
            db,
            validator,
            limits,
        }
    }

    /// Validates and, on acceptance, executes the statement.
    pub async fn run(&self, sql: &str) -> ExecOutcome {
        match self.validator.validate(sql) {
            Verdict::Rejected { reason } => {
                info!("statement rejected: {reason}");
                ExecOutcome::Rejected { reason }
            }
            Verdict::Accepted => {
                debug!("statement accepted, executing");
                match self.db.execute_query(sql, &self.limits).await {
                    Ok(result) => {
                        info!(
                            rows = result.row_count,
                            truncated = result.truncated,
                            "statement executed"
                        );
                        ExecOutcome::Executed(result)
                    }
                    Err(e) => ExecOutcome::Failed(e),
                }
            }
        }
    }

    /// The configured execution limits.
    pub fn limits(&self) -> &ExecLimits {
        &self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FailingDatabaseClient, MockDatabaseClient, QueryResult, Value};
    use std::time::Duration;

    fn executor_with(db: Arc<dyn DatabaseClient>) -> QueryExecutor {
        QueryExecutor::new(
            db,
            SqlValidator::default(),
            ExecLimits {
                row_cap: 50,
                timeout: Duration::from_secs(5),
            },
        )
    }

    #[tokio::test]
    async fn select_executes() {
        let executor = executor_with(Arc::new(MockDatabaseClient::new()));
        let outcome = executor.run("SELECT COUNT(*) FROM transactions").await;

        match outcome {
            ExecOutcome::Executed(result) => {
                assert_eq!(result.rows, vec![vec![Value::Int(1_000_000)]]);
            }
            other => panic!("expected Executed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_statement_is_rejected_not_executed() {
        // A failing client proves the database is never touched.
        let executor = executor_with(Arc::new(FailingDatabaseClient::new("db was called")));
        let outcome = executor.run("DROP TABLE transactions").await;

        match outcome {
            ExecOutcome::Rejected { reason } => assert!(reason.contains("DROP")),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn database_failure_is_surfaced() {
        let executor = executor_with(Arc::new(FailingDatabaseClient::new(
            "ERROR: relation \"nope\" does not exist",
        )));
        let outcome = executor.run("SELECT * FROM nope").await;

        match outcome {
            ExecOutcome::Failed(e) => assert!(e.message.contains("does not exist")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn row_cap_is_enforced() {
        let big = {
            let rows = (0..200_i64).map(|i| vec![Value::Int(i)]).collect();
            QueryResult::with_data(vec!["n".to_string()], rows)
        };
        let db = Arc::new(MockDatabaseClient::new().with_result("series", big));
        let executor = QueryExecutor::new(
            db,
            SqlValidator::default(),
            ExecLimits {
                row_cap: 50,
                timeout: Duration::from_secs(5),
            },
        );

        let outcome = executor.run("SELECT * FROM series").await;
        let result = outcome.result().expect("executed");
        assert_eq!(result.row_count, 50);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn idempotent_for_read_only_statements() {
        let executor = executor_with(Arc::new(MockDatabaseClient::new()));

        let first = executor.run("SELECT COUNT(*) FROM transactions").await;
        let second = executor.run("SELECT COUNT(*) FROM transactions").await;

        assert_eq!(
            first.result().unwrap().rows,
            second.result().unwrap().rows
        );
    }
}
