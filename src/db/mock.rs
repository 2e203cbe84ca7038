//! Mock database clients for testing.
//!
//! `MockDatabaseClient` returns canned results matched by substring, the
//! way the mock LLM client matches prompts; `FailingDatabaseClient` fails
//! every statement with a fixed message.

use super::{DatabaseClient, ExecLimits, QueryResult, Schema, Table, Value};
use crate::db::Column;
use crate::error::ExecutionError;
use async_trait::async_trait;
use std::time::Duration;

/// A mock database client with pattern-matched canned results.
///
/// Honors `ExecLimits` the same way the Postgres client does, so row-cap
/// behavior can be tested without a live database.
pub struct MockDatabaseClient {
    schema: Schema,
    canned: Vec<(String, QueryResult)>,
}

impl MockDatabaseClient {
    /// Creates a mock with a minimal transactions schema and a canned
    /// COUNT(*) result.
    pub fn new() -> Self {
        let schema = Schema {
            tables: vec![Table {
                name: "transactions".to_string(),
                columns: vec![
                    Column::new("row_id", "integer").not_null(),
                    Column::new("accountnumber", "text"),
                    Column::new("transactiondatetime", "timestamp without time zone"),
                    Column::new("transactionamount", "numeric"),
                    Column::new("merchantname", "text"),
                    Column::new("isfraud", "boolean"),
                ],
            }],
        };

        Self {
            schema,
            canned: vec![(
                "count(*)".to_string(),
                QueryResult::with_data(vec!["count".to_string()], vec![vec![Value::Int(1_000_000)]]),
            )],
        }
    }

    /// Replaces the schema.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Adds a canned result for statements containing `pattern`
    /// (case-insensitive). Checked before the defaults.
    pub fn with_result(mut self, pattern: impl Into<String>, result: QueryResult) -> Self {
        self.canned.insert(0, (pattern.into(), result));
        self
    }

    fn lookup(&self, sql: &str) -> QueryResult {
        let sql_lower = sql.to_lowercase();
        for (pattern, result) in &self.canned {
            if sql_lower.contains(&pattern.to_lowercase()) {
                return result.clone();
            }
        }

        // Unmatched statements return a single echo row.
        QueryResult::with_data(
            vec!["result".to_string()],
            vec![vec![Value::Text(format!("mock result for: {sql}"))]],
        )
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_query(
        &self,
        sql: &str,
        limits: &ExecLimits,
    ) -> Result<QueryResult, ExecutionError> {
        let mut result = self.lookup(sql);

        if result.rows.len() > limits.row_cap {
            result.rows.truncate(limits.row_cap);
            result.truncated = true;
        }
        result.row_count = result.rows.len();
        result.elapsed = Duration::from_millis(1);

        Ok(result)
    }

    async fn introspect_schema(&self) -> Result<Schema, ExecutionError> {
        Ok(self.schema.clone())
    }

    async fn close(&self) {}
}

/// A database client that fails every statement.
pub struct FailingDatabaseClient {
    message: String,
}

impl FailingDatabaseClient {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl DatabaseClient for FailingDatabaseClient {
    async fn execute_query(
        &self,
        _sql: &str,
        _limits: &ExecLimits,
    ) -> Result<QueryResult, ExecutionError> {
        Err(ExecutionError::new(self.message.clone()))
    }

    async fn introspect_schema(&self) -> Result<Schema, ExecutionError> {
        Err(ExecutionError::new(self.message.clone()))
    }

    async fn close(&self) {}
}

/// Builds a many-row result for cap tests.
#[cfg(test)]
pub fn numbered_rows(n: usize) -> QueryResult {
    let rows: Vec<super::Row> = (0..n as i64).map(|i| vec![Value::Int(i)]).collect();
    QueryResult::with_data(vec!["n".to_string()], rows)
}
