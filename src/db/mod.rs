//! Database abstraction layer.
//!
//! A trait-based seam over the relational store so the executor and the
//! orchestrator can be tested against in-memory clients.

mod mock;
mod postgres;
mod schema;
mod types;

pub use mock::{FailingDatabaseClient, MockDatabaseClient};
pub use postgres::PostgresClient;
pub use schema::{Column, Schema, Table};
pub use types::{QueryResult, Row, Value};

use crate::config::ConnectionConfig;
use crate::error::ExecutionError;
use async_trait::async_trait;
use std::time::Duration;

/// Resource budget for a single statement execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecLimits {
    /// Maximum rows returned; execution fetches one extra row to detect
    /// truncation and discards it.
    pub row_cap: usize,

    /// Wall-clock budget for the statement.
    pub timeout: Duration,
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self {
            row_cap: 50,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Interface for database clients.
///
/// Implementations enforce the limits themselves so that truncation
/// happens at the protocol level rather than after a full fetch.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Executes a statement under the given budget and returns a
    /// normalized result.
    async fn execute_query(
        &self,
        sql: &str,
        limits: &ExecLimits,
    ) -> Result<QueryResult, ExecutionError>;

    /// Introspects table and column metadata.
    async fn introspect_schema(&self) -> Result<Schema, ExecutionError>;

    /// Closes the underlying pool.
    async fn close(&self);
}

/// Connects to the configured database and returns a boxed client.
pub async fn connect(
    config: &ConnectionConfig,
    pool_size: u32,
) -> anyhow::Result<Box<dyn DatabaseClient>> {
    let client = PostgresClient::connect(config, pool_size).await?;
    Ok(Box::new(client))
}
