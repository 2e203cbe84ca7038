//! PostgreSQL client implementation.
//!
//! Executes statements on a short-lived read-only transaction acquired
//! from a shared pool, under a row/time budget. The read-only transaction
//! is defense in depth beneath the safety validator: even a statement that
//! slips past the textual gate cannot write.

use crate::config::ConnectionConfig;
use crate::db::{Column, DatabaseClient, ExecLimits, QueryResult, Row, Schema, Table, Value};
use crate::error::ExecutionError;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, Statement, TypeInfo};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// PostgreSQL database client backed by a connection pool.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Connects to the database, retrying transient failures.
    pub async fn connect(config: &ConnectionConfig, pool_size: u32) -> anyhow::Result<Self> {
        let conn_str = config.to_connection_string()?;

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(pool_size)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&conn_str)
                .await;

            match result {
                Ok(pool) => {
                    debug!("connected to database");
                    return Ok(Self { pool });
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    last_error = Some(e);

                    if attempt < MAX_RETRY_ATTEMPTS && is_transient {
                        warn!(
                            "connection attempt {} failed (transient), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(anyhow::anyhow!(map_connection_error(
            last_error.expect("at least one attempt was made"),
            config,
        )))
    }

    /// Creates a client from an existing pool. Primarily for tests.
    #[allow(dead_code)]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the statement inside a read-only transaction, fetching at most
    /// `row_cap + 1` rows. The extra row only probes for truncation and is
    /// discarded. A server-side statement timeout cancels long statements;
    /// the caller holds a client-side timeout as fallback.
    async fn fetch_bounded(
        &self,
        sql: &str,
        limits: &ExecLimits,
    ) -> Result<(Vec<String>, Vec<Row>, bool), ExecutionError> {
        let row_cap = limits.row_cap;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ExecutionError::new(format!("failed to acquire connection: {e}")))?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| ExecutionError::new(format_query_error(e)))?;

        // SET does not take bind parameters; the value is a trusted config
        // integer.
        let timeout_ms = limits.timeout.as_millis().max(1);
        sqlx::query(&format!("SET LOCAL statement_timeout = {timeout_ms}"))
            .execute(&mut *tx)
            .await
            .map_err(|e| ExecutionError::new(format_query_error(e)))?;

        // Prepare first so column metadata is available even for an empty
        // result set.
        let statement = (&mut *tx)
            .prepare(sql)
            .await
            .map_err(|e| ExecutionError::new(format_query_error(e)))?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect();

        let mut rows: Vec<Row> = Vec::new();
        let mut truncated = false;
        {
            let mut stream = sqlx::query(sql).fetch(&mut *tx);
            while let Some(row) = stream
                .try_next()
                .await
                .map_err(|e| ExecutionError::new(format_query_error(e)))?
            {
                if rows.len() == row_cap {
                    truncated = true;
                    break;
                }
                rows.push(convert_row(&row));
            }
        }

        // Nothing to keep; roll back to release the connection promptly.
        let _ = tx.rollback().await;

        Ok((columns, rows, truncated))
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn execute_query(
        &self,
        sql: &str,
        limits: &ExecLimits,
    ) -> Result<QueryResult, ExecutionError> {
        let started = Instant::now();

        // Client-side fallback with a grace period; the server-side
        // statement timeout normally fires first.
        let fallback = limits.timeout + Duration::from_secs(1);
        let fetched = tokio::time::timeout(fallback, self.fetch_bounded(sql, limits))
            .await
            .map_err(|_| {
                ExecutionError::new(format!(
                    "query timed out after {} seconds",
                    limits.timeout.as_secs_f64()
                ))
            })??;

        let (columns, rows, truncated) = fetched;
        let elapsed = started.elapsed();

        if truncated {
            warn!(
                "query hit the row cap of {}, result truncated",
                limits.row_cap
            );
        }

        let row_count = rows.len();
        Ok(QueryResult {
            columns,
            rows,
            row_count,
            truncated,
            elapsed,
        })
    }

    async fn introspect_schema(&self) -> Result<Schema, ExecutionError> {
        let table_names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ExecutionError::new(format!("failed to fetch tables: {e}")))?;

        let column_rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                table_name::text,
                column_name::text,
                data_type::text,
                is_nullable::text
            FROM information_schema.columns
            WHERE table_schema = 'public'
            ORDER BY table_name, ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ExecutionError::new(format!("failed to fetch columns: {e}")))?;

        let mut tables: Vec<Table> = table_names
            .into_iter()
            .map(|name| Table {
                name,
                columns: Vec::new(),
            })
            .collect();

        for (table_name, column_name, data_type, is_nullable) in column_rows {
            if let Some(table) = tables.iter_mut().find(|t| t.name == table_name) {
                table.columns.push(Column {
                    name: column_name,
                    data_type,
                    is_nullable: is_nullable == "YES",
                });
            }
        }

        Ok(Schema { tables })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value to a transport-safe scalar.
///
/// Integers stay integers, NUMERIC becomes a fixed-precision string,
/// temporal types become ISO-8601 strings, everything else is decoded as
/// text.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "NUMERIC" | "DECIMAL" => row
            .try_get::<Option<BigDecimal>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Text(v.to_string()))
            .unwrap_or(Value::Null),

        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Text(v.to_rfc3339()))
            .unwrap_or(Value::Null),

        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Text(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null),

        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Text(v.to_string()))
            .unwrap_or(Value::Null),

        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Text(v.to_string()))
            .unwrap_or(Value::Null),

        // For all other types, decode as text.
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::Text)
            .unwrap_or(Value::Null),
    }
}

/// Determines if a connection error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
    {
        return true;
    }

    false
}

/// Maps connection errors to messages that never echo credentials.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> String {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        format!("cannot connect to {host}:{port}; check that the server is running")
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        format!("authentication failed for user '{user}'")
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        format!("database '{database}' does not exist")
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        format!("connection to {host}:{port} timed out")
    } else {
        error.to_string()
    }
}

/// Formats a statement error, surfacing Postgres DETAIL/HINT when present.
fn format_query_error(error: sqlx::Error) -> String {
    if let Some(db_error) = error.as_database_error() {
        let mut result = String::from("ERROR: ");
        result.push_str(db_error.message());

        if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
            if let Some(detail) = pg_error.detail() {
                result.push_str("\n  DETAIL: ");
                result.push_str(detail);
            }
            if let Some(hint) = pg_error.hint() {
                result.push_str("\n  HINT: ");
                result.push_str(hint);
            }
        }

        result
    } else {
        error.to_string()
    }
}
