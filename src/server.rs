//! HTTP server.
//!
//! JSON API consumed by the dashboard:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Conversational endpoint (LLM + guarded execution) |
//! | `POST` | `/execute-sql` | Direct validator + executor passthrough |
//! | `GET`  | `/schema/tables` | List tables |
//! | `GET`  | `/schema/tables/{table}` | Columns of one table |
//! | `GET`  | `/health` | Health check (returns name and version) |
//!
//! Any `Answered` chat outcome is a 200, even when it reports a rejected
//! or failed query — that is user-facing information, not a protocol
//! error. 5xx is reserved for infrastructure faults and never carries
//! internal detail.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::chat::{ChatOutcome, ChatTurn, Orchestrator};
use crate::db::{DatabaseClient, QueryResult, Row};
use crate::error::ChatError;
use crate::llm::Explanation;
use crate::query::{ExecOutcome, QueryExecutor};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    executor: Arc<QueryExecutor>,
    db: Arc<dyn DatabaseClient>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        executor: Arc<QueryExecutor>,
        db: Arc<dyn DatabaseClient>,
    ) -> Self {
        Self {
            orchestrator,
            executor,
            db,
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/execute-sql", post(handle_execute_sql))
        .route("/schema/tables", get(handle_list_tables))
        .route("/schema/tables/{table}", get(handle_table_schema))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Binds and serves until the process is terminated.
pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let app = router(state);

    info!("listening on http://{bind}");
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// Wire types

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: Option<String>,
    #[serde(default)]
    conversation: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    reply: String,
    sql_query: Option<String>,
    sql_executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_results: Option<SqlPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<Explanation>,
    final_response: String,
    conversation: Vec<ChatTurn>,
}

impl From<ChatOutcome> for ChatResponse {
    fn from(outcome: ChatOutcome) -> Self {
        Self {
            reply: outcome.reply,
            sql_query: outcome.sql_query,
            sql_executed: outcome.sql_executed,
            query_results: outcome.query_results.as_ref().map(SqlPayload::from),
            explanation: outcome.explanation,
            final_response: outcome.final_response,
            conversation: outcome.conversation,
        }
    }
}

/// The `{columns, rows, success}` object shared by `/execute-sql` and the
/// chat response.
#[derive(Debug, Serialize, Deserialize)]
pub struct SqlPayload {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub success: bool,
}

impl From<&QueryResult> for SqlPayload {
    fn from(result: &QueryResult) -> Self {
        Self {
            columns: result.columns.clone(),
            rows: result.rows.clone(),
            success: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteSqlRequest {
    query: Option<String>,
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

// Handlers

async fn handle_chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    let Some(message) = request
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
    else {
        return bad_request("missing required field: message");
    };

    match state
        .orchestrator
        .handle(message, request.conversation)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(ChatResponse::from(outcome))).into_response(),
        Err(e) => {
            // Infrastructure fault; log the detail, return a generic error.
            error!("chat exchange failed: {e}");
            let status = match e {
                ChatError::TimeoutExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
                ChatError::AuthFailure => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(json!({ "error": "the request could not be completed" })),
            )
                .into_response()
        }
    }
}

async fn handle_execute_sql(
    State(state): State<AppState>,
    Json(request): Json<ExecuteSqlRequest>,
) -> Response {
    let Some(query) = request
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
    else {
        return bad_request("missing required field: query");
    };

    match state.executor.run(query).await {
        ExecOutcome::Executed(result) => {
            (StatusCode::OK, Json(SqlPayload::from(&result))).into_response()
        }
        ExecOutcome::Rejected { reason } => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": reason, "success": false })),
        )
            .into_response(),
        ExecOutcome::Failed(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.message, "success": false })),
        )
            .into_response(),
    }
}

async fn handle_list_tables(State(state): State<AppState>) -> Response {
    match state.db.introspect_schema().await {
        Ok(schema) => {
            let tables: Vec<&str> = schema.tables.iter().map(|t| t.name.as_str()).collect();
            (StatusCode::OK, Json(json!({ "tables": tables }))).into_response()
        }
        Err(e) => {
            error!("schema introspection failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "schema introspection failed" })),
            )
                .into_response()
        }
    }
}

async fn handle_table_schema(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Response {
    match state.db.introspect_schema().await {
        Ok(schema) => match schema.table(&table) {
            Some(table) => {
                let columns: Vec<_> = table
                    .columns
                    .iter()
                    .map(|c| {
                        json!({
                            "name": c.name,
                            "type": c.data_type,
                            "nullable": c.is_nullable,
                        })
                    })
                    .collect();
                (
                    StatusCode::OK,
                    Json(json!({ "table": table.name, "columns": columns })),
                )
                    .into_response()
            }
            None => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("table '{table}' not found") })),
            )
                .into_response(),
        },
        Err(e) => {
            error!("schema introspection failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "schema introspection failed" })),
            )
                .into_response()
        }
    }
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
        .into_response()
}
