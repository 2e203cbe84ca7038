//! End-to-end orchestrator scenarios against the mock gateway and mock
//! database.

use std::sync::Arc;
use std::time::Duration;

use tabletalk::chat::{ChatLimits, ChatTurn, Orchestrator, TurnRole};
use tabletalk::db::{DatabaseClient, ExecLimits, MockDatabaseClient, QueryResult, Value};
use tabletalk::error::{ChatError, GatewayError};
use tabletalk::llm::{MockGateway, ResultExplainer, SqlGenerator};
use tabletalk::query::QueryExecutor;
use tabletalk::safety::SqlValidator;

async fn build_orchestrator(gateway: MockGateway, db: MockDatabaseClient) -> Orchestrator {
    build_with_limits(gateway, db, ChatLimits::default()).await
}

async fn build_with_limits(
    gateway: MockGateway,
    db: MockDatabaseClient,
    limits: ChatLimits,
) -> Orchestrator {
    let db = Arc::new(db);
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
        limits,
    )
}

// Scenario 1: a count question flows through generation, validation,
// execution, and explanation.
#[tokio::test]
async fn count_question_end_to_end() {
    let gateway = MockGateway::new()
        .push_text("I'll count them.\n\n```sql\nSELECT COUNT(*) FROM transactions;\n```")
        .push_text("There are 1,000,000 transactions in total.");
    let orchestrator = build_orchestrator(gateway, MockDatabaseClient::new()).await;

    let outcome = orchestrator
        .handle("How many transactions are there in total?", Vec::new())
        .await
        .unwrap();

    assert!(outcome.sql_executed);
    assert_eq!(
        outcome.sql_query.as_deref(),
        Some("SELECT COUNT(*) FROM transactions")
    );

    let result = outcome.query_results.as_ref().unwrap();
    assert_eq!(result.columns, vec!["count"]);
    assert_eq!(result.rows, vec![vec![Value::Int(1_000_000)]]);

    assert_eq!(outcome.reply, "I'll count them.");
    assert!(outcome.final_response.contains("1,000,000"));
    assert_eq!(
        outcome.explanation.as_ref().unwrap().text,
        "There are 1,000,000 transactions in total."
    );
}

// Scenario 2: a destructive request is rejected by the validator and
// never reaches the database.
#[tokio::test]
async fn destructive_request_is_gated() {
    let gateway = MockGateway::new().push_text("```sql\nDROP TABLE transactions;\n```");
    let orchestrator = build_orchestrator(gateway, MockDatabaseClient::new()).await;

    let outcome = orchestrator
        .handle("Drop the transactions table", Vec::new())
        .await
        .unwrap();

    assert!(!outcome.sql_executed);
    assert!(outcome.query_results.is_none());
    assert!(outcome.explanation.is_none());
    assert!(outcome.final_response.contains("DROP"));
    assert!(outcome.final_response.to_lowercase().contains("rejected"));
}

// Explanation absence: a failed second gateway call must not lose the
// executed result.
#[tokio::test]
async fn explanation_failure_is_non_fatal() {
    let gateway = MockGateway::new()
        .push_text("```sql\nSELECT COUNT(*) FROM transactions;\n```")
        .push_error(GatewayError::Timeout);
    let orchestrator = build_orchestrator(gateway, MockDatabaseClient::new()).await;

    let outcome = orchestrator
        .handle("How many transactions?", Vec::new())
        .await
        .unwrap();

    assert!(outcome.sql_executed);
    assert!(outcome.query_results.is_some());
    assert!(outcome.explanation.is_none());
    assert!(!outcome.final_response.is_empty());
}

// A database failure is surfaced in the answer, never retried.
#[tokio::test]
async fn execution_error_is_surfaced_once() {
    let gateway =
        MockGateway::new().push_text("```sql\nSELECT missing_column FROM transactions;\n```");
    let db = MockDatabaseClient::new();
    let orchestrator = {
        // A mock result keyed to the statement would succeed, so instead
        // route through a statement the failing client rejects.
        let db = Arc::new(db);
        let schema = Arc::new(db.introspect_schema().await.unwrap());
        let failing = Arc::new(tabletalk::db::FailingDatabaseClient::new(
            "ERROR: column \"missing_column\" does not exist",
        ));
        let gateway = Arc::new(gateway);
        let executor = Arc::new(QueryExecutor::new(
            failing,
            SqlValidator::default(),
            ExecLimits::default(),
        ));
        Orchestrator::new(
            SqlGenerator::new(gateway.clone(), 2048),
            ResultExplainer::new(gateway.clone(), 1024),
            executor,
            schema,
            ChatLimits::default(),
        )
    };

    let outcome = orchestrator
        .handle("Show me the missing column", Vec::new())
        .await
        .unwrap();

    assert!(!outcome.sql_executed);
    assert!(outcome.query_results.is_none());
    assert!(outcome.final_response.contains("missing_column"));
}

// The assistant's turn lands in the returned history with the user's.
#[tokio::test]
async fn both_turns_are_appended() {
    let gateway = MockGateway::new()
        .push_text("```sql\nSELECT COUNT(*) FROM transactions;\n```")
        .push_text("One million rows.");
    let orchestrator = build_orchestrator(gateway, MockDatabaseClient::new()).await;

    let history = vec![
        ChatTurn::user("hello"),
        ChatTurn::assistant("hi, ask me about the data"),
    ];
    let outcome = orchestrator.handle("count rows", history).await.unwrap();

    assert_eq!(outcome.conversation.len(), 4);
    assert_eq!(outcome.conversation[2].role, TurnRole::User);
    assert_eq!(outcome.conversation[2].text, "count rows");
    assert_eq!(outcome.conversation[3].role, TurnRole::Assistant);
    assert_eq!(outcome.conversation[3].text, "One million rows.");
}

// An auth fault is the one gateway failure that aborts the exchange.
#[tokio::test]
async fn auth_failure_aborts() {
    let gateway = MockGateway::new().push_error(GatewayError::AuthFailure);
    let orchestrator = build_orchestrator(gateway, MockDatabaseClient::new()).await;

    let err = orchestrator
        .handle("count rows", Vec::new())
        .await
        .unwrap_err();
    assert_eq!(err, ChatError::AuthFailure);
}

// The request budget bounds the whole exchange.
#[tokio::test]
async fn request_budget_is_enforced() {
    let gateway = MockGateway::new()
        .push_text("```sql\nSELECT COUNT(*) FROM transactions;\n```")
        .with_latency(Duration::from_millis(250));
    let limits = ChatLimits {
        request_budget: Duration::from_millis(10),
        history_window: 10,
    };
    let orchestrator = build_with_limits(gateway, MockDatabaseClient::new(), limits).await;

    let err = orchestrator
        .handle("count rows", Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::TimeoutExceeded(_)));
}

// Row caps flow through to the chat result.
#[tokio::test]
async fn truncated_results_are_flagged() {
    let many = {
        let rows = (0..200_i64).map(|i| vec![Value::Int(i)]).collect();
        QueryResult::with_data(vec!["row_id".to_string()], rows)
    };
    let db = MockDatabaseClient::new().with_result("select row_id", many);
    let gateway = MockGateway::new()
        .push_text("```sql\nSELECT row_id FROM transactions;\n```")
        .push_error(GatewayError::Unavailable("skip explanation".into()));
    let orchestrator = build_orchestrator(gateway, db).await;

    let outcome = orchestrator.handle("list all rows", Vec::new()).await.unwrap();

    let result = outcome.query_results.unwrap();
    assert_eq!(result.row_count, 50);
    assert!(result.truncated);
    assert!(outcome.final_response.contains("truncated"));
}
