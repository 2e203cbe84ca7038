//! tabletalk — conversational SQL service for the fraud transactions
//! dashboard.

mod cli;

use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use tabletalk::chat::Orchestrator;
use tabletalk::config::{Config, ConnectionConfig};
use tabletalk::db::{self, DatabaseClient};
use tabletalk::llm::{
    AnthropicConfig, AnthropicGateway, LlmGateway, ResultExplainer, SqlGenerator,
};
use tabletalk::query::QueryExecutor;
use tabletalk::safety::SqlValidator;
use tabletalk::server::{self, AppState};

/// Generation budget for the explanation follow-up.
const EXPLANATION_MAX_TOKENS: u32 = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse_args();

    // Precedence: CLI flags over config file over PG* environment
    // defaults.
    let mut config = match &cli.config {
        Some(path) => {
            info!("loading config from {}", path.display());
            Config::load_from_file(path)?
        }
        None => Config::default(),
    };

    if let Some(url) = &cli.database_url {
        config.connection = ConnectionConfig::from_connection_string(url)?;
    }
    config.connection.apply_env_defaults();

    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    info!("database: {}", config.connection.display_string());
    let db: Arc<dyn DatabaseClient> =
        Arc::from(db::connect(&config.connection, config.limits.pool_size).await?);

    let schema = Arc::new(
        db.introspect_schema()
            .await
            .context("failed to introspect the database schema")?,
    );
    info!("schema loaded: {} table(s)", schema.tables.len());

    let api_key = config
        .llm
        .resolve_api_key()
        .context("no completion service credential; set ANTHROPIC_API_KEY")?;

    let mut gateway_config = AnthropicConfig::new(api_key, config.llm.model.clone());
    if let Some(endpoint) = &config.llm.endpoint {
        gateway_config = gateway_config.with_endpoint(endpoint.clone());
    }
    let gateway: Arc<dyn LlmGateway> = Arc::new(AnthropicGateway::new(gateway_config)?);

    let executor = Arc::new(QueryExecutor::new(
        db.clone(),
        SqlValidator::new(config.limits.max_statement_len),
        config.exec_limits(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        SqlGenerator::new(gateway.clone(), config.llm.max_tokens),
        ResultExplainer::new(gateway, EXPLANATION_MAX_TOKENS),
        executor.clone(),
        schema,
        config.chat_limits(),
    ));

    let state = AppState::new(orchestrator, executor, db);
    server::serve(state, &config.server.bind).await
}
