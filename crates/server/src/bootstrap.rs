use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use helpdesk_agent::{
    CalculatorTool, HttpLlmClient, LlmClassifier, LlmWorkflow, PolicySettings,
    SupportOrchestrator, ToolRegistry,
};
use helpdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use helpdesk_core::events::TracingEventSink;
use helpdesk_core::handoff::{HandoffService, HandoffSettings};
use helpdesk_db::{connect_with_settings, migrations, DbPool, SqlConversationStore};

use crate::routes::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client initialization failed: {0}")]
    Llm(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Wire the full turn pipeline: pool, store, handoff service, LLM seam,
/// classifier, workflow, orchestrator.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let store = Arc::new(SqlConversationStore::new(db_pool.clone()));

    let handoff = Arc::new(HandoffService::new(
        HandoffSettings {
            default_wait_time: config.handoff.default_wait_time,
            wait_time_message: config.handoff.wait_time_message.clone(),
        },
        Arc::new(TracingEventSink),
    ));

    let llm = Arc::new(
        HttpLlmClient::from_config(&config.llm)
            .map_err(|error| BootstrapError::Llm(error.to_string()))?,
    );
    let classifier =
        Arc::new(LlmClassifier::new(llm.clone(), config.handoff.sensitive_topics.clone()));

    let mut tools = ToolRegistry::default();
    tools.register(CalculatorTool);
    let engine =
        Arc::new(LlmWorkflow::new(llm, tools, config.handoff.confidence_threshold));

    let orchestrator = Arc::new(SupportOrchestrator::new(
        store.clone(),
        classifier,
        engine,
        handoff.clone(),
        PolicySettings::from_config(&config),
    ));
    info!(event_name = "system.bootstrap.pipeline_ready", "conversation pipeline assembled");

    Ok(Application { config, db_pool, state: AppState { chat: orchestrator, handoff, store } })
}
