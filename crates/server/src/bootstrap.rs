use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use leadline_agent::{FunctionDispatcher, OpenAiChatClient, Orchestrator, SlotCache};
use leadline_core::config::{AppConfig, ConfigError, LoadOptions};
use leadline_core::errors::AppError;
use leadline_db::repositories::{
    SqlConversationDataRepository, SqlLeadRepository, SqlMeetingRepository, SqlMessageRepository,
    SqlSessionRepository,
};
use leadline_db::{connect_with_settings, migrations, DbPool};
use leadline_integrations::{CalcomClient, PipefyClient};

/// Composition root: everything the running server owns, wired once.
pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<Orchestrator>,
    pub slot_cache: Arc<SlotCache>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("integration client construction failed: {0}")]
    Integration(#[from] AppError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!("starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!("database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!("database migrations applied");

    let sessions = Arc::new(SqlSessionRepository::new(db_pool.clone()));
    let messages = Arc::new(SqlMessageRepository::new(db_pool.clone()));
    let data = Arc::new(SqlConversationDataRepository::new(db_pool.clone()));
    let leads = Arc::new(SqlLeadRepository::new(db_pool.clone()));
    let meetings = Arc::new(SqlMeetingRepository::new(db_pool.clone()));

    let slot_cache = Arc::new(SlotCache::new(config.slot_cache.max_sessions));
    let calendar = Arc::new(CalcomClient::new(&config.calendar)?);
    let crm = Arc::new(PipefyClient::new(&config.crm)?);
    let llm = Arc::new(OpenAiChatClient::new(&config.llm, &config.agent)?);

    let dispatcher = Arc::new(FunctionDispatcher::new(
        sessions.clone(),
        data.clone(),
        leads,
        meetings,
        slot_cache.clone(),
        calendar,
        crm,
    ));

    let orchestrator =
        Arc::new(Orchestrator::new(sessions, messages, data, llm, dispatcher, &config.agent));

    Ok(Application { config, db_pool, orchestrator, slot_cache })
}

#[cfg(test)]
mod tests {
    use leadline_core::config::{ConfigOverrides, LoadOptions};

    use super::{bootstrap, BootstrapError};

    fn valid_options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                llm_api_key: Some("sk-test".to_string()),
                calendar_api_key: Some("cal-test".to_string()),
                calendar_event_type_id: Some("evt-30min".to_string()),
                crm_api_key: Some("pipefy-test".to_string()),
                crm_pipe_id: Some("30123".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_llm_credentials() {
        let mut options = valid_options("sqlite::memory:");
        options.overrides.llm_api_key = None;

        let result = bootstrap(options).await;

        let error = result.err().expect("bootstrap must fail");
        assert!(matches!(error, BootstrapError::Config(_)));
        assert!(error.to_string().contains("llm.api_key"));
    }

    #[tokio::test]
    async fn bootstrap_runs_migrations_and_wires_the_conversation_path() {
        let app = bootstrap(valid_options("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN \
             ('chat_session', 'chat_message', 'conversation_data', 'lead', 'meeting')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected conversation tables to be available after bootstrap");
        assert_eq!(table_count, 5, "bootstrap should expose the conversation-path tables");

        assert!(app.slot_cache.is_empty().await);

        let history = app.orchestrator.history("s-inexistente").await;
        assert!(history.is_err(), "unknown session must report not found through the wiring");
    }
}
