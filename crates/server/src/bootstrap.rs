use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use vendedor_agent::{
    Collaborators, DisabledGenerator, GenerationError, MessageOrchestrator, OpenAiGenerator,
    TextGenerator,
};
use vendedor_core::config::{AppConfig, ConfigError, LlmProvider, LoadOptions, StorageBackend};
use vendedor_core::rate_limit::RateLimiter;
use vendedor_db::{
    connect_with_settings, migrations, CredentialStore, DbPool, DocumentStore, FileDocumentStore,
    InMemoryDocumentStore, RepositoryError, SqlDocumentStore,
};
use vendedor_transport::{ChatTransport, ConnectionSupervisor, NoopChatTransport, ReconnectPolicy};

pub struct Application {
    pub config: AppConfig,
    pub store: Arc<dyn DocumentStore>,
    /// Present only for the sqlite backend.
    pub db_pool: Option<DbPool>,
    pub rate_limiter: Arc<RateLimiter>,
    pub supervisor: Arc<ConnectionSupervisor>,
    pub orchestrator: Arc<MessageOrchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("document store could not be opened: {0}")]
    Storage(#[source] RepositoryError),
    #[error("text generator could not be configured: {0}")]
    Generator(#[source] GenerationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    bootstrap_with_transport(config, Arc::new(NoopChatTransport)).await
}

/// Wires every component around the given chat transport.
pub async fn bootstrap_with_transport(
    config: AppConfig,
    transport: Arc<dyn ChatTransport>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        storage_backend = ?config.storage.backend,
        llm_provider = ?config.llm.provider,
        "starting application bootstrap"
    );

    let (store, db_pool) = open_store(&config).await?;
    let generator = build_generator(&config)?;
    let rate_limiter = Arc::new(RateLimiter::new(config.engagement.rate_limit_policy()));

    let supervisor = Arc::new(ConnectionSupervisor::new(
        transport,
        CredentialStore::new(Arc::clone(&store)),
        ReconnectPolicy::from(&config.transport),
    ));
    let orchestrator = Arc::new(MessageOrchestrator::from_config(
        Collaborators {
            store: Arc::clone(&store),
            generator,
            sender: supervisor.clone(),
            rate_limiter: Arc::clone(&rate_limiter),
        },
        &config,
    ));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        "application components wired"
    );

    Ok(Application { config, store, db_pool, rate_limiter, supervisor, orchestrator })
}

async fn open_store(
    config: &AppConfig,
) -> Result<(Arc<dyn DocumentStore>, Option<DbPool>), BootstrapError> {
    let storage = &config.storage;
    match storage.backend {
        StorageBackend::File => {
            let store = FileDocumentStore::open(storage.data_dir.clone())
                .await
                .map_err(BootstrapError::Storage)?;
            info!(
                event_name = "system.bootstrap.store_opened",
                correlation_id = "bootstrap",
                data_dir = %store.root().display(),
                "file document store opened"
            );
            Ok((Arc::new(store), None))
        }
        StorageBackend::Sqlite => {
            let pool = connect_with_settings(
                &storage.database_url,
                storage.max_connections,
                storage.timeout_secs,
            )
            .await
            .map_err(BootstrapError::DatabaseConnect)?;
            info!(
                event_name = "system.bootstrap.database_connected",
                correlation_id = "bootstrap",
                "database connection established"
            );

            migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
            info!(
                event_name = "system.bootstrap.migrations_applied",
                correlation_id = "bootstrap",
                "database migrations applied"
            );
            Ok((Arc::new(SqlDocumentStore::new(pool.clone())), Some(pool)))
        }
        StorageBackend::Memory => Ok((Arc::new(InMemoryDocumentStore::default()), None)),
    }
}

fn build_generator(config: &AppConfig) -> Result<Arc<dyn TextGenerator>, BootstrapError> {
    if config.llm.provider == LlmProvider::Disabled {
        return Ok(Arc::new(DisabledGenerator));
    }
    let generator = OpenAiGenerator::from_config(&config.llm).map_err(BootstrapError::Generator)?;
    info!(
        event_name = "system.bootstrap.llm_configured",
        correlation_id = "bootstrap",
        endpoint = generator.completions_url(),
        model = %config.llm.model,
        "text generator configured"
    );
    Ok(Arc::new(generator))
}
