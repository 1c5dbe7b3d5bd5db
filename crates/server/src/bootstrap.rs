use std::sync::Arc;
use std::time::Duration;

use livequote_agent::{ConsultationRuntime, OracleClient, OracleError, RuntimeSettings};
use livequote_core::audit::TracingAuditSink;
use livequote_core::config::AppConfig;
use livequote_db::{connect_from_config, migrations, DbPool, SqlInventoryService};
use livequote_stream::InMemorySessionRegistry;
use thiserror::Error;
use tracing::info;

use crate::health::HealthState;
use crate::routes::ApiState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<ConsultationRuntime>,
}

impl Application {
    pub fn api_state(&self) -> ApiState {
        ApiState { runtime: self.runtime.clone() }
    }

    pub fn health_state(&self) -> HealthState {
        HealthState { db_pool: self.db_pool.clone(), runtime: self.runtime.clone() }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("oracle client could not be built: {0}")]
    Oracle(#[source] OracleError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let oracle = OracleClient::from_config(&config).map_err(BootstrapError::Oracle)?;
    let registry =
        InMemorySessionRegistry::new(Duration::from_secs(config.stream.heartbeat_secs.max(1)));
    let runtime = ConsultationRuntime::new(
        Arc::new(oracle),
        Arc::new(registry),
        Arc::new(SqlInventoryService::new(db_pool.clone())),
        Arc::new(TracingAuditSink),
        RuntimeSettings::from_config(&config),
    );
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        llm_model = %config.llm.model,
        heartbeat_secs = config.stream.heartbeat_secs,
        "consultation runtime initialized"
    );

    Ok(Application { config, db_pool, runtime: Arc::new(runtime) })
}
