//! PostgreSQL connection pool and migrations.

use std::time::Duration;

use core_config::database::DatabaseConfig;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use sea_orm_migration::MigratorTrait;
use tracing::{debug, info, log::LevelFilter};

use crate::error::{DatabaseError, DatabaseResult};
use crate::retry::{Backoff, with_backoff};

/// Pool options for `config`
pub fn connect_options(config: &DatabaseConfig) -> ConnectOptions {
    let timeout = Duration::from_secs(config.connect_timeout_secs);
    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(1)
        .connect_timeout(timeout)
        .acquire_timeout(timeout)
        .sqlx_logging(true)
        .sqlx_logging_level(LevelFilter::Debug); // SeaORM requires log::LevelFilter
    opt
}

/// Connect with the default backoff
pub async fn connect(config: &DatabaseConfig) -> DatabaseResult<DatabaseConnection> {
    connect_with_backoff(config, Backoff::default()).await
}

pub async fn connect_with_backoff(
    config: &DatabaseConfig,
    backoff: Backoff,
) -> DatabaseResult<DatabaseConnection> {
    let options = connect_options(config);
    let db = with_backoff("postgres", backoff, || Database::connect(options.clone())).await?;
    info!(max_connections = config.max_connections, "Connected to PostgreSQL");
    Ok(db)
}

/// Apply every pending migration of `M`
pub async fn run_migrations<M: MigratorTrait>(db: &DatabaseConnection) -> DatabaseResult<()> {
    info!("Running database migrations");
    M::up(db, None)
        .await
        .map_err(|e: DbErr| DatabaseError::MigrationError(e.to_string()))?;
    info!("Migrations complete");
    Ok(())
}

/// `SELECT 1` round trip
pub async fn check_health(db: &DatabaseConnection) -> DatabaseResult<()> {
    debug!("Running PostgreSQL health check");
    db.query_one_raw(Statement::from_string(db.get_database_backend(), "SELECT 1"))
        .await
        .map_err(|e| DatabaseError::HealthCheckFailed(format!("PostgreSQL: {}", e)))?;
    Ok(())
}
