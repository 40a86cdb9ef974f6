//! Email Dispatch Worker
//!
//! Drains the email queue on a cron schedule and serves admin endpoints.
//!
//! ```text
//! cron (DRAIN_CRON) ──> EmailDispatcher::drain_queue
//!                            │
//!         ┌──────────────────┼───────────────────┐
//!         ▼                  ▼                   ▼
//!   Redis counters     Postgres email_logs   Resend API
//!   + drain lease      + email_settings
//!
//! admin HTTP: /health /stats /logs /logs/{id}/requeue /drain /metrics
//! ```
//!
//! Several workers may run side by side; the Redis lease keeps a single
//! drain active at a time.

pub mod config;
pub mod metrics;
pub mod routes;
pub mod scheduler;

use std::sync::Arc;

use core_config::{
    Environment, FromEnv, database::DatabaseConfig, redis::RedisConfig, server::ServerConfig,
};
use email_dispatch::{
    DispatchConfig, EmailDispatcher, EmailProvider, EmailSettings, MockProvider, PgDeliveryLog,
    PgSettingsStore, RedisCounterStore, RedisQueueLease, ResendProvider, SettingsStore,
    StaticSettingsStore,
};
use eyre::{Result, WrapErr};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::config::{ProviderKind, WorkerConfig};
use crate::routes::AppState;

fn build_provider(kind: ProviderKind) -> Result<Arc<dyn EmailProvider>> {
    Ok(match kind {
        ProviderKind::Resend => Arc::new(
            ResendProvider::from_env().wrap_err("Failed to configure Resend provider")?,
        ),
        ProviderKind::Mock => {
            warn!("Using mock email provider, nothing will be delivered");
            Arc::new(MockProvider::new())
        }
    })
}

/// Run the dispatch worker until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if configuration is invalid, a store is unreachable
/// at startup or the admin server cannot bind.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);
    metrics::init_metrics();

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting email dispatch worker"
    );

    let worker_config = WorkerConfig::from_env().wrap_err("Failed to load worker configuration")?;
    let dispatch_config =
        DispatchConfig::from_env().wrap_err("Failed to load dispatch configuration")?;
    let server_config = ServerConfig::from_env().wrap_err("Failed to load server configuration")?;
    let db_config = DatabaseConfig::from_env().wrap_err("Failed to load database configuration")?;
    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;

    let db = database::postgres::connect(&db_config)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    if worker_config.run_migrations {
        database::postgres::run_migrations::<migration::Migrator>(&db)
            .await
            .wrap_err("Failed to run migrations")?;
    }

    let redis = database::redis::connect(&redis_config)
        .await
        .wrap_err("Failed to connect to Redis")?;

    let settings: Arc<dyn SettingsStore> = if worker_config.settings_from_env {
        let settings =
            EmailSettings::from_env().wrap_err("Failed to load email settings from environment")?;
        info!(enabled = settings.enabled, "Email settings loaded from environment");
        Arc::new(StaticSettingsStore::new(settings))
    } else {
        Arc::new(PgSettingsStore::new(db.clone()))
    };

    let dispatcher = Arc::new(
        EmailDispatcher::new(
            settings,
            Arc::new(RedisCounterStore::new(redis.clone())),
            Arc::new(PgDeliveryLog::new(db)),
            build_provider(worker_config.provider)?,
        )
        .with_lease(Arc::new(RedisQueueLease::new(redis)))
        .with_config(dispatch_config),
    );

    let mut sched =
        scheduler::start_drain_schedule(dispatcher.clone(), &worker_config.drain_cron).await?;

    let app = routes::router(AppState { dispatcher });
    let addr = server_config.address();
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind admin server to {}", addr))?;
    info!(address = %addr, "Admin server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("Admin server failed")?;

    if let Err(e) = sched.shutdown().await {
        warn!(error = %e, "Scheduler did not shut down cleanly");
    }

    info!("Email dispatch worker stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
