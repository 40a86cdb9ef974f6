//! Redis connection manager.

use core_config::redis::RedisConfig;
use redis::Client;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use crate::error::{DatabaseError, DatabaseResult};
use crate::retry::{Backoff, with_backoff};

async fn open(url: &str) -> redis::RedisResult<ConnectionManager> {
    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;

    // PING before handing the manager out
    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(manager)
}

/// Connect, retrying up to `config.connect_attempts` times
pub async fn connect(config: &RedisConfig) -> DatabaseResult<ConnectionManager> {
    let backoff = Backoff::default().with_attempts(config.connect_attempts);
    let manager = with_backoff("redis", backoff, || open(&config.url)).await?;
    info!("Connected to Redis");
    Ok(manager)
}

/// `PING` round trip
pub async fn check_health(conn: &ConnectionManager) -> DatabaseResult<()> {
    debug!("Running Redis health check");
    let mut conn = conn.clone();
    let reply: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| DatabaseError::HealthCheckFailed(format!("Redis: {}", e)))?;

    if reply != "PONG" {
        return Err(DatabaseError::HealthCheckFailed(format!(
            "Redis PING returned {}",
            reply
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_connect() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let conn = connect(&RedisConfig::new(url)).await.unwrap();
        check_health(&conn).await.unwrap();
    }
}
