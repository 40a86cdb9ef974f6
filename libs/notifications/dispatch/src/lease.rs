//! Time-boxed drain lease.
//!
//! A worker must hold the lease before it reads queued entries. The lease
//! expires on its own if the holder dies, and only the holder's token can
//! release it early.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::DispatchResult;

/// Redis key guarding the queue.
pub const DRAIN_LEASE_KEY: &str = "email:queue:drain-lease";

const RELEASE_IF_OWNER: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
";

/// Proof of lease ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken(String);

impl LeaseToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Exclusive, expiring right to drain the queue.
#[async_trait]
pub trait QueueLease: Send + Sync {
    /// Take the lease for `ttl`. `None` if someone else holds it.
    async fn acquire(&self, ttl: Duration) -> DispatchResult<Option<LeaseToken>>;

    /// Give the lease back. A no-op if it already expired or changed hands.
    async fn release(&self, token: &LeaseToken) -> DispatchResult<()>;
}

/// Lease stored as a Redis key with `SET NX PX`.
#[derive(Clone)]
pub struct RedisQueueLease {
    conn: ConnectionManager,
    key: String,
}

impl RedisQueueLease {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key: DRAIN_LEASE_KEY.to_string(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

#[async_trait]
impl QueueLease for RedisQueueLease {
    async fn acquire(&self, ttl: Duration) -> DispatchResult<Option<LeaseToken>> {
        let token = LeaseToken::generate();
        let mut conn = self.conn.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(|_| token))
    }

    async fn release(&self, token: &LeaseToken) -> DispatchResult<()> {
        let mut conn = self.conn.clone();
        let released: i64 = redis::Script::new(RELEASE_IF_OWNER)
            .key(&self.key)
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await?;

        if released == 0 {
            warn!(key = %self.key, "Drain lease expired before release");
        } else {
            debug!(key = %self.key, "Drain lease released");
        }
        Ok(())
    }
}

/// Process-local lease for tests and single-instance runs.
#[derive(Debug, Default)]
pub struct InMemoryQueueLease {
    holder: Mutex<Option<(LeaseToken, Instant)>>,
}

impl InMemoryQueueLease {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_held(&self) -> bool {
        matches!(&*self.holder.lock().await, Some((_, expires_at)) if *expires_at > Instant::now())
    }
}

#[async_trait]
impl QueueLease for InMemoryQueueLease {
    async fn acquire(&self, ttl: Duration) -> DispatchResult<Option<LeaseToken>> {
        let mut holder = self.holder.lock().await;
        let now = Instant::now();
        if let Some((_, expires_at)) = &*holder {
            if *expires_at > now {
                return Ok(None);
            }
        }

        let token = LeaseToken::generate();
        *holder = Some((token.clone(), now + ttl));
        Ok(Some(token))
    }

    async fn release(&self, token: &LeaseToken) -> DispatchResult<()> {
        let mut holder = self.holder.lock().await;
        if matches!(&*holder, Some((held, _)) if held == token) {
            *holder = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_lease_is_exclusive_until_expiry() {
        let lease = InMemoryQueueLease::new();
        let ttl = Duration::from_secs(120);

        let first = lease.acquire(ttl).await.unwrap();
        assert!(first.is_some());
        assert!(lease.acquire(ttl).await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(121)).await;
        assert!(lease.acquire(ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_only_holder_releases() {
        let lease = InMemoryQueueLease::new();
        let ttl = Duration::from_secs(60);
        let token = lease.acquire(ttl).await.unwrap().unwrap();

        lease.release(&LeaseToken::generate()).await.unwrap();
        assert!(lease.is_held().await);

        lease.release(&token).await.unwrap();
        assert!(!lease.is_held().await);
    }
}
