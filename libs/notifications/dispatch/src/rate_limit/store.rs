use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::DispatchResult;

/// Key-value store holding windowed counters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current values for `keys`, in order; missing or expired keys read as 0.
    async fn get_many(&self, keys: &[String]) -> DispatchResult<Vec<u64>>;

    /// Atomically increment `key`. A key created by this call expires after `ttl`.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> DispatchResult<u64>;
}

/// Process-local counter store for tests and single-instance runs.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: Mutex<HashMap<String, (u64, Instant)>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a counter to `value`, expiring after `ttl`.
    pub async fn set(&self, key: impl Into<String>, value: u64, ttl: Duration) {
        self.counters
            .lock()
            .await
            .insert(key.into(), (value, Instant::now() + ttl));
    }

    pub async fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .counters
            .lock()
            .await
            .iter()
            .filter(|(_, (_, expires_at))| *expires_at > now)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get_many(&self, keys: &[String]) -> DispatchResult<Vec<u64>> {
        let now = Instant::now();
        let counters = self.counters.lock().await;
        Ok(keys
            .iter()
            .map(|key| match counters.get(key) {
                Some((value, expires_at)) if *expires_at > now => *value,
                _ => 0,
            })
            .collect())
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> DispatchResult<u64> {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;
        let entry = counters
            .entry(key.to_string())
            .or_insert((0, now + ttl));
        if entry.1 <= now {
            *entry = (0, now + ttl);
        }
        entry.0 += 1;
        Ok(entry.0)
    }
}
