use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::trace;

use super::store::CounterStore;
use crate::error::DispatchResult;

const INCR_WITH_EXPIRY: &str = r"
local value = redis.call('INCR', KEYS[1])
if value == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return value
";

/// Redis-backed counters. Increment and expiry run as one script.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
    incr: redis::Script,
}

impl RedisCounterStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            incr: redis::Script::new(INCR_WITH_EXPIRY),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get_many(&self, keys: &[String]) -> DispatchResult<Vec<u64>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        // MGET even for a single key so the reply is always an array
        let values: Vec<Option<u64>> = redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
        Ok(values.into_iter().map(|v| v.unwrap_or(0)).collect())
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> DispatchResult<u64> {
        let mut conn = self.conn.clone();
        let value: u64 = self
            .incr
            .key(key)
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;

        trace!(key, value, "Counter incremented");
        Ok(value)
    }
}
