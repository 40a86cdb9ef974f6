//! Shared test infrastructure for the dispatch crates
//!
//! - `TestDatabase`: PostgreSQL container with the email schema migrated (feature: "postgres")
//! - `TestRedis`: Redis container with a connection manager (feature: "redis")
//! - `TestDataBuilder`: deterministic ids and addresses (always available)
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true, features = ["redis", "postgres"] }
//! ```
//!
//! ```rust,ignore
//! use test_utils::{TestDatabase, TestRedis};
//!
//! #[tokio::test]
//! #[ignore] // Requires Docker
//! async fn my_store_test() {
//!     let db = TestDatabase::new().await;
//!     let redis = TestRedis::new().await;
//!     let log = PgDeliveryLog::new(db.connection());
//!     let counters = RedisCounterStore::new(redis.connection());
//! }
//! ```

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

#[cfg(feature = "redis")]
pub use redis::TestRedis;

/// Deterministic test data keyed by test name
///
/// Two builders made from the same name produce the same values, so rows
/// written by one test never collide with another's.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Seed from a hash of the test name
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Opaque user id for rate-limit scoping
    pub fn user_id(&self, suffix: &str) -> String {
        format!("user-{:x}-{}", self.seed, suffix)
    }

    /// Recipient address on the reserved example.com domain
    pub fn email(&self, local: &str) -> String {
        format!("{}+{:x}@example.com", local, self.seed)
    }
}
