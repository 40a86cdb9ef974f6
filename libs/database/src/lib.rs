//! Connection helpers for the stores behind email dispatch.
//!
//! # Features
//!
//! - `postgres` (default) - delivery log and settings via SeaORM
//! - `redis` (default) - rate-limit counters and the drain lease
//!
//! ```ignore
//! use core_config::{FromEnv, database::DatabaseConfig, redis::RedisConfig};
//!
//! let db = database::postgres::connect(&DatabaseConfig::from_env()?).await?;
//! database::postgres::run_migrations::<migration::Migrator>(&db).await?;
//!
//! let redis = database::redis::connect(&RedisConfig::from_env()?).await?;
//! ```

pub mod error;
pub mod retry;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis;

pub use error::{DatabaseError, DatabaseResult};
pub use retry::{Backoff, with_backoff};
