use crate::{env_parse, env_required, ConfigError, FromEnv};

/// Redis backing the rate-limit counters and the drain lease
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub url: String,
    /// Connection attempts made at startup before giving up
    pub connect_attempts: u32,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_attempts: 5,
        }
    }
}

impl FromEnv for RedisConfig {
    /// REDIS_URL is required; REDIS_CONNECT_ATTEMPTS defaults to 5
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_required("REDIS_URL")?,
            connect_attempts: env_parse("REDIS_CONNECT_ATTEMPTS", 5)?,
        })
    }
}
