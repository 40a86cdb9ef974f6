use crate::{env_parse, env_required, ConfigError, FromEnv};

/// Postgres holding the delivery log and the settings table
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            connect_timeout_secs: 8,
        }
    }
}

impl FromEnv for DatabaseConfig {
    /// DATABASE_URL is required; pool settings have defaults
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_required("DATABASE_URL")?,
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10)?,
            connect_timeout_secs: env_parse("DATABASE_CONNECT_TIMEOUT_SECS", 8)?,
        })
    }
}
