use core_config::{ConfigError, FromEnv, env_flag, env_or_default};

/// Default drain schedule: every minute, at second 0.
pub const DEFAULT_DRAIN_CRON: &str = "0 * * * * *";

/// Which provider the worker sends through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Resend,
    /// Records sends in memory; for local runs without credentials.
    Mock,
}

/// Worker-level settings on top of the library configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Six-field cron expression (with seconds) for the queue drain
    pub drain_cron: String,
    /// Apply pending migrations at startup
    pub run_migrations: bool,
    /// Read email settings from `EMAIL_*` variables instead of the settings table
    pub settings_from_env: bool,
    pub provider: ProviderKind,
}

impl FromEnv for WorkerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let provider = match env_or_default("EMAIL_PROVIDER", "resend")
            .to_ascii_lowercase()
            .as_str()
        {
            "resend" => ProviderKind::Resend,
            "mock" => ProviderKind::Mock,
            other => {
                return Err(ConfigError::ParseError {
                    key: "EMAIL_PROVIDER".to_string(),
                    details: format!("unknown provider '{}', expected resend or mock", other),
                });
            }
        };

        Ok(Self {
            drain_cron: env_or_default("DRAIN_CRON", DEFAULT_DRAIN_CRON),
            run_migrations: env_flag("RUN_MIGRATIONS"),
            settings_from_env: env_flag("EMAIL_SETTINGS_FROM_ENV"),
            provider,
        })
    }
}
