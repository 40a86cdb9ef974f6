//! Email settings: global enable flag, sender identity and rate-limit ceilings.
//!
//! Settings are owned by configuration storage and re-read on every request
//! through a [`SettingsStore`], so an operator flipping the enable flag takes
//! effect without a restart.

mod entity;
mod postgres;

pub use postgres::PgSettingsStore;

use std::collections::HashMap;

use async_trait::async_trait;
use core_config::{env_flag, env_or_default, env_parse, ConfigError, FromEnv};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{DispatchError, DispatchResult};

pub const DEFAULT_FROM_EMAIL: &str = "info@symbolai.net";
pub const DEFAULT_FROM_NAME: &str = "SymbolAI";
pub const DEFAULT_REPLY_TO: &str = "no-reply@symbolai.net";

/// Ceilings for the global and per-user scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitCeilings {
    pub global_hourly: u64,
    pub global_daily: u64,
    pub user_hourly: u64,
    pub user_daily: u64,
}

impl Default for RateLimitCeilings {
    fn default() -> Self {
        Self {
            global_hourly: 100,
            global_daily: 500,
            user_hourly: 10,
            user_daily: 30,
        }
    }
}

/// Process-wide email configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSettings {
    pub enabled: bool,
    pub from_email: String,
    pub from_name: String,
    pub reply_to: Option<String>,
    pub limits: RateLimitCeilings,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            from_email: DEFAULT_FROM_EMAIL.to_string(),
            from_name: DEFAULT_FROM_NAME.to_string(),
            reply_to: Some(DEFAULT_REPLY_TO.to_string()),
            limits: RateLimitCeilings::default(),
        }
    }
}

impl EmailSettings {
    /// Enabled settings with default identity and ceilings.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn with_limits(mut self, limits: RateLimitCeilings) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_sender(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.from_name = name.into();
        self.from_email = email.into();
        self
    }

    /// `"Name <address>"` as sent in the provider's `from` field.
    pub fn sender(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }

    /// Fail with a configuration error unless a send may go out.
    pub fn ensure_sendable(&self) -> DispatchResult<()> {
        if !self.enabled {
            return Err(DispatchError::Disabled);
        }
        if self.from_email.trim().is_empty() {
            return Err(DispatchError::MissingSenderIdentity(
                "from_email is empty".to_string(),
            ));
        }
        if self.from_name.trim().is_empty() {
            return Err(DispatchError::MissingSenderIdentity(
                "from_name is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Build settings from key/value rows, falling back to defaults for missing keys.
    ///
    /// Recognised keys: `global_enable`, `from_email`, `from_name`, `reply_to`,
    /// `rate_limit_global_hourly`, `rate_limit_global_daily`,
    /// `rate_limit_user_hourly`, `rate_limit_user_daily`.
    pub fn from_pairs(pairs: &HashMap<String, String>) -> DispatchResult<Self> {
        let defaults = Self::default();
        let text = |key: &str, fallback: &str| {
            pairs
                .get(key)
                .cloned()
                .unwrap_or_else(|| fallback.to_string())
        };
        let number = |key: &str, fallback: u64| -> DispatchResult<u64> {
            match pairs.get(key) {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    DispatchError::Config(format!("setting '{}' is not a number: {}", key, raw))
                }),
                None => Ok(fallback),
            }
        };

        let reply_to = match pairs.get("reply_to") {
            Some(value) if value.trim().is_empty() => None,
            Some(value) => Some(value.clone()),
            None => defaults.reply_to.clone(),
        };

        Ok(Self {
            enabled: pairs
                .get("global_enable")
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            from_email: text("from_email", &defaults.from_email),
            from_name: text("from_name", &defaults.from_name),
            reply_to,
            limits: RateLimitCeilings {
                global_hourly: number("rate_limit_global_hourly", defaults.limits.global_hourly)?,
                global_daily: number("rate_limit_global_daily", defaults.limits.global_daily)?,
                user_hourly: number("rate_limit_user_hourly", defaults.limits.user_hourly)?,
                user_daily: number("rate_limit_user_daily", defaults.limits.user_daily)?,
            },
        })
    }
}

impl FromEnv for EmailSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = RateLimitCeilings::default();
        let reply_to = env_or_default("EMAIL_REPLY_TO", DEFAULT_REPLY_TO);

        Ok(Self {
            enabled: env_flag("EMAIL_GLOBAL_ENABLE"),
            from_email: env_or_default("EMAIL_FROM", DEFAULT_FROM_EMAIL),
            from_name: env_or_default("EMAIL_FROM_NAME", DEFAULT_FROM_NAME),
            reply_to: (!reply_to.trim().is_empty()).then_some(reply_to),
            limits: RateLimitCeilings {
                global_hourly: env_parse("EMAIL_RATE_LIMIT_GLOBAL_HOURLY", defaults.global_hourly)?,
                global_daily: env_parse("EMAIL_RATE_LIMIT_GLOBAL_DAILY", defaults.global_daily)?,
                user_hourly: env_parse("EMAIL_RATE_LIMIT_USER_HOURLY", defaults.user_hourly)?,
                user_daily: env_parse("EMAIL_RATE_LIMIT_USER_DAILY", defaults.user_daily)?,
            },
        })
    }
}

/// Source of the current [`EmailSettings`].
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> DispatchResult<EmailSettings>;
}

/// In-process settings, swappable at runtime.
#[derive(Debug, Default)]
pub struct StaticSettingsStore {
    settings: RwLock<EmailSettings>,
}

impl StaticSettingsStore {
    pub fn new(settings: EmailSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Replace the settings seen by subsequent requests.
    pub async fn replace(&self, settings: EmailSettings) {
        *self.settings.write().await = settings;
    }
}

#[async_trait]
impl SettingsStore for StaticSettingsStore {
    async fn load(&self) -> DispatchResult<EmailSettings> {
        Ok(self.settings.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EmailSettings::default();
        assert!(!settings.enabled);
        assert_eq!(settings.sender(), "SymbolAI <info@symbolai.net>");
        assert_eq!(settings.limits.global_hourly, 100);
        assert_eq!(settings.limits.user_daily, 30);
    }

    #[test]
    fn test_ensure_sendable() {
        assert!(matches!(
            EmailSettings::default().ensure_sendable(),
            Err(DispatchError::Disabled)
        ));
        assert!(EmailSettings::enabled().ensure_sendable().is_ok());

        let blank = EmailSettings::enabled().with_sender("Ops", " ");
        assert!(matches!(
            blank.ensure_sendable(),
            Err(DispatchError::MissingSenderIdentity(_))
        ));
    }

    #[test]
    fn test_from_pairs() {
        let pairs: HashMap<String, String> = [
            ("global_enable", "true"),
            ("from_name", "Payroll"),
            ("rate_limit_global_hourly", "2"),
            ("reply_to", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let settings = EmailSettings::from_pairs(&pairs).unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.from_name, "Payroll");
        assert_eq!(settings.from_email, DEFAULT_FROM_EMAIL);
        assert_eq!(settings.limits.global_hourly, 2);
        assert_eq!(settings.limits.global_daily, 500);
        assert!(settings.reply_to.is_none());
    }

    #[test]
    fn test_from_pairs_rejects_non_numeric_ceiling() {
        let pairs: HashMap<String, String> =
            [("rate_limit_user_daily".to_string(), "many".to_string())].into();
        assert!(matches!(
            EmailSettings::from_pairs(&pairs),
            Err(DispatchError::Config(_))
        ));
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("EMAIL_GLOBAL_ENABLE", Some("true")),
                ("EMAIL_FROM", Some("hr@example.com")),
                ("EMAIL_FROM_NAME", None),
                ("EMAIL_REPLY_TO", None),
                ("EMAIL_RATE_LIMIT_GLOBAL_HOURLY", Some("7")),
                ("EMAIL_RATE_LIMIT_GLOBAL_DAILY", None),
                ("EMAIL_RATE_LIMIT_USER_HOURLY", None),
                ("EMAIL_RATE_LIMIT_USER_DAILY", None),
            ],
            || {
                let settings = EmailSettings::from_env().unwrap();
                assert!(settings.enabled);
                assert_eq!(settings.sender(), "SymbolAI <hr@example.com>");
                assert_eq!(settings.reply_to.as_deref(), Some(DEFAULT_REPLY_TO));
                assert_eq!(settings.limits.global_hourly, 7);
                assert_eq!(settings.limits.user_hourly, 10);
            },
        );
    }

    #[test]
    fn test_from_env_enable_requires_literal_true() {
        temp_env::with_var("EMAIL_GLOBAL_ENABLE", Some("yes"), || {
            assert!(!EmailSettings::from_env().unwrap().enabled);
        });
    }

    #[tokio::test]
    async fn test_static_store_replace() {
        let store = StaticSettingsStore::new(EmailSettings::enabled());
        assert!(store.load().await.unwrap().enabled);

        store.replace(EmailSettings::default()).await;
        assert!(!store.load().await.unwrap().enabled);
    }
}
