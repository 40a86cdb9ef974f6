use std::time::Duration;

use core_config::{env_parse, ConfigError, FromEnv};

/// Slack added to the provider timeout when claiming a queued entry.
const CLAIM_MARGIN: Duration = Duration::from_secs(30);

/// Tuning knobs for retries, batching, draining and provider calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Provider attempts before an entry is terminally failed.
    pub max_retries: u32,
    /// Chunk size for `send_batch`.
    pub batch_size: usize,
    /// Pause between batch chunks.
    pub inter_batch_delay: Duration,
    /// Entries read per drain cycle.
    pub drain_batch_size: usize,
    /// Upper bound on a single provider call.
    pub provider_timeout: Duration,
    /// Drain lease lifetime; must outlast one full drain cycle, that is
    /// `drain_batch_size` provider calls.
    pub lease_ttl: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            batch_size: 100,
            inter_batch_delay: Duration::from_millis(1000),
            drain_batch_size: 10,
            provider_timeout: Duration::from_secs(15),
            lease_ttl: Duration::from_secs(300),
        }
    }
}

impl DispatchConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.inter_batch_delay = delay;
        self
    }

    pub fn with_drain_batch_size(mut self, size: usize) -> Self {
        self.drain_batch_size = size;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// How long one drain holds an entry it is about to send.
    pub fn claim_ttl(&self) -> Duration {
        self.provider_timeout + CLAIM_MARGIN
    }

    /// Longest a drain cycle can spend in provider calls.
    pub fn worst_case_drain(&self) -> Duration {
        self.provider_timeout
            .saturating_mul(u32::try_from(self.drain_batch_size).unwrap_or(u32::MAX))
    }

    /// Checks the relations between knobs that `from_env` cannot see one at a time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("EMAIL_BATCH_SIZE", self.batch_size),
            ("EMAIL_DRAIN_BATCH_SIZE", self.drain_batch_size),
        ] {
            if value == 0 {
                return Err(ConfigError::ParseError {
                    key: key.to_string(),
                    details: "must be greater than zero".to_string(),
                });
            }
        }

        if self.lease_ttl <= self.worst_case_drain() {
            return Err(ConfigError::ParseError {
                key: "EMAIL_DRAIN_LEASE_SECS".to_string(),
                details: format!(
                    "lease of {}s must exceed drain batch size x provider timeout ({}s)",
                    self.lease_ttl.as_secs(),
                    self.worst_case_drain().as_secs()
                ),
            });
        }

        Ok(())
    }
}

impl FromEnv for DispatchConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            max_retries: env_parse("EMAIL_MAX_RETRIES", defaults.max_retries)?,
            batch_size: env_parse("EMAIL_BATCH_SIZE", defaults.batch_size)?,
            inter_batch_delay: Duration::from_millis(env_parse(
                "EMAIL_INTER_BATCH_DELAY_MS",
                1000u64,
            )?),
            drain_batch_size: env_parse("EMAIL_DRAIN_BATCH_SIZE", defaults.drain_batch_size)?,
            provider_timeout: Duration::from_secs(env_parse("EMAIL_PROVIDER_TIMEOUT_SECS", 15u64)?),
            lease_ttl: Duration::from_secs(env_parse("EMAIL_DRAIN_LEASE_SECS", 300u64)?),
        };

        config.validate()?;
        Ok(config)
    }
}
