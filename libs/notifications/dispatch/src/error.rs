//! Error types for the dispatch engine.
//!
//! Expected negative outcomes (rate-limit denials, provider failures) are not
//! errors: they come back as a [`SendOutcome`](crate::models::SendOutcome).
//! `DispatchError` covers configuration problems, malformed input and
//! infrastructure that is unavailable.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors that can occur while dispatching email.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The global enable flag is off.
    #[error("Email system is disabled")]
    Disabled,

    /// Sender name or address is missing from the settings.
    #[error("Sender identity is not configured: {0}")]
    MissingSenderIdentity(String),

    /// The request cannot be sent as given (no recipients, empty subject, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No template with this id exists in the catalog.
    #[error("Template {0} not found")]
    TemplateNotFound(String),

    /// The email provider rejected the request or could not be reached.
    #[error("Provider error: {message}")]
    Provider {
        message: String,
        status: Option<u16>,
    },

    /// The provider call did not complete in time.
    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    /// Delivery log read or write failed.
    #[error("Delivery log error: {0}")]
    Storage(String),

    /// Counter store or lease backend failed.
    #[error("Counter store error: {0}")]
    CounterStore(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Delivery log entry does not exist.
    #[error("Email log entry not found: {0}")]
    NotFound(Uuid),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Build a provider error from an HTTP status and message.
    pub fn provider(message: impl Into<String>, status: Option<u16>) -> Self {
        DispatchError::Provider {
            message: message.into(),
            status,
        }
    }

    /// Whether a later attempt can succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Provider { message, status } => {
                provider_failure_is_retryable(*status, message)
            }
            DispatchError::Timeout(_) => true,
            DispatchError::Storage(_) | DispatchError::CounterStore(_) => true,
            _ => false,
        }
    }

    /// Whether the error is caused by the email settings rather than the request.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DispatchError::Disabled
                | DispatchError::MissingSenderIdentity(_)
                | DispatchError::Config(_)
        )
    }
}

/// Classify a provider failure.
///
/// Authentication, validation and quota failures need operator action and are
/// never retried. Throttling, server errors and transport failures are.
pub fn provider_failure_is_retryable(status: Option<u16>, message: &str) -> bool {
    if let Some(code) = status {
        match code {
            400 | 401 | 403 | 422 => return false,
            429 => return true,
            500..=599 => return true,
            _ => {}
        }
    }

    let message = message.to_lowercase();
    const PERMANENT: [&str; 6] = [
        "invalid api key",
        "unauthorized",
        "invalid email",
        "invalid recipient",
        "quota exceeded",
        "template not found",
    ];

    !PERMANENT.iter().any(|needle| message.contains(needle))
}

impl From<redis::RedisError> for DispatchError {
    fn from(err: redis::RedisError) -> Self {
        DispatchError::CounterStore(err.to_string())
    }
}

impl From<sea_orm::DbErr> for DispatchError {
    fn from(err: sea_orm::DbErr) -> Self {
        DispatchError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        DispatchError::Provider {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Internal(format!("JSON serialization error: {}", err))
    }
}

impl From<core_config::ConfigError> for DispatchError {
    fn from(err: core_config::ConfigError) -> Self {
        DispatchError::Config(err.to_string())
    }
}
