//! Email provider implementations

mod mock;
mod resend;

pub use mock::MockProvider;
pub use resend::ResendProvider;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::DispatchResult;
use crate::models::Attachment;

/// Fully-built provider call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderRequest {
    /// `"Name <address>"`
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub reply_to: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReceipt {
    pub message_id: String,
}

/// Trait for email providers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send one message. Errors carry the provider's message and HTTP status.
    async fn send(&self, request: &ProviderRequest) -> DispatchResult<ProviderReceipt>;

    /// Check if the provider is usable
    async fn health_check(&self) -> DispatchResult<()>;

    /// Get provider name
    fn name(&self) -> &'static str;
}
