//! Provider call for a fully-rendered message.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{DispatchError, DispatchResult};
use crate::metrics;
use crate::models::{Attachment, EmailLogEntry, SendEmailRequest};
use crate::provider::{EmailProvider, ProviderReceipt, ProviderRequest};
use crate::settings::EmailSettings;
use crate::templates::strip_html;

/// Concrete content ready for the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl From<&SendEmailRequest> for RenderedMessage {
    fn from(request: &SendEmailRequest) -> Self {
        Self {
            to: request.to.clone(),
            cc: request.cc.clone(),
            subject: request.subject.clone(),
            html: request.html.clone(),
            text: request.text.clone(),
            attachments: request.attachments.clone(),
        }
    }
}

impl RenderedMessage {
    /// Content stored on a log entry. `None` if the entry only holds a template reference.
    pub fn from_entry(entry: &EmailLogEntry) -> Option<Self> {
        let html = entry.html.clone()?;
        Some(Self {
            to: entry.to.clone(),
            cc: entry.cc.clone(),
            subject: entry.subject.clone(),
            html,
            text: entry.text.clone(),
            attachments: Vec::new(),
        })
    }

    /// Reject content that no provider would accept.
    pub fn validate(&self) -> DispatchResult<()> {
        if self.to.iter().all(|to| to.trim().is_empty()) {
            return Err(DispatchError::InvalidInput("at least one recipient is required".into()));
        }
        if let Some(bad) = self
            .to
            .iter()
            .chain(self.cc.iter())
            .find(|address| !looks_like_address(address))
        {
            return Err(DispatchError::InvalidInput(format!("invalid email address: {}", bad)));
        }
        if self.subject.trim().is_empty() {
            return Err(DispatchError::InvalidInput("subject is required".into()));
        }
        if self.html.trim().is_empty() {
            return Err(DispatchError::InvalidInput("html body is required".into()));
        }
        Ok(())
    }
}

fn looks_like_address(address: &str) -> bool {
    let address = address.trim();
    match address.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !address.contains(' '),
        None => false,
    }
}

/// Wraps an [`EmailProvider`] with request building and a call timeout.
///
/// The sender never retries; the caller decides what a failure means.
#[derive(Clone)]
pub struct Sender {
    provider: Arc<dyn EmailProvider>,
    timeout: Duration,
}

impl Sender {
    pub fn new(provider: Arc<dyn EmailProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn health_check(&self) -> DispatchResult<()> {
        self.provider.health_check().await
    }

    /// Provider request for `message` under the current sender identity.
    pub fn build_request(settings: &EmailSettings, message: &RenderedMessage) -> ProviderRequest {
        let text = message
            .text
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| strip_html(&message.html));

        ProviderRequest {
            from: settings.sender(),
            to: message.to.clone(),
            cc: message.cc.clone(),
            subject: message.subject.clone(),
            html: message.html.clone(),
            text,
            reply_to: settings.reply_to.clone(),
            attachments: message.attachments.clone(),
        }
    }

    /// Send `message` once.
    pub async fn deliver(
        &self,
        settings: &EmailSettings,
        message: &RenderedMessage,
    ) -> DispatchResult<ProviderReceipt> {
        message.validate()?;
        let request = Self::build_request(settings, message);

        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.provider.send(&request)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(self.timeout)),
        };
        metrics::provider_call(self.provider.name(), started.elapsed(), result.is_ok());

        match &result {
            Ok(receipt) => debug!(
                provider = self.provider.name(),
                message_id = %receipt.message_id,
                "Provider accepted email"
            ),
            Err(e) => warn!(
                provider = self.provider.name(),
                error = %e,
                retryable = e.is_retryable(),
                "Provider call failed"
            ),
        }

        result
    }
}
