//! Resend email provider
//!
//! Sends email via the Resend HTTP API.

use async_trait::async_trait;
use core_config::{env_required, ConfigError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{EmailProvider, ProviderReceipt, ProviderRequest};
use crate::error::{DispatchError, DispatchResult};

/// Resend API endpoint
const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Resend email provider
#[derive(Clone)]
pub struct ResendProvider {
    api_key: String,
    endpoint: String,
    client: Client,
}

impl ResendProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: RESEND_API_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Create from `RESEND_API_KEY`
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(env_required("RESEND_API_KEY")?))
    }

    /// Point at a different base URL (local stubs).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    cc: &'a [String],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<ResendAttachment<'a>>,
}

#[derive(Debug, Serialize)]
struct ResendAttachment<'a> {
    filename: &'a str,
    content: &'a str,
    content_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResendSuccess {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ResendFailure {
    message: Option<String>,
}

impl<'a> From<&'a ProviderRequest> for ResendRequest<'a> {
    fn from(request: &'a ProviderRequest) -> Self {
        Self {
            from: &request.from,
            to: &request.to,
            cc: &request.cc,
            subject: &request.subject,
            html: &request.html,
            text: &request.text,
            reply_to: request.reply_to.as_deref(),
            attachments: request
                .attachments
                .iter()
                .map(|a| ResendAttachment {
                    filename: &a.filename,
                    content: &a.content,
                    content_type: &a.content_type,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl EmailProvider for ResendProvider {
    async fn send(&self, request: &ProviderRequest) -> DispatchResult<ProviderReceipt> {
        debug!(
            to = ?request.to,
            subject = %request.subject,
            "Sending email via Resend"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&ResendRequest::from(request))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            let success: ResendSuccess = serde_json::from_str(&body).map_err(|e| {
                DispatchError::provider(format!("unexpected Resend response: {}", e), Some(status.as_u16()))
            })?;
            debug!(message_id = %success.id, "Email accepted by Resend");
            return Ok(ProviderReceipt {
                message_id: success.id,
            });
        }

        let message = serde_json::from_str::<ResendFailure>(&body)
            .ok()
            .and_then(|f| f.message)
            .unwrap_or_else(|| format!("Resend error ({})", status));
        error!(status = %status, error = %message, "Resend API error");

        Err(DispatchError::provider(message, Some(status.as_u16())))
    }

    async fn health_check(&self) -> DispatchResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(DispatchError::Config("Resend API key not configured".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "resend"
    }
}
