//! Data model for the delivery log and the inbound send API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Variables substituted into a catalog template.
pub type TemplateVariables = Map<String, Value>;

// ============================================================================
// Priority and status
// ============================================================================

/// Send priority. Declaration order is drain order.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EmailPriority {
    /// Operational alerts (failed backups).
    Critical,
    /// Time-sensitive business events (payroll, request updates).
    High,
    /// Normal transactional email.
    #[default]
    Medium,
    /// Reminders and low-urgency notices.
    Low,
}

impl EmailPriority {
    /// Numeric rank used for storage ordering, `1` drains first.
    pub fn rank(self) -> i16 {
        match self {
            EmailPriority::Critical => 1,
            EmailPriority::High => 2,
            EmailPriority::Medium => 3,
            EmailPriority::Low => 4,
        }
    }
}

/// Delivery state of a log entry.
///
/// ```text
/// queued ──> sent                (terminal)
///    │
///    ├──> failed ──┐             (terminal once retry_count >= max_retries)
///    └──> rate_limited ──┐
///              ▲         │ requeue while retry_count < max_retries
///              └─────────┴──> queued
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    /// Waiting for the queue processor.
    Queued,
    /// Accepted by the provider.
    Sent,
    /// Gave up, see `last_error`.
    Failed,
    /// Rejected by the rate limiter.
    RateLimited,
}

impl DeliveryStatus {
    /// `sent` is always terminal; `failed` is terminal once retries are exhausted.
    pub fn is_terminal(self, retry_count: u32, max_retries: u32) -> bool {
        match self {
            DeliveryStatus::Sent => true,
            DeliveryStatus::Failed => retry_count >= max_retries,
            DeliveryStatus::Queued | DeliveryStatus::RateLimited => false,
        }
    }

    /// Whether `self -> next` is a legal transition for an entry at `retry_count`.
    pub fn can_transition_to(self, next: DeliveryStatus, retry_count: u32, max_retries: u32) -> bool {
        use DeliveryStatus::*;
        match (self, next) {
            (Queued, Sent) | (Queued, Failed) | (Queued, RateLimited) | (Queued, Queued) => true,
            (Failed, Queued) | (RateLimited, Queued) => retry_count < max_retries,
            (RateLimited, Failed) => true,
            _ => false,
        }
    }
}

// ============================================================================
// Inbound requests
// ============================================================================

/// File attached to an outgoing message. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    /// Base64-encoded file content.
    pub content: String,
    pub content_type: String,
}

/// A fully-rendered message to send immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailRequest {
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    pub subject: String,
    pub html: String,
    /// Plain-text body; derived from `html` when absent.
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub priority: EmailPriority,
    pub trigger_category: String,
    pub related_entity_id: Option<String>,
    pub user_id: Option<String>,
}

impl SendEmailRequest {
    /// Create a request with the required fields.
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        html: impl Into<String>,
        trigger_category: impl Into<String>,
    ) -> Self {
        Self {
            to: vec![to.into()],
            cc: Vec::new(),
            subject: subject.into(),
            html: html.into(),
            text: None,
            attachments: Vec::new(),
            priority: EmailPriority::Medium,
            trigger_category: trigger_category.into(),
            related_entity_id: None,
            user_id: None,
        }
    }

    /// Add another primary recipient.
    pub fn also_to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Add a CC recipient.
    pub fn with_cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    /// Set an explicit plain-text body.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_priority(mut self, priority: EmailPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Attribute the send to a user (enables user and trigger rate limits).
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn related_to(mut self, entity_id: impl Into<String>) -> Self {
        self.related_entity_id = Some(entity_id.into());
        self
    }
}

/// A send that renders a catalog template first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateEmailRequest {
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    pub template_id: String,
    #[serde(default)]
    pub variables: TemplateVariables,
    #[serde(default)]
    pub priority: EmailPriority,
    pub trigger_category: String,
    pub user_id: Option<String>,
    pub related_entity_id: Option<String>,
}

impl TemplateEmailRequest {
    pub fn new(
        to: impl Into<String>,
        template_id: impl Into<String>,
        trigger_category: impl Into<String>,
    ) -> Self {
        Self {
            to: vec![to.into()],
            cc: Vec::new(),
            template_id: template_id.into(),
            variables: TemplateVariables::new(),
            priority: EmailPriority::Medium,
            trigger_category: trigger_category.into(),
            user_id: None,
            related_entity_id: None,
        }
    }

    /// Set one template variable.
    pub fn var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn with_cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    pub fn with_priority(mut self, priority: EmailPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn related_to(mut self, entity_id: impl Into<String>) -> Self {
        self.related_entity_id = Some(entity_id.into());
        self
    }
}

// ============================================================================
// Delivery log entry
// ============================================================================

/// One send attempt as recorded in the delivery log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailLogEntry {
    pub id: Uuid,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    /// Rendered HTML; `None` while only a template reference is stored.
    pub html: Option<String>,
    pub text: Option<String>,
    pub template_id: Option<String>,
    pub template_variables: Option<TemplateVariables>,
    pub priority: EmailPriority,
    pub trigger_category: String,
    pub related_entity_id: Option<String>,
    pub user_id: Option<String>,
    pub status: DeliveryStatus,
    pub retry_count: u32,
    pub provider_message_id: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Drain claim; the entry is not selectable for draining until this passes.
    #[serde(default)]
    pub claimed_until: Option<DateTime<Utc>>,
}

impl EmailLogEntry {
    /// New entry for a rendered request.
    pub fn from_request(request: &SendEmailRequest, status: DeliveryStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            to: request.to.clone(),
            cc: request.cc.clone(),
            subject: request.subject.clone(),
            html: Some(request.html.clone()),
            text: request.text.clone(),
            template_id: None,
            template_variables: None,
            priority: request.priority,
            trigger_category: request.trigger_category.clone(),
            related_entity_id: request.related_entity_id.clone(),
            user_id: request.user_id.clone(),
            status,
            retry_count: 0,
            provider_message_id: None,
            last_error: None,
            created_at: now,
            sent_at: None,
            updated_at: now,
            claimed_until: None,
        }
    }

    /// New entry holding a template reference instead of rendered content.
    pub fn from_template(request: &TemplateEmailRequest, subject: String, status: DeliveryStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            to: request.to.clone(),
            cc: request.cc.clone(),
            subject,
            html: None,
            text: None,
            template_id: Some(request.template_id.clone()),
            template_variables: Some(request.variables.clone()),
            priority: request.priority,
            trigger_category: request.trigger_category.clone(),
            related_entity_id: request.related_entity_id.clone(),
            user_id: request.user_id.clone(),
            status,
            retry_count: 0,
            provider_message_id: None,
            last_error: None,
            created_at: now,
            sent_at: None,
            updated_at: now,
            claimed_until: None,
        }
    }

    /// Whether the queue processor must render the template before sending.
    pub fn needs_render(&self) -> bool {
        self.html.is_none() && self.template_id.is_some()
    }

    /// Whether a drain may claim this entry at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == DeliveryStatus::Queued && self.claimed_until.is_none_or(|until| until <= now)
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }

    /// Record a successful provider call.
    pub fn mark_sent(&mut self, provider_message_id: impl Into<String>) {
        let now = Utc::now();
        self.status = DeliveryStatus::Sent;
        self.provider_message_id = Some(provider_message_id.into());
        self.last_error = None;
        self.sent_at = Some(now);
        self.updated_at = now;
        self.claimed_until = None;
    }

    /// Record a non-retryable failure.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = DeliveryStatus::Failed;
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
        self.claimed_until = None;
    }

    /// Record a failed provider attempt and return the resulting status.
    ///
    /// Retryable failures bump `retry_count` (never past `max_retries`) and
    /// stay `queued` until the budget is spent.
    pub fn record_attempt_failure(
        &mut self,
        error: impl Into<String>,
        retryable: bool,
        max_retries: u32,
    ) -> DeliveryStatus {
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
        self.claimed_until = None;

        if !retryable {
            self.status = DeliveryStatus::Failed;
            return self.status;
        }

        self.retry_count = (self.retry_count + 1).min(max_retries);
        self.status = if self.retry_count >= max_retries {
            DeliveryStatus::Failed
        } else {
            DeliveryStatus::Queued
        };
        self.status
    }
}

// ============================================================================
// Results
// ============================================================================

/// Result of `send_email` / `send_template_email`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    pub entry_id: Option<Uuid>,
    pub status: Option<DeliveryStatus>,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub rate_limited: bool,
    /// Seconds until the denying window rolls over.
    pub retry_after: Option<u64>,
}

impl SendOutcome {
    pub fn sent(entry_id: Uuid, message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            entry_id: Some(entry_id),
            status: Some(DeliveryStatus::Sent),
            message_id: Some(message_id.into()),
            ..Default::default()
        }
    }

    pub fn rate_limited(entry_id: Uuid, reason: impl Into<String>, retry_after: u64) -> Self {
        Self {
            entry_id: Some(entry_id),
            status: Some(DeliveryStatus::Queued),
            error: Some(reason.into()),
            rate_limited: true,
            retry_after: Some(retry_after),
            ..Default::default()
        }
    }

    pub fn not_sent(entry_id: Uuid, status: DeliveryStatus, error: impl Into<String>) -> Self {
        Self {
            entry_id: Some(entry_id),
            status: Some(status),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Totals for one `send_batch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub sent: usize,
    pub failed: usize,
    pub queued: usize,
    pub chunks: usize,
}

/// Totals for one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainSummary {
    /// Entries that became `sent`.
    pub processed: usize,
    /// Entries that became terminally `failed`.
    pub failed: usize,
    /// Entries still `queued` after the cycle.
    pub remaining: u64,
    /// Entries left untouched because the rate limiter denied them.
    pub deferred: usize,
    /// Another worker held the drain lease; nothing was read.
    pub skipped: bool,
}
