//! Transactional email dispatch.
//!
//! ```text
//!  send_email / send_template_email ──┐
//!  send_batch (chunked, paced) ───────┤
//!                                     ▼
//!                         ┌──────────────────────┐
//!   SettingsStore ──────▶ │    EmailDispatcher   │ ◀── TemplateCatalog
//!                         └──────────────────────┘
//!                           │         │        │
//!                           ▼         ▼        ▼
//!                     RateLimiter   Sender   DeliveryLog ◀── drain_queue
//!                     (Redis /      (Resend)  (Postgres /     (QueueLease)
//!                      memory)                 memory)
//! ```
//!
//! Every send attempt is recorded in the delivery log. Rate-limited and
//! retryable sends stay `queued` and are picked up by [`EmailDispatcher::drain_queue`].
//!
//! ```ignore
//! let dispatcher = EmailDispatcher::new(settings, counters, log, provider);
//! let outcome = dispatcher
//!     .send_template_email(
//!         TemplateEmailRequest::new("emp@example.com", "payroll_generated", "payroll_generated")
//!             .var("month", "October")
//!             .for_user(user_id),
//!     )
//!     .await?;
//! ```

pub mod batch;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod lease;
pub mod log;
pub mod metrics;
pub mod models;
pub mod provider;
pub mod queue;
pub mod rate_limit;
pub mod sender;
pub mod settings;
pub mod templates;
pub mod triggers;

pub use config::DispatchConfig;
pub use dispatcher::EmailDispatcher;
pub use error::{DispatchError, DispatchResult};
pub use health::HealthReport;
pub use lease::{InMemoryQueueLease, QueueLease, RedisQueueLease};
pub use log::{
    DeliveryLog, DeliveryStats, InMemoryDeliveryLog, LogFilter, MAX_LIST_LIMIT, PgDeliveryLog,
};
pub use models::{
    Attachment, BatchSummary, DeliveryStatus, DrainSummary, EmailLogEntry, EmailPriority,
    SendEmailRequest, SendOutcome, TemplateEmailRequest, TemplateVariables,
};
pub use provider::{EmailProvider, MockProvider, ResendProvider};
pub use rate_limit::{
    CounterStore, InMemoryCounterStore, RateDecision, RateLimiter, RedisCounterStore,
    TriggerPolicies, TriggerPolicy,
};
pub use settings::{EmailSettings, PgSettingsStore, RateLimitCeilings, SettingsStore, StaticSettingsStore};
pub use templates::{EmailTemplate, TemplateCatalog};
pub use triggers::Trigger;
