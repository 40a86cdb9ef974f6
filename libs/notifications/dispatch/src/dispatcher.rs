//! Immediate and template sends.
//!
//! Every call writes exactly one delivery log entry, except when the email
//! settings forbid sending, which is returned as an error before anything is
//! persisted.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::lease::{InMemoryQueueLease, QueueLease};
use crate::log::DeliveryLog;
use crate::metrics;
use crate::models::{
    DeliveryStatus, EmailLogEntry, SendEmailRequest, SendOutcome, TemplateEmailRequest,
};
use crate::provider::EmailProvider;
use crate::rate_limit::{CounterStore, RateDecision, RateLimitContext, RateLimiter, TriggerPolicies};
use crate::sender::{RenderedMessage, Sender};
use crate::settings::{EmailSettings, SettingsStore};
use crate::templates::TemplateCatalog;

/// Entry point for sending, queueing and draining transactional email.
#[derive(Clone)]
pub struct EmailDispatcher {
    pub(crate) settings: Arc<dyn SettingsStore>,
    pub(crate) limiter: RateLimiter,
    pub(crate) templates: Arc<TemplateCatalog>,
    pub(crate) log: Arc<dyn DeliveryLog>,
    pub(crate) provider: Arc<dyn EmailProvider>,
    pub(crate) sender: Sender,
    pub(crate) lease: Arc<dyn QueueLease>,
    pub(crate) config: DispatchConfig,
}

impl EmailDispatcher {
    /// Dispatcher with the built-in templates and trigger policies, default
    /// tuning and a process-local drain lease.
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        counters: Arc<dyn CounterStore>,
        log: Arc<dyn DeliveryLog>,
        provider: Arc<dyn EmailProvider>,
    ) -> Self {
        let config = DispatchConfig::default();
        Self {
            settings,
            limiter: RateLimiter::new(counters),
            templates: Arc::new(TemplateCatalog::builtin()),
            log,
            sender: Sender::new(provider.clone(), config.provider_timeout),
            provider,
            lease: Arc::new(InMemoryQueueLease::new()),
            config,
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Dispatch config allows a drain to outlive its lease");
        }
        self.sender = Sender::new(self.provider.clone(), config.provider_timeout);
        self.config = config;
        self
    }

    pub fn with_templates(mut self, templates: TemplateCatalog) -> Self {
        self.templates = Arc::new(templates);
        self
    }

    pub fn with_policies(mut self, policies: TriggerPolicies) -> Self {
        self.limiter = self.limiter.with_policies(policies);
        self
    }

    pub fn with_lease(mut self, lease: Arc<dyn QueueLease>) -> Self {
        self.lease = lease;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<dyn DeliveryLog> {
        &self.log
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Settings that allow sending, or the configuration error that forbids it.
    pub(crate) async fn sendable_settings(&self) -> DispatchResult<EmailSettings> {
        let settings = self.settings.load().await?;
        settings.ensure_sendable()?;
        Ok(settings)
    }

    /// Send a rendered message now.
    ///
    /// A rate-limit denial persists the entry as `queued` and reports
    /// `rate_limited`. Provider failures are reported in the outcome, not as
    /// errors.
    #[instrument(skip(self, request), fields(trigger = %request.trigger_category, user_id = ?request.user_id))]
    pub async fn send_email(&self, request: SendEmailRequest) -> DispatchResult<SendOutcome> {
        let settings = self.sendable_settings().await?;
        let message = RenderedMessage::from(&request);
        let entry = EmailLogEntry::from_request(&request, DeliveryStatus::Queued);

        self.attempt(&settings, entry, message).await
    }

    /// Render a catalog template and send it now.
    ///
    /// An unknown template id is recorded as a terminal `failed` entry.
    #[instrument(skip(self, request), fields(template = %request.template_id, trigger = %request.trigger_category))]
    pub async fn send_template_email(
        &self,
        request: TemplateEmailRequest,
    ) -> DispatchResult<SendOutcome> {
        let settings = self.sendable_settings().await?;

        let rendered = match self.templates.render(&request.template_id, &request.variables) {
            Ok(rendered) => rendered,
            Err(e @ DispatchError::TemplateNotFound(_)) => {
                let mut entry = EmailLogEntry::from_template(
                    &request,
                    request.template_id.clone(),
                    DeliveryStatus::Failed,
                );
                entry.mark_failed(e.to_string());
                return self.record_terminal(entry).await;
            }
            Err(e) => return Err(e),
        };

        let mut entry =
            EmailLogEntry::from_template(&request, rendered.subject.clone(), DeliveryStatus::Queued);
        entry.html = Some(rendered.html.clone());
        entry.text = Some(rendered.text.clone());

        let message = RenderedMessage {
            to: request.to.clone(),
            cc: request.cc.clone(),
            subject: rendered.subject,
            html: rendered.html,
            text: Some(rendered.text),
            attachments: Vec::new(),
        };

        self.attempt(&settings, entry, message).await
    }

    /// Persist a rendered message as `queued` without attempting it.
    #[instrument(skip(self, request), fields(trigger = %request.trigger_category))]
    pub async fn queue_email(&self, request: SendEmailRequest) -> DispatchResult<Uuid> {
        RenderedMessage::from(&request).validate()?;
        if !request.attachments.is_empty() {
            warn!("Attachments are not persisted and will be dropped from the queued email");
        }

        let entry = EmailLogEntry::from_request(&request, DeliveryStatus::Queued);
        self.log.insert(&entry).await?;
        metrics::email_queued(&entry.trigger_category);
        info!(entry_id = %entry.id, priority = %entry.priority, "Email queued");
        Ok(entry.id)
    }

    /// Persist a template reference as `queued`; the queue processor renders it.
    #[instrument(skip(self, request), fields(template = %request.template_id))]
    pub async fn queue_template_email(&self, request: TemplateEmailRequest) -> DispatchResult<Uuid> {
        let rendered = self.templates.render(&request.template_id, &request.variables)?;
        let entry = EmailLogEntry::from_template(&request, rendered.subject, DeliveryStatus::Queued);

        self.log.insert(&entry).await?;
        metrics::email_queued(&entry.trigger_category);
        info!(entry_id = %entry.id, priority = %entry.priority, "Template email queued");
        Ok(entry.id)
    }

    /// Move a `failed` or `rate_limited` entry back to `queued`.
    #[instrument(skip(self))]
    pub async fn requeue(&self, id: Uuid) -> DispatchResult<EmailLogEntry> {
        let mut entry = self.log.get(id).await?.ok_or(DispatchError::NotFound(id))?;
        let previous = entry.status;

        let requeueable = matches!(previous, DeliveryStatus::Failed | DeliveryStatus::RateLimited)
            && previous.can_transition_to(
                DeliveryStatus::Queued,
                entry.retry_count,
                self.config.max_retries,
            );
        if !requeueable {
            return Err(DispatchError::InvalidInput(format!(
                "entry {} is {} with {} of {} retries used and cannot be requeued",
                id, previous, entry.retry_count, self.config.max_retries
            )));
        }

        entry.status = DeliveryStatus::Queued;
        entry.updated_at = Utc::now();
        if !self.log.update_if(&entry, previous, entry.retry_count).await? {
            return Err(DispatchError::InvalidInput(format!(
                "entry {} changed while being requeued",
                id
            )));
        }

        info!(entry_id = %id, from = %previous, "Email requeued");
        Ok(entry)
    }

    /// Rate-check, send and log one entry that has not been persisted yet.
    async fn attempt(
        &self,
        settings: &EmailSettings,
        mut entry: EmailLogEntry,
        message: RenderedMessage,
    ) -> DispatchResult<SendOutcome> {
        if let Err(e) = message.validate() {
            entry.mark_failed(e.to_string());
            return self.record_terminal(entry).await;
        }

        let ctx = RateLimitContext::new(entry.trigger_category.clone(), entry.user_id.clone());
        if let RateDecision::Denied {
            reason,
            retry_after_secs,
            ..
        } = self.limiter.check(&ctx, &settings.limits).await?
        {
            entry.last_error = Some(reason.clone());
            self.log.insert(&entry).await?;
            metrics::email_rate_limited(&entry.trigger_category);
            info!(entry_id = %entry.id, %reason, retry_after_secs, "Send rate limited, entry queued");
            return Ok(SendOutcome::rate_limited(entry.id, reason, retry_after_secs));
        }

        match self.sender.deliver(settings, &message).await {
            Ok(receipt) => {
                if let Err(e) = self.limiter.commit(&ctx).await {
                    warn!(entry_id = %entry.id, error = %e, "Email sent but rate-limit counters were not updated");
                }
                entry.mark_sent(&receipt.message_id);
                self.log.insert(&entry).await?;
                metrics::email_sent(&entry.trigger_category);
                info!(entry_id = %entry.id, message_id = %receipt.message_id, "Email sent");
                Ok(SendOutcome::sent(entry.id, receipt.message_id))
            }
            Err(e) => {
                let error = e.to_string();
                let status =
                    entry.record_attempt_failure(&error, e.is_retryable(), self.config.max_retries);
                self.log.insert(&entry).await?;
                metrics::record_outcome(&entry.trigger_category, status);
                warn!(
                    entry_id = %entry.id,
                    status = %status,
                    retry_count = entry.retry_count,
                    error = %error,
                    "Email send failed"
                );
                Ok(SendOutcome::not_sent(entry.id, status, error))
            }
        }
    }

    async fn record_terminal(&self, entry: EmailLogEntry) -> DispatchResult<SendOutcome> {
        let error = entry.last_error.clone().unwrap_or_default();
        self.log.insert(&entry).await?;
        metrics::email_failed(&entry.trigger_category);
        debug!(entry_id = %entry.id, error = %error, "Email rejected without a provider call");
        Ok(SendOutcome::not_sent(entry.id, DeliveryStatus::Failed, error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{InMemoryDeliveryLog, MockDeliveryLog};
    use crate::provider::MockProvider;
    use crate::rate_limit::InMemoryCounterStore;
    use crate::settings::{RateLimitCeilings, StaticSettingsStore};

    struct Harness {
        dispatcher: EmailDispatcher,
        log: Arc<InMemoryDeliveryLog>,
        provider: Arc<MockProvider>,
        settings: Arc<StaticSettingsStore>,
    }

    fn harness_with(provider: MockProvider, limits: RateLimitCeilings) -> Harness {
        let settings = Arc::new(StaticSettingsStore::new(EmailSettings::enabled().with_limits(limits)));
        let log = Arc::new(InMemoryDeliveryLog::new());
        let provider = Arc::new(provider);
        let dispatcher = EmailDispatcher::new(
            settings.clone(),
            Arc::new(InMemoryCounterStore::new()),
            log.clone(),
            provider.clone(),
        );
        Harness {
            dispatcher,
            log,
            provider,
            settings,
        }
    }

    fn harness() -> Harness {
        harness_with(MockProvider::new(), RateLimitCeilings::default())
    }

    fn request() -> SendEmailRequest {
        SendEmailRequest::new("a@example.com", "Expense", "<p>Expense</p>", "large_expense")
            .for_user("u1")
    }

    #[tokio::test]
    async fn test_successful_send_is_logged_as_sent() {
        let h = harness();
        let outcome = h.dispatcher.send_email(request()).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.message_id.as_deref(), Some("mock-1"));

        let entry = h.log.get(outcome.entry_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(entry.status, DeliveryStatus::Sent);
        assert_eq!(entry.provider_message_id.as_deref(), Some("mock-1"));
        assert!(entry.last_error.is_none());
    }

    #[tokio::test]
    async fn test_disabled_persists_nothing() {
        let h = harness();
        h.settings.replace(EmailSettings::default()).await;

        let err = h.dispatcher.send_email(request()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Disabled));
        assert!(h.log.all().await.is_empty());
        assert_eq!(h.provider.attempts(), 0);
    }

    #[tokio::test]
    async fn test_rate_limited_send_is_queued() {
        let h = harness_with(
            MockProvider::new(),
            RateLimitCeilings {
                global_hourly: 2,
                ..RateLimitCeilings::default()
            },
        );

        for _ in 0..2 {
            assert!(h.dispatcher.send_email(request()).await.unwrap().success);
        }
        let third = h.dispatcher.send_email(request()).await.unwrap();

        assert!(!third.success);
        assert!(third.rate_limited);
        assert_eq!(third.retry_after, Some(3600));
        assert_eq!(third.error.as_deref(), Some("Global hourly rate limit exceeded"));

        let entry = h.log.get(third.entry_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(entry.status, DeliveryStatus::Queued);
        assert_eq!(entry.retry_count, 0);
        assert_eq!(h.provider.sent_count().await, 2);
    }

    #[tokio::test]
    async fn test_retryable_failure_queues_with_one_retry_used() {
        let h = harness();
        h.provider
            .fail_next(DispatchError::provider("upstream unavailable", Some(503)))
            .await;

        let outcome = h.dispatcher.send_email(request()).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.status, Some(DeliveryStatus::Queued));

        let entry = h.log.get(outcome.entry_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(entry.retry_count, 1);
        assert_eq!(entry.last_error.as_deref(), Some("Provider error: upstream unavailable"));
    }

    #[tokio::test]
    async fn test_non_retryable_failure_is_terminal() {
        let h = harness_with(
            MockProvider::failing("Invalid API key", Some(401)),
            RateLimitCeilings::default(),
        );

        let outcome = h.dispatcher.send_email(request()).await.unwrap();
        let entry = h.log.get(outcome.entry_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(entry.status, DeliveryStatus::Failed);
        assert_eq!(entry.retry_count, 0);
    }

    #[tokio::test]
    async fn test_malformed_input_is_terminal_without_provider_call() {
        let h = harness();
        let mut bad = request();
        bad.to = vec!["nobody".to_string()];

        let outcome = h.dispatcher.send_email(bad).await.unwrap();
        assert_eq!(outcome.status, Some(DeliveryStatus::Failed));
        assert_eq!(h.provider.attempts(), 0);
    }

    #[tokio::test]
    async fn test_template_send_renders_catalog_entry() {
        let h = harness();
        let request = TemplateEmailRequest::new("emp@example.com", "payroll_generated", "payroll_generated")
            .var("employeeName", "Layla")
            .var("month", "October")
            .var("year", 2025)
            .var("netSalary", "4,200")
            .for_user("u7");

        let outcome = h.dispatcher.send_template_email(request).await.unwrap();
        assert!(outcome.success);

        let sent = h.provider.sent().await;
        assert_eq!(sent[0].subject, "Your payslip for October 2025");
        assert!(sent[0].html.contains("4,200"));

        let entry = h.log.get(outcome.entry_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(entry.template_id.as_deref(), Some("payroll_generated"));
        assert!(entry.html.is_some());
    }

    #[tokio::test]
    async fn test_unknown_template_is_failed_never_queued() {
        let h = harness();
        let request = TemplateEmailRequest::new("a@example.com", "does_not_exist", "large_expense");

        let outcome = h.dispatcher.send_template_email(request).await.unwrap();
        assert!(!outcome.success);
        assert!(!outcome.rate_limited);

        let entries = h.log.all().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, DeliveryStatus::Failed);
        assert_eq!(h.provider.attempts(), 0);
    }

    #[tokio::test]
    async fn test_queue_email_and_template_reference() {
        let h = harness();
        let id = h.dispatcher.queue_email(request()).await.unwrap();
        assert_eq!(h.log.get(id).await.unwrap().unwrap().status, DeliveryStatus::Queued);

        let template = TemplateEmailRequest::new("a@example.com", "backup_failed", "backup_failed")
            .var("backupDate", "2025-10-05");
        let id = h.dispatcher.queue_template_email(template).await.unwrap();
        let entry = h.log.get(id).await.unwrap().unwrap();
        assert!(entry.needs_render());
        assert_eq!(entry.subject, "Backup FAILED - 2025-10-05");
        assert_eq!(h.provider.attempts(), 0);
    }

    #[tokio::test]
    async fn test_requeue_rules() {
        let h = harness_with(
            MockProvider::failing("invalid recipient", Some(422)),
            RateLimitCeilings::default(),
        );
        let outcome = h.dispatcher.send_email(request()).await.unwrap();
        let id = outcome.entry_id.unwrap();

        let requeued = h.dispatcher.requeue(id).await.unwrap();
        assert_eq!(requeued.status, DeliveryStatus::Queued);
        assert_eq!(h.log.get(id).await.unwrap().unwrap().status, DeliveryStatus::Queued);

        // queued entries are not requeueable
        assert!(matches!(h.dispatcher.requeue(id).await, Err(DispatchError::InvalidInput(_))));
        assert!(matches!(
            h.dispatcher.requeue(Uuid::new_v4()).await,
            Err(DispatchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let mut log = MockDeliveryLog::new();
        log.expect_insert()
            .returning(|_| Err(DispatchError::Storage("connection reset".into())));

        let dispatcher = EmailDispatcher::new(
            Arc::new(StaticSettingsStore::new(EmailSettings::enabled())),
            Arc::new(InMemoryCounterStore::new()),
            Arc::new(log),
            Arc::new(MockProvider::new()),
        );

        let err = dispatcher.send_email(request()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Storage(_)));
    }
}
