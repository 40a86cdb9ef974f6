//! Queue processor.
//!
//! One drain cycle takes the drain lease, reads up to `batch_size` queued
//! unclaimed entries by priority then age, and attempts each one. An entry is
//! claimed right before the provider call, so a drain that outlives its lease
//! cannot race a second drain into sending the same entry twice. Every write
//! back to the log is conditional on the status and retry count that were read.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{error, info, instrument, warn};

use crate::dispatcher::EmailDispatcher;
use crate::error::{DispatchError, DispatchResult};
use crate::metrics;
use crate::models::{DeliveryStatus, DrainSummary, EmailLogEntry};
use crate::rate_limit::{RateDecision, RateLimitContext};
use crate::sender::RenderedMessage;
use crate::settings::EmailSettings;

/// What happened to one queued entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Sent,
    /// Failed for good.
    Failed,
    /// Failed but has retries left.
    Retrying,
    Deferred,
    /// Another writer changed the row first.
    Lost,
}

impl EmailDispatcher {
    /// Run one drain cycle.
    ///
    /// Returns `skipped` without reading anything if another worker holds the
    /// drain lease. `batch_size` falls back to the configured drain size.
    #[instrument(skip(self))]
    pub async fn drain_queue(&self, batch_size: Option<usize>) -> DispatchResult<DrainSummary> {
        let batch_size = batch_size.unwrap_or(self.config.drain_batch_size);
        if batch_size == 0 {
            return Err(DispatchError::InvalidInput(
                "drain batch size must be greater than zero".into(),
            ));
        }

        let Some(token) = self.lease.acquire(self.config.lease_ttl).await? else {
            metrics::drain_skipped();
            info!("Drain lease held elsewhere, skipping cycle");
            return Ok(DrainSummary {
                skipped: true,
                ..DrainSummary::default()
            });
        };

        let result = self.drain_locked(batch_size).await;

        if let Err(e) = self.lease.release(&token).await {
            warn!(error = %e, "Failed to release drain lease");
        }
        result
    }

    async fn drain_locked(&self, batch_size: usize) -> DispatchResult<DrainSummary> {
        let settings = self.sendable_settings().await?;
        let entries = self.log.queued_batch(batch_size, Utc::now()).await?;
        let mut summary = DrainSummary::default();

        for entry in entries {
            let id = entry.id;
            match self.process_entry(&settings, entry).await {
                Ok(EntryOutcome::Sent) => summary.processed += 1,
                Ok(EntryOutcome::Failed) => summary.failed += 1,
                Ok(EntryOutcome::Deferred) => summary.deferred += 1,
                Ok(EntryOutcome::Retrying) | Ok(EntryOutcome::Lost) => {}
                Err(e) => error!(entry_id = %id, error = %e, "Failed to process queued email"),
            }
        }

        summary.remaining = self.log.count_by_status(DeliveryStatus::Queued).await?;
        metrics::queue_remaining(summary.remaining);

        info!(
            processed = summary.processed,
            failed = summary.failed,
            deferred = summary.deferred,
            remaining = summary.remaining,
            "Drain cycle complete"
        );
        Ok(summary)
    }

    async fn process_entry(
        &self,
        settings: &EmailSettings,
        mut entry: EmailLogEntry,
    ) -> DispatchResult<EntryOutcome> {
        let read_status = entry.status;
        let read_retry_count = entry.retry_count;

        if entry.needs_render() {
            let template_id = entry.template_id.clone().unwrap_or_default();
            let variables = entry.template_variables.clone().unwrap_or_default();
            match self.templates.render(&template_id, &variables) {
                Ok(rendered) => {
                    entry.subject = rendered.subject;
                    entry.html = Some(rendered.html);
                    entry.text = Some(rendered.text);
                }
                Err(e) => {
                    entry.mark_failed(e.to_string());
                    return self.write_back(&entry, read_status, read_retry_count).await;
                }
            }
        }

        let message = match RenderedMessage::from_entry(&entry) {
            Some(message) => message,
            None => {
                entry.mark_failed("entry has neither content nor a template");
                return self.write_back(&entry, read_status, read_retry_count).await;
            }
        };
        if let Err(e) = message.validate() {
            entry.mark_failed(e.to_string());
            return self.write_back(&entry, read_status, read_retry_count).await;
        }

        let ctx = RateLimitContext::new(entry.trigger_category.clone(), entry.user_id.clone());
        if let RateDecision::Denied { reason, .. } = self.limiter.check(&ctx, &settings.limits).await? {
            info!(entry_id = %entry.id, %reason, "Queued email deferred by rate limit");
            return Ok(EntryOutcome::Deferred);
        }

        let now = Utc::now();
        let until = TimeDelta::from_std(self.config.claim_ttl())
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if !self.log.claim(entry.id, read_retry_count, until, now).await? {
            warn!(entry_id = %entry.id, "Queued email claimed by another drain, skipping");
            return Ok(EntryOutcome::Lost);
        }
        entry.claimed_until = Some(until);

        match self.sender.deliver(settings, &message).await {
            Ok(receipt) => {
                if let Err(e) = self.limiter.commit(&ctx).await {
                    warn!(entry_id = %entry.id, error = %e, "Email sent but rate-limit counters were not updated");
                }
                entry.mark_sent(receipt.message_id);
            }
            Err(e) => {
                entry.record_attempt_failure(e.to_string(), e.is_retryable(), self.config.max_retries);
            }
        }

        self.write_back(&entry, read_status, read_retry_count).await
    }

    async fn write_back(
        &self,
        entry: &EmailLogEntry,
        read_status: DeliveryStatus,
        read_retry_count: u32,
    ) -> DispatchResult<EntryOutcome> {
        if !self.log.update_if(entry, read_status, read_retry_count).await? {
            warn!(entry_id = %entry.id, "Queued email changed during processing, result discarded");
            return Ok(EntryOutcome::Lost);
        }

        metrics::record_outcome(&entry.trigger_category, entry.status);
        Ok(match entry.status {
            DeliveryStatus::Sent => EntryOutcome::Sent,
            DeliveryStatus::Failed => {
                warn!(
                    entry_id = %entry.id,
                    retry_count = entry.retry_count,
                    error = entry.last_error.as_deref().unwrap_or_default(),
                    "Queued email failed"
                );
                EntryOutcome::Failed
            }
            DeliveryStatus::Queued | DeliveryStatus::RateLimited => EntryOutcome::Retrying,
        })
    }
}
