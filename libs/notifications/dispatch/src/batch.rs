//! Paced fan-out of many immediate sends.

use std::time::Duration;

use tracing::{error, info, instrument};

use crate::dispatcher::EmailDispatcher;
use crate::error::{DispatchError, DispatchResult};
use crate::models::{BatchSummary, SendEmailRequest};

impl EmailDispatcher {
    /// Send `requests` in chunks of `batch_size`, pausing between chunks.
    ///
    /// Sends inside a chunk run one after another. Each request goes through
    /// [`EmailDispatcher::send_email`], so rate-limited requests end up queued
    /// rather than dropped. Only those count as `queued`; a retryable provider
    /// failure still counts as `failed` even though its entry stays queued.
    #[instrument(skip(self, requests), fields(total = requests.len()))]
    pub async fn send_batch(
        &self,
        requests: Vec<SendEmailRequest>,
        batch_size: Option<usize>,
        inter_batch_delay: Option<Duration>,
    ) -> DispatchResult<BatchSummary> {
        let batch_size = batch_size.unwrap_or(self.config.batch_size);
        if batch_size == 0 {
            return Err(DispatchError::InvalidInput(
                "batch size must be greater than zero".into(),
            ));
        }
        let delay = inter_batch_delay.unwrap_or(self.config.inter_batch_delay);

        self.sendable_settings().await?;

        let mut summary = BatchSummary::default();
        let mut pending = requests.into_iter().peekable();

        while pending.peek().is_some() {
            let chunk: Vec<SendEmailRequest> = pending.by_ref().take(batch_size).collect();
            summary.chunks += 1;

            for request in chunk {
                match self.send_email(request).await {
                    Ok(outcome) if outcome.success => summary.sent += 1,
                    Ok(outcome) if outcome.rate_limited => summary.queued += 1,
                    Ok(_) => summary.failed += 1,
                    Err(e) => {
                        error!(error = %e, chunk = summary.chunks, "Batch send failed");
                        summary.failed += 1;
                    }
                }
            }

            if pending.peek().is_some() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        info!(
            sent = summary.sent,
            queued = summary.queued,
            failed = summary.failed,
            chunks = summary.chunks,
            "Batch complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::log::{DeliveryLog, InMemoryDeliveryLog};
    use crate::models::DeliveryStatus;
    use crate::provider::MockProvider;
    use crate::rate_limit::InMemoryCounterStore;
    use crate::settings::{EmailSettings, RateLimitCeilings, StaticSettingsStore};

    fn dispatcher(
        provider: MockProvider,
        limits: RateLimitCeilings,
    ) -> (EmailDispatcher, Arc<InMemoryDeliveryLog>, Arc<MockProvider>) {
        let log = Arc::new(InMemoryDeliveryLog::new());
        let provider = Arc::new(provider);
        let dispatcher = EmailDispatcher::new(
            Arc::new(StaticSettingsStore::new(EmailSettings::enabled().with_limits(limits))),
            Arc::new(InMemoryCounterStore::new()),
            log.clone(),
            provider.clone(),
        );
        (dispatcher, log, provider)
    }

    fn roomy() -> RateLimitCeilings {
        RateLimitCeilings {
            global_hourly: 10_000,
            global_daily: 10_000,
            ..RateLimitCeilings::default()
        }
    }

    fn requests(n: usize) -> Vec<SendEmailRequest> {
        (0..n)
            .map(|i| {
                SendEmailRequest::new(
                    format!("user{}@example.com", i),
                    "Announcement",
                    "<p>Hello</p>",
                    "product_order_completed",
                )
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_are_paced() {
        let (dispatcher, log, provider) = dispatcher(MockProvider::new(), roomy());
        let started = tokio::time::Instant::now();

        let summary = dispatcher
            .send_batch(requests(250), Some(100), Some(Duration::from_secs(1)))
            .await
            .unwrap();

        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.sent, 250);
        assert_eq!(summary.failed + summary.queued, 0);
        assert_eq!(provider.sent_count().await, 250);
        assert_eq!(log.count_by_status(DeliveryStatus::Sent).await.unwrap(), 250);

        // two pauses, none after the last chunk
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_rate_limited_requests_are_queued() {
        let limits = RateLimitCeilings {
            global_hourly: 3,
            ..roomy()
        };
        let (dispatcher, log, _) = dispatcher(MockProvider::new(), limits);

        let summary = dispatcher
            .send_batch(requests(5), Some(2), Some(Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(summary.sent, 3);
        assert_eq!(summary.queued, 2);
        assert_eq!(summary.chunks, 3);
        assert_eq!(log.count_by_status(DeliveryStatus::Queued).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_provider_rejections_count_as_failed() {
        let (dispatcher, _, _) = dispatcher(MockProvider::failing("unauthorized", Some(401)), roomy());

        let summary = dispatcher
            .send_batch(requests(4), None, Some(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(summary.failed, 4);
        assert_eq!(summary.chunks, 1);
    }

    #[tokio::test]
    async fn test_retryable_failures_count_as_failed() {
        let (dispatcher, log, _) = dispatcher(
            MockProvider::failing("service unavailable", Some(503)),
            roomy(),
        );

        let summary = dispatcher
            .send_batch(requests(3), None, Some(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.queued, 0);
        assert_eq!(summary.sent, 0);
        // the entries themselves wait for the next drain
        assert_eq!(log.count_by_status(DeliveryStatus::Queued).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_disabled_batch_sends_nothing() {
        let log = Arc::new(InMemoryDeliveryLog::new());
        let dispatcher = EmailDispatcher::new(
            Arc::new(StaticSettingsStore::new(EmailSettings::default())),
            Arc::new(InMemoryCounterStore::new()),
            log.clone(),
            Arc::new(MockProvider::new()),
        );

        let err = dispatcher.send_batch(requests(3), None, None).await.unwrap_err();
        assert!(matches!(err, DispatchError::Disabled));
        assert!(log.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_and_zero_sized_batches() {
        let (dispatcher, _, _) = dispatcher(MockProvider::new(), roomy());

        let summary = dispatcher.send_batch(Vec::new(), None, None).await.unwrap();
        assert_eq!(summary, BatchSummary::default());

        assert!(matches!(
            dispatcher.send_batch(requests(1), Some(0), None).await,
            Err(DispatchError::InvalidInput(_))
        ));
    }
}
