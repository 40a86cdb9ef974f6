//! End-to-end dispatch against real Postgres and Redis containers.

use std::sync::Arc;
use std::time::Duration;

use email_dispatch::{
    DeliveryLog, DeliveryStatus, EmailDispatcher, EmailPriority, LogFilter, MockProvider,
    PgDeliveryLog, PgSettingsStore, QueueLease, RedisCounterStore, RedisQueueLease,
    SendEmailRequest, SettingsStore, TemplateEmailRequest,
};
use email_dispatch::rate_limit::{CounterStore, RateLimitContext, RateLimiter};
use test_utils::{TestDataBuilder, TestDatabase, TestRedis};

async fn enabled_settings(db: &TestDatabase) -> Arc<PgSettingsStore> {
    let settings = Arc::new(PgSettingsStore::new(db.connection()));
    settings.put("global_enable", "true").await.unwrap();
    settings
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_settings_round_trip() {
    let db = TestDatabase::new().await;
    let store = PgSettingsStore::new(db.connection());

    let defaults = store.load().await.unwrap();
    assert!(!defaults.enabled);
    assert_eq!(defaults.limits.global_hourly, 100);

    store.put("global_enable", "true").await.unwrap();
    store.put("rate_limit_user_daily", "7").await.unwrap();
    let updated = store.load().await.unwrap();
    assert!(updated.enabled);
    assert_eq!(updated.limits.user_daily, 7);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_redis_counters_expire_with_window() {
    let redis = TestRedis::new().await;
    let store = RedisCounterStore::new(redis.connection());

    assert_eq!(store.incr_with_expiry("k", Duration::from_secs(60)).await.unwrap(), 1);
    assert_eq!(store.incr_with_expiry("k", Duration::from_secs(60)).await.unwrap(), 2);
    assert_eq!(store.get_many(&["k".into(), "missing".into()]).await.unwrap(), vec![2, 0]);
    assert_eq!(store.get_many(&["k".into()]).await.unwrap(), vec![2]);

    let limiter = RateLimiter::new(Arc::new(store));
    let ctx = RateLimitContext::new("payroll_generated", Some("u1".into()));
    limiter.commit(&ctx).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_redis_lease_is_exclusive() {
    let redis = TestRedis::new().await;
    let a = RedisQueueLease::new(redis.connection());
    let b = RedisQueueLease::new(redis.connection());

    let token = a.acquire(Duration::from_secs(30)).await.unwrap().unwrap();
    assert!(b.acquire(Duration::from_secs(30)).await.unwrap().is_none());

    a.release(&token).await.unwrap();
    assert!(b.acquire(Duration::from_secs(30)).await.unwrap().is_some());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_queue_then_drain_through_real_stores() {
    let db = TestDatabase::new().await;
    let redis = TestRedis::new().await;
    let data = TestDataBuilder::from_test_name("test_queue_then_drain_through_real_stores");

    let log = Arc::new(PgDeliveryLog::new(db.connection()));
    let provider = Arc::new(MockProvider::new());
    let dispatcher = EmailDispatcher::new(
        enabled_settings(&db).await,
        Arc::new(RedisCounterStore::new(redis.connection())),
        log.clone(),
        provider.clone(),
    )
    .with_lease(Arc::new(RedisQueueLease::new(redis.connection())));

    let low = dispatcher
        .queue_email(
            SendEmailRequest::new(data.email("a"), "later", "<p>later</p>", "bonus_reminder")
                .with_priority(EmailPriority::Low),
        )
        .await
        .unwrap();
    let critical = dispatcher
        .queue_template_email(
            TemplateEmailRequest::new(data.email("it"), "backup_failed", "backup_failed")
                .var("backupDate", "2025-10-05")
                .var("errorMessage", "disk full")
                .with_priority(EmailPriority::Critical),
        )
        .await
        .unwrap();

    let summary = dispatcher.drain_queue(Some(10)).await.unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.remaining, 0);

    let subjects: Vec<String> = provider.sent().await.into_iter().map(|r| r.subject).collect();
    assert_eq!(subjects, vec!["Backup FAILED - 2025-10-05", "later"]);

    for id in [low, critical] {
        let entry = log.get(id).await.unwrap().unwrap();
        assert_eq!(entry.status, DeliveryStatus::Sent);
        assert!(entry.provider_message_id.is_some());
    }

    let sent = log
        .list(&LogFilter::default().with_status(DeliveryStatus::Sent))
        .await
        .unwrap();
    assert_eq!(sent.len(), 2);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_conditional_update_rejects_stale_writer() {
    let db = TestDatabase::new().await;
    let log = PgDeliveryLog::new(db.connection());

    let request = SendEmailRequest::new("a@example.com", "Hi", "<p>Hi</p>", "large_expense");
    let mut entry = email_dispatch::EmailLogEntry::from_request(&request, DeliveryStatus::Queued);
    log.insert(&entry).await.unwrap();

    let mut first = entry.clone();
    first.mark_sent("msg-1");
    assert!(log.update_if(&first, DeliveryStatus::Queued, 0).await.unwrap());

    entry.record_attempt_failure("timeout", true, 3);
    assert!(!log.update_if(&entry, DeliveryStatus::Queued, 0).await.unwrap());

    let stored = log.get(entry.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeliveryStatus::Sent);
    assert_eq!(stored.retry_count, 0);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_claim_hides_entry_from_other_drains() {
    let db = TestDatabase::new().await;
    let log = PgDeliveryLog::new(db.connection());

    let request = SendEmailRequest::new("a@example.com", "Hi", "<p>Hi</p>", "large_expense");
    let entry = email_dispatch::EmailLogEntry::from_request(&request, DeliveryStatus::Queued);
    log.insert(&entry).await.unwrap();

    let now = chrono::Utc::now();
    let until = now + chrono::Duration::seconds(45);
    assert!(log.claim(entry.id, 0, until, now).await.unwrap());
    assert!(!log.claim(entry.id, 0, until, now).await.unwrap());
    assert!(log.queued_batch(10, now).await.unwrap().is_empty());

    let expired = until + chrono::Duration::seconds(1);
    assert_eq!(log.queued_batch(10, expired).await.unwrap().len(), 1);

    let mut sent = entry.clone();
    sent.mark_sent("msg-1");
    assert!(log.update_if(&sent, DeliveryStatus::Queued, 0).await.unwrap());
    let stored = log.get(entry.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeliveryStatus::Sent);
    assert!(stored.claimed_until.is_none());
}
