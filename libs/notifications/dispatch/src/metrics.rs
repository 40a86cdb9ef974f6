//! Dispatch metrics
//!
//! Recorded through the `metrics` facade; the binary decides which exporter
//! is installed.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::models::DeliveryStatus;

pub fn email_sent(trigger: &str) {
    counter!("email_dispatch_sent_total", "trigger" => trigger.to_string()).increment(1);
}

pub fn email_failed(trigger: &str) {
    counter!("email_dispatch_failed_total", "trigger" => trigger.to_string()).increment(1);
}

pub fn email_queued(trigger: &str) {
    counter!("email_dispatch_queued_total", "trigger" => trigger.to_string()).increment(1);
}

pub fn email_rate_limited(trigger: &str) {
    counter!("email_dispatch_rate_limited_total", "trigger" => trigger.to_string()).increment(1);
}

/// Count an entry by the status it ended in.
pub fn record_outcome(trigger: &str, status: DeliveryStatus) {
    match status {
        DeliveryStatus::Sent => email_sent(trigger),
        DeliveryStatus::Failed => email_failed(trigger),
        DeliveryStatus::Queued => email_queued(trigger),
        DeliveryStatus::RateLimited => email_rate_limited(trigger),
    }
}

/// Provider round-trip time.
pub fn provider_call(provider: &'static str, duration: Duration, success: bool) {
    histogram!(
        "email_dispatch_provider_seconds",
        "provider" => provider,
        "status" => if success { "success" } else { "error" }
    )
    .record(duration.as_secs_f64());
}

/// Entries still queued after a drain.
pub fn queue_remaining(remaining: u64) {
    gauge!("email_dispatch_queue_remaining").set(remaining as f64);
}

pub fn drain_skipped() {
    counter!("email_dispatch_drain_skipped_total").increment(1);
}
