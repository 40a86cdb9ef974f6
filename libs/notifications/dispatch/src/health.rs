//! Operational health of the dispatch pipeline.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::dispatcher::EmailDispatcher;
use crate::error::DispatchResult;
use crate::log::DeliveryStats;
use crate::models::DeliveryStatus;
use crate::rate_limit::Window;

/// Failures in the last hour above which a warning is raised.
pub const FAILURE_WARNING_THRESHOLD: u64 = 10;
/// Failures in the last hour above which the pipeline is unhealthy.
pub const FAILURE_ISSUE_THRESHOLD: u64 = 20;
/// Share of the global hourly ceiling that triggers a warning.
pub const HOURLY_USAGE_WARNING_RATIO: f64 = 0.9;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub queued: Option<u64>,
    pub failures_last_hour: Option<u64>,
    pub sent_this_hour: Option<u64>,
}

impl EmailDispatcher {
    /// Check settings, provider reachability, recent failures and hourly usage.
    ///
    /// Store read errors become warnings so the report itself always renders.
    #[instrument(skip(self))]
    pub async fn health(&self) -> HealthReport {
        self.health_at(Utc::now()).await
    }

    pub(crate) async fn health_at(&self, now: DateTime<Utc>) -> HealthReport {
        let mut report = HealthReport::default();

        let settings = match self.settings.load().await {
            Ok(settings) => {
                if let Err(e) = settings.ensure_sendable() {
                    report.issues.push(e.to_string());
                }
                Some(settings)
            }
            Err(e) => {
                report.issues.push(format!("Email settings unavailable: {}", e));
                None
            }
        };

        if let Err(e) = self.sender.health_check().await {
            report
                .issues
                .push(format!("Provider {} unhealthy: {}", self.sender.provider_name(), e));
        }

        match self.log.failures_since(now - Duration::hours(1)).await {
            Ok(failures) => {
                report.failures_last_hour = Some(failures);
                if failures > FAILURE_ISSUE_THRESHOLD {
                    report
                        .issues
                        .push(format!("{} emails failed in the last hour", failures));
                } else if failures > FAILURE_WARNING_THRESHOLD {
                    report
                        .warnings
                        .push(format!("{} emails failed in the last hour", failures));
                }
            }
            Err(e) => report
                .warnings
                .push(format!("Could not read recent failures: {}", e)),
        }

        match self.log.count_by_status(DeliveryStatus::Queued).await {
            Ok(queued) => report.queued = Some(queued),
            Err(e) => report
                .warnings
                .push(format!("Could not count queued emails: {}", e)),
        }

        match self.limiter.global_count(Window::Hour, now).await {
            Ok(sent) => {
                report.sent_this_hour = Some(sent);
                if let Some(settings) = &settings {
                    let ceiling = settings.limits.global_hourly;
                    if ceiling > 0 && sent as f64 > ceiling as f64 * HOURLY_USAGE_WARNING_RATIO {
                        report.warnings.push(format!(
                            "Global hourly usage at {}/{}",
                            sent, ceiling
                        ));
                    }
                }
            }
            Err(e) => report
                .warnings
                .push(format!("Could not read rate-limit counters: {}", e)),
        }

        report.healthy = report.issues.is_empty();
        if !report.healthy {
            warn!(issues = ?report.issues, "Email dispatch unhealthy");
        }
        report
    }

    /// Delivery totals since `since`.
    pub async fn stats(&self, since: DateTime<Utc>) -> DispatchResult<DeliveryStats> {
        self.log.stats(since).await
    }
}
