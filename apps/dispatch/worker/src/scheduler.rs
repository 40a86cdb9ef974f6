use std::sync::Arc;

use email_dispatch::EmailDispatcher;
use eyre::{Result, WrapErr};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Run one drain and log its outcome.
pub async fn drain_once(dispatcher: &EmailDispatcher) {
    match dispatcher.drain_queue(None).await {
        Ok(summary) if summary.skipped => {
            info!("Drain skipped, another worker holds the lease");
        }
        Ok(summary) => {
            info!(
                processed = summary.processed,
                failed = summary.failed,
                deferred = summary.deferred,
                remaining = summary.remaining,
                "Scheduled drain complete"
            );
        }
        Err(e) => error!(error = %e, "Scheduled drain failed"),
    }
}

/// Start a scheduler that drains the queue on `cron_expr`.
///
/// The returned scheduler keeps running until `shutdown` is called on it.
pub async fn start_drain_schedule(
    dispatcher: Arc<EmailDispatcher>,
    cron_expr: &str,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new()
        .await
        .wrap_err("Failed to create job scheduler")?;

    let job = Job::new_async(cron_expr, move |_uuid, _l| {
        let dispatcher = dispatcher.clone();
        Box::pin(async move {
            drain_once(&dispatcher).await;
        })
    })
    .wrap_err_with(|| format!("Invalid drain schedule '{}'", cron_expr))?;

    sched.add(job).await.wrap_err("Failed to add drain job")?;
    sched.start().await.wrap_err("Failed to start scheduler")?;

    info!(cron = cron_expr, "Drain scheduler started");
    Ok(sched)
}
