//! One-shot crowdfunding finalization, for running from cron.
//!
//! Settles every campaign past its deadline, then works off the refund jobs
//! that are due right away. Refunds still waiting on a backoff are left to the
//! server's executor. Requires `DATABASE_URL`.

use chrono::Utc;

use backoffice_api::app::services::AppServices;
use backoffice_infra::config::AppConfig;

const MAX_REFUND_JOBS: usize = 1_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    backoffice_observability::init();

    let config = AppConfig::from_env()?;
    // Campaigns only exist in the database; an in-memory run would settle nothing.
    let services = AppServices::from_database(config).await?;

    let report = services.finalizer.run(Utc::now()).await?;
    tracing::info!(
        due = report.due,
        succeeded = report.succeeded,
        failed = report.failed,
        refunds_enqueued = report.refunds_enqueued,
        errors = report.errors,
        "finalizer pass finished"
    );

    match services.job_executor().drain(MAX_REFUND_JOBS).await {
        Ok(stats) => tracing::info!(
            processed = stats.jobs_processed,
            succeeded = stats.jobs_succeeded,
            failed = stats.jobs_failed,
            dead_lettered = stats.jobs_dead_lettered,
            "refund jobs drained"
        ),
        Err(e) => tracing::error!(error = %e, "failed to drain refund jobs"),
    }
    Ok(())
}
