//! Background jobs.
//!
//! The returned [`JobScheduler`] must stay alive for the life of the process;
//! dropping it stops every job.

use std::sync::Arc;

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::services::AbandonedCartSweeper;

pub async fn build_scheduler(
    sweeper: Arc<AbandonedCartSweeper>,
    sweep_cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_sweep_job(&scheduler, sweeper, sweep_cron).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_sweep_job(
    scheduler: &JobScheduler,
    sweeper: Arc<AbandonedCartSweeper>,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let sweeper = Arc::clone(&sweeper);
        Box::pin(async move {
            if let Err(e) = sweeper.run(Utc::now()).await {
                tracing::error!(error = %e, "scheduler: abandoned cart sweep failed");
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: registered abandoned cart sweep");
    Ok(())
}
