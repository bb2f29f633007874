//! Cron wiring for the three background jobs.
//!
//! Fire-and-forget: the scheduler only calls [`RunCoordinator::trigger`]
//! and lets the single-flight guard sort out overlap with manual
//! triggers. Outcomes are logged by the coordinator, not here.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::application::coordinator::RunCoordinator;
use crate::domain::check::CheckKind;
use crate::infrastructure::config::ScheduleConfig;

/// Build and start the scheduler with the configured cron expressions.
pub async fn start_scheduler(
    coordinator: Arc<RunCoordinator>,
    schedules: &ScheduleConfig,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;

    let jobs = [
        (CheckKind::Update, schedules.incremental.as_str()),
        (CheckKind::Titles, schedules.title_refresh.as_str()),
        (CheckKind::Deep, schedules.deep_check.as_str()),
    ];

    for (kind, cron) in jobs {
        let coordinator = coordinator.clone();
        let job = Job::new_async(cron, move |_uuid, _lock| {
            let coordinator = coordinator.clone();
            Box::pin(async move {
                tracing::debug!("Cron fired for {} check", kind);
                let _ = coordinator.trigger(kind, None).await;
            })
        })
        .with_context(|| format!("creating {kind} job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
        tracing::info!("Scheduled {} check: {}", kind, cron);
    }

    sched.start().await.context("starting scheduler")?;
    Ok(sched)
}
