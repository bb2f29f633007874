//! Exhaustive per-title probe over stale titles.
//!
//! The feed scan can miss chapters that fall outside the feed's window or
//! ordering guarantees; this runner re-checks a bounded batch of the
//! least-recently-probed titles one by one. Persistence is all-or-nothing
//! per run: a transport failure mid-batch throws the whole batch away.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::application::notifications::NotificationDispatcher;
use crate::domain::check::{CheckKind, CheckOutcome, RunReport};
use crate::domain::events::{ProgressSender, ProgressUpdate};
use crate::domain::repositories::WatermarkStore;
use crate::domain::services::CatalogClient;
use crate::infrastructure::config::JobTuningConfig;
use crate::utils::{DAY_MS, MINUTE_MS, WEEK_MS};

/// A title counts as stale once both its watermarks are older than
/// `now - 1 day + 1 minute`; the margin keeps a title probed right at the
/// boundary from re-qualifying immediately.
const DEEP_STALE_MS: i64 = DAY_MS - MINUTE_MS;

pub struct DeepCheckRunner {
    store: Arc<dyn WatermarkStore>,
    catalog: Arc<dyn CatalogClient>,
    dispatcher: Arc<NotificationDispatcher>,
    batch_size: u32,
    pause_every: u32,
    pause_ms: u64,
    progress_every: u32,
}

impl DeepCheckRunner {
    pub fn new(
        store: Arc<dyn WatermarkStore>,
        catalog: Arc<dyn CatalogClient>,
        dispatcher: Arc<NotificationDispatcher>,
        tuning: &JobTuningConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            dispatcher,
            batch_size: tuning.deep_batch_size,
            pause_every: tuning.deep_pause_every,
            pause_ms: tuning.deep_pause_ms,
            progress_every: tuning.deep_progress_every,
        }
    }

    /// Execute one probe batch with `now` as the run epoch.
    pub async fn run(&self, now: i64, progress: Option<&ProgressSender>) -> RunReport {
        match self.probe_batch(now, progress).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Deep check aborted: {:#}", e);
                RunReport::new(CheckOutcome::UnknownError)
            }
        }
    }

    async fn probe_batch(
        &self,
        now: i64,
        progress: Option<&ProgressSender>,
    ) -> Result<RunReport> {
        let candidates = self
            .store
            .stale_deep_check_candidates(self.batch_size, now - WEEK_MS, now - DEEP_STALE_MS)
            .await?;
        if candidates.is_empty() {
            tracing::info!("No stale titles to probe");
            return Ok(RunReport::new(CheckOutcome::NoItems));
        }

        let total = u32::try_from(candidates.len()).unwrap_or(u32::MAX);
        tracing::info!("Probing {} stale title(s)", total);

        let mut probes: Vec<(String, i64)> = Vec::with_capacity(candidates.len());
        let mut updated: Vec<String> = Vec::new();

        for (index, candidate) in candidates.iter().enumerate() {
            let latest = match self.catalog.latest_chapter(&candidate.manga_id).await {
                Ok(latest) => latest,
                Err(e) if e.is_unavailable() => {
                    tracing::warn!(
                        "Catalog unavailable at probe {}/{}, discarding the batch: {}",
                        index + 1,
                        total,
                        e
                    );
                    return Ok(RunReport::new(CheckOutcome::ServiceUnavailable));
                }
                Err(e) => {
                    tracing::error!(
                        "Probe for {} failed, discarding the batch: {}",
                        candidate.manga_id,
                        e
                    );
                    return Ok(RunReport::new(CheckOutcome::UnknownError));
                }
            };

            // A chapter with no pages is a placeholder, not a release.
            let mut find_time = 0;
            if let Some(chapter) = latest {
                if chapter.page_count > 0 {
                    find_time = chapter.publish_at;
                    if chapter.publish_at > candidate.probe_floor() {
                        updated.push(candidate.manga_id.clone());
                    }
                }
            }
            probes.push((candidate.manga_id.clone(), find_time));

            let processed = u32::try_from(index + 1).unwrap_or(u32::MAX);
            if self.pause_every > 0
                && processed % self.pause_every == 0
                && processed < total
            {
                tokio::time::sleep(Duration::from_millis(self.pause_ms)).await;
            }
            if self.progress_every > 0 && processed % self.progress_every == 0 {
                if let Some(tx) = progress {
                    let _ = tx.try_send(ProgressUpdate { processed, total });
                }
                self.store
                    .update_run_progress(CheckKind::Deep, now, processed)
                    .await?;
            }
        }

        self.store.apply_deep_check_batch(&probes, now).await?;
        let touched = self.store.apply_update_batch(&updated, now).await?;
        tracing::info!(
            "Deep check probed {} title(s), {} updated ({} tracking rows stamped)",
            probes.len(),
            updated.len(),
            touched
        );

        if !updated.is_empty() {
            self.dispatcher.notify_run(now).await;
        }

        let count = u32::try_from(updated.len()).unwrap_or(u32::MAX);
        let probed = i64::try_from(probes.len()).unwrap_or(i64::MAX);
        Ok(RunReport::with_extra(CheckOutcome::Completed(count), probed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::{CatalogError, LatestChapter};
    use crate::infrastructure::config::PushoverConfig;
    use crate::test_utils::{RecordingPush, StubCatalog, TestDatabase};
    use crate::utils::now_ms;
    use sqlx::Row;

    fn tuning() -> JobTuningConfig {
        JobTuningConfig {
            deep_batch_size: 200,
            deep_pause_every: 5,
            deep_pause_ms: 0,
            deep_progress_every: 2,
            title_batch_size: 100,
        }
    }

    struct Fixture {
        db: TestDatabase,
        catalog: Arc<StubCatalog>,
        runner: DeepCheckRunner,
    }

    async fn fixture() -> Result<Fixture> {
        let db = TestDatabase::new().await?;
        let catalog = Arc::new(StubCatalog::new());
        let push = Arc::new(RecordingPush::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            db.store(),
            push,
            &PushoverConfig::default(),
        ));
        let runner = DeepCheckRunner::new(db.store(), catalog.clone(), dispatcher, &tuning());
        Ok(Fixture { db, catalog, runner })
    }

    fn chapter(publish_at: i64) -> Option<LatestChapter> {
        Some(LatestChapter {
            publish_at,
            page_count: 12,
        })
    }

    #[tokio::test]
    async fn empty_selection_is_no_items() -> Result<()> {
        let f = fixture().await?;
        let now = now_ms();
        // Probed five minutes ago: not stale.
        f.db.seed_tracking("alice", "m1", now - 1_000, 0, now - 5 * MINUTE_MS, 0, 0)
            .await?;

        let report = f.runner.run(now, None).await;
        assert_eq!(report.outcome, CheckOutcome::NoItems);
        assert!(f.catalog.probed.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn probes_run_least_recently_checked_first() -> Result<()> {
        let f = fixture().await?;
        let now = now_ms();
        f.db.seed_tracking("alice", "older", now - 1_000, 0, now - 3 * DAY_MS, 0, 0)
            .await?;
        f.db.seed_tracking("alice", "newer", now - 1_000, 0, now - 2 * DAY_MS, 0, 0)
            .await?;
        f.catalog.queue_latest(Ok(None));
        f.catalog.queue_latest(Ok(None));

        let report = f.runner.run(now, None).await;
        assert_eq!(report.outcome, CheckOutcome::Completed(0));
        assert_eq!(report.extra, Some(2));
        let probed = f.catalog.probed.lock().unwrap().clone();
        assert_eq!(probed, vec!["older".to_string(), "newer".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn chapter_newer_than_floor_counts_as_update() -> Result<()> {
        let f = fixture().await?;
        let now = now_ms();
        let old_find = now - 10 * DAY_MS;
        // Floor is last_deep_check_find (no fresher incremental hit).
        f.db.seed_tracking("alice", "m1", now - 1_000, 0, now - 2 * DAY_MS, old_find, 0)
            .await?;
        f.catalog.queue_latest(Ok(chapter(now - DAY_MS)));

        let report = f.runner.run(now, None).await;
        assert_eq!(report.outcome, CheckOutcome::Completed(1));
        assert_eq!(f.db.last_update_of("m1").await?, now);

        let row = sqlx::query(
            "SELECT last_deep_check, last_deep_check_find FROM user_manga WHERE manga_id = 'm1'",
        )
        .fetch_one(f.db.connection.pool())
        .await?;
        let deep_check: i64 = row.get("last_deep_check");
        let find: i64 = row.get("last_deep_check_find");
        assert_eq!(deep_check, now);
        assert_eq!(find, now - DAY_MS);
        Ok(())
    }

    #[tokio::test]
    async fn chapter_older_than_floor_is_probed_but_not_updated() -> Result<()> {
        let f = fixture().await?;
        let now = now_ms();
        let find = now - 2 * DAY_MS;
        f.db.seed_tracking("alice", "m1", now - 1_000, 0, now - 3 * DAY_MS, find, 0)
            .await?;
        // Same chapter the previous probe already saw.
        f.catalog.queue_latest(Ok(chapter(find)));

        let report = f.runner.run(now, None).await;
        assert_eq!(report.outcome, CheckOutcome::Completed(0));
        assert_eq!(report.extra, Some(1));
        assert_eq!(f.db.last_update_of("m1").await?, 0);

        let row = sqlx::query("SELECT last_deep_check FROM user_manga WHERE manga_id = 'm1'")
            .fetch_one(f.db.connection.pool())
            .await?;
        let deep_check: i64 = row.get("last_deep_check");
        assert_eq!(deep_check, now);
        Ok(())
    }

    #[tokio::test]
    async fn zero_page_chapter_never_advances_find() -> Result<()> {
        let f = fixture().await?;
        let now = now_ms();
        f.db.seed_tracking("alice", "m1", now - 1_000, 0, now - 2 * DAY_MS, 4_000, 0)
            .await?;
        f.catalog.queue_latest(Ok(Some(LatestChapter {
            publish_at: now,
            page_count: 0,
        })));

        let report = f.runner.run(now, None).await;
        assert_eq!(report.outcome, CheckOutcome::Completed(0));

        let row = sqlx::query("SELECT last_deep_check_find FROM user_manga WHERE manga_id = 'm1'")
            .fetch_one(f.db.connection.pool())
            .await?;
        let find: i64 = row.get("last_deep_check_find");
        assert_eq!(find, 4_000);
        Ok(())
    }

    #[tokio::test]
    async fn mid_batch_failure_discards_everything() -> Result<()> {
        let f = fixture().await?;
        let now = now_ms();
        f.db.seed_tracking("alice", "m1", now - 1_000, 0, now - 3 * DAY_MS, 0, 0)
            .await?;
        f.db.seed_tracking("alice", "m2", now - 1_000, 0, now - 2 * DAY_MS, 0, 0)
            .await?;
        f.catalog.queue_latest(Ok(chapter(now - 1_000)));
        f.catalog
            .queue_latest(Err(CatalogError::Unavailable { status: 502 }));

        let report = f.runner.run(now, None).await;
        assert_eq!(report.outcome, CheckOutcome::ServiceUnavailable);

        // The first probe's result must not have been persisted.
        let row = sqlx::query("SELECT last_deep_check FROM user_manga WHERE manga_id = 'm1'")
            .fetch_one(f.db.connection.pool())
            .await?;
        let deep_check: i64 = row.get("last_deep_check");
        assert_eq!(deep_check, now - 3 * DAY_MS);
        assert_eq!(f.db.last_update_of("m1").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn progress_is_emitted_and_persisted() -> Result<()> {
        let f = fixture().await?;
        let now = now_ms();
        for i in 0..4 {
            f.db.seed_tracking(
                "alice",
                &format!("m{i}"),
                now - 1_000,
                0,
                now - 2 * DAY_MS - i64::from(i),
                0,
                0,
            )
            .await?;
            f.catalog.queue_latest(Ok(None));
        }
        // Run row must exist for the progress write to land on.
        f.db.store().start_run(CheckKind::Deep, now).await?;

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let report = f.runner.run(now, Some(&tx)).await;
        assert_eq!(report.outcome, CheckOutcome::Completed(0));

        // progress_every = 2 over 4 candidates: updates at 2 and 4.
        assert_eq!(rx.try_recv()?, ProgressUpdate { processed: 2, total: 4 });
        assert_eq!(rx.try_recv()?, ProgressUpdate { processed: 4, total: 4 });
        assert!(rx.try_recv().is_err());

        let run = f.db.store().latest_run(CheckKind::Deep).await?.unwrap();
        assert_eq!(run.extra, Some(4));
        Ok(())
    }
}
