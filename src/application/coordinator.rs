//! Single-flight run coordinator.
//!
//! Both entry points (cron scheduler, control-plane listener) funnel
//! through [`RunCoordinator::trigger`]. One atomic flag per job kind
//! serializes runs of that kind; different kinds may overlap. The
//! coordinator also owns the run log: a row is opened before the runner
//! starts and closed with the outcome afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::application::deep_check::DeepCheckRunner;
use crate::application::incremental::IncrementalScanner;
use crate::application::title_refresh::TitleRefresher;
use crate::domain::check::{CheckKind, CheckOutcome, RunReport};
use crate::domain::events::{ProgressSender, TriggerOutcome};
use crate::domain::repositories::WatermarkStore;
use crate::utils::{format_duration_ms, now_ms};

pub struct RunCoordinator {
    store: Arc<dyn WatermarkStore>,
    scanner: Arc<IncrementalScanner>,
    deep: Arc<DeepCheckRunner>,
    titles: Arc<TitleRefresher>,
    update_running: AtomicBool,
    titles_running: AtomicBool,
    deep_running: AtomicBool,
}

/// Clears the in-flight flag when the run future resolves or is dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RunCoordinator {
    pub fn new(
        store: Arc<dyn WatermarkStore>,
        scanner: Arc<IncrementalScanner>,
        deep: Arc<DeepCheckRunner>,
        titles: Arc<TitleRefresher>,
    ) -> Self {
        Self {
            store,
            scanner,
            deep,
            titles,
            update_running: AtomicBool::new(false),
            titles_running: AtomicBool::new(false),
            deep_running: AtomicBool::new(false),
        }
    }

    fn flag(&self, kind: CheckKind) -> &AtomicBool {
        match kind {
            CheckKind::Update => &self.update_running,
            CheckKind::Titles => &self.titles_running,
            CheckKind::Deep => &self.deep_running,
        }
    }

    /// Run a job of the given kind unless one is already in flight.
    pub async fn trigger(
        &self,
        kind: CheckKind,
        progress: Option<ProgressSender>,
    ) -> TriggerOutcome {
        let flag = self.flag(kind);
        if flag.swap(true, Ordering::SeqCst) {
            tracing::info!("{} check already running, trigger skipped", kind);
            return TriggerOutcome::AlreadyRunning;
        }
        let _guard = RunningGuard(flag);

        let outcome = self.execute(kind, progress).await;
        TriggerOutcome::Finished(outcome)
    }

    async fn execute(&self, kind: CheckKind, progress: Option<ProgressSender>) -> CheckOutcome {
        let start = now_ms();
        tracing::info!("Starting {} check", kind);

        if let Err(e) = self.store.start_run(kind, start).await {
            tracing::error!("Could not open a {} run row: {:#}", kind, e);
            return CheckOutcome::UnknownError;
        }

        let report = self.dispatch(kind, start, progress).await;

        let end = now_ms();
        // A failed close is logged, not fatal; the outcome is in the log line below.
        if let Err(e) = self
            .store
            .complete_run(kind, start, end, report.outcome, report.extra)
            .await
        {
            tracing::error!("Could not close the {} run row: {:#}", kind, e);
        }

        tracing::info!(
            "{} check finished in {}: {}",
            kind,
            format_duration_ms(end - start),
            report.outcome
        );
        report.outcome
    }

    async fn dispatch(
        &self,
        kind: CheckKind,
        start: i64,
        progress: Option<ProgressSender>,
    ) -> RunReport {
        match kind {
            CheckKind::Update => self.scanner.run(start).await,
            CheckKind::Titles => self.titles.run(start).await,
            CheckKind::Deep => self.deep.run(start, progress.as_ref()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::notifications::NotificationDispatcher;
    use crate::domain::manga::TitleDetail;
    use crate::domain::services::{
        CatalogClient, CatalogError, FeedItem, FeedPage, FeedResponse, LatestChapter,
    };
    use crate::infrastructure::config::{JobTuningConfig, PushoverConfig};
    use crate::test_utils::{RecordingPush, StubCatalog, TestDatabase};
    use crate::utils::WEEK_MS;
    use anyhow::Result;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    fn build_coordinator(
        db: &TestDatabase,
        catalog: Arc<dyn CatalogClient>,
    ) -> Arc<RunCoordinator> {
        let push = Arc::new(RecordingPush::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            db.store(),
            push,
            &PushoverConfig::default(),
        ));
        let tuning = JobTuningConfig {
            deep_pause_ms: 0,
            ..Default::default()
        };
        let scanner = Arc::new(IncrementalScanner::new(
            db.store(),
            catalog.clone(),
            dispatcher.clone(),
            100,
            100,
        ));
        let deep = Arc::new(DeepCheckRunner::new(
            db.store(),
            catalog.clone(),
            dispatcher,
            &tuning,
        ));
        let titles = Arc::new(TitleRefresher::new(db.store(), catalog, 100));
        Arc::new(RunCoordinator::new(db.store(), scanner, deep, titles))
    }

    /// Catalog whose single probe parks until the test releases it.
    struct ParkedCatalog {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl CatalogClient for ParkedCatalog {
        async fn changes_since(
            &self,
            _since_epoch: i64,
            _offset: u32,
            _page_size: u32,
        ) -> Result<FeedResponse, CatalogError> {
            Ok(FeedResponse::NoContent)
        }

        async fn latest_chapter(
            &self,
            _title_id: &str,
        ) -> Result<Option<LatestChapter>, CatalogError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(None)
        }

        async fn title_details(
            &self,
            _manga_ids: &[String],
            _page_size: u32,
        ) -> Result<Vec<TitleDetail>, CatalogError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn trigger_records_a_completed_run_row() -> Result<()> {
        let db = TestDatabase::new().await?;
        let catalog = Arc::new(StubCatalog::new());
        let coordinator = build_coordinator(&db, catalog.clone());

        let now = now_ms();
        db.seed_tracking("alice", "m1", now - 1_000, 1_000, 0, 0, 0)
            .await?;
        catalog.queue_feed(Ok(FeedResponse::Page(FeedPage {
            items: vec![FeedItem {
                title_id: "m1".to_string(),
                publish_at: now,
                page_count: 4,
            }],
            total: 1,
        })));

        let outcome = coordinator.trigger(CheckKind::Update, None).await;
        assert_eq!(outcome, TriggerOutcome::Finished(CheckOutcome::Completed(1)));

        let run = db.store().latest_run(CheckKind::Update).await?.unwrap();
        assert!(!run.is_running());
        assert_eq!(run.outcome(), Some(CheckOutcome::Completed(1)));
        assert_eq!(run.extra, Some(0));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_trigger_is_rejected_without_a_second_row() -> Result<()> {
        let db = TestDatabase::new().await?;
        let catalog = Arc::new(ParkedCatalog {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let coordinator = build_coordinator(&db, catalog.clone());

        let now = now_ms();
        db.seed_tracking("alice", "m1", now - 1_000, 0, now - WEEK_MS, 0, 0)
            .await?;

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.trigger(CheckKind::Deep, None).await })
        };
        // The run is provably in flight once the probe has been entered.
        catalog.entered.notified().await;

        let second = coordinator.trigger(CheckKind::Deep, None).await;
        assert_eq!(second, TriggerOutcome::AlreadyRunning);

        catalog.release.notify_one();
        let first = first.await?;
        assert_eq!(first, TriggerOutcome::Finished(CheckOutcome::Completed(0)));

        // Exactly one run row: the rejected trigger never touched the log.
        assert_eq!(db.run_rows("deep").await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn flag_is_released_after_a_run() -> Result<()> {
        let db = TestDatabase::new().await?;
        let coordinator = build_coordinator(&db, Arc::new(StubCatalog::new()));

        // No tracked titles: instant NoItems runs.
        let first = coordinator.trigger(CheckKind::Titles, None).await;
        assert_eq!(first, TriggerOutcome::Finished(CheckOutcome::NoItems));
        let second = coordinator.trigger(CheckKind::Titles, None).await;
        assert_eq!(second, TriggerOutcome::Finished(CheckOutcome::NoItems));
        assert_eq!(db.run_rows("titles").await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn kinds_do_not_share_a_flag() -> Result<()> {
        let db = TestDatabase::new().await?;
        let catalog = Arc::new(ParkedCatalog {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let coordinator = build_coordinator(&db, catalog.clone());

        let now = now_ms();
        // Fresh title metadata so the titles run has nothing to do.
        db.seed_tracking("alice", "m1", now - 1_000, 0, now - WEEK_MS, 0, now)
            .await?;

        let deep = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.trigger(CheckKind::Deep, None).await })
        };
        catalog.entered.notified().await;

        // A different kind runs to completion while deep is parked.
        let titles = coordinator.trigger(CheckKind::Titles, None).await;
        assert_eq!(titles, TriggerOutcome::Finished(CheckOutcome::NoItems));

        catalog.release.notify_one();
        deep.await?;
        Ok(())
    }
}
