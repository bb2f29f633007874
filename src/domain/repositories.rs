//! Store contract for the reconciliation engine.
//!
//! The relational layer is an external collaborator; the engine touches it
//! only through this interface. Implementations live in the
//! infrastructure layer.

use async_trait::async_trait;
use anyhow::Result;

use crate::domain::check::{CheckKind, CheckRun, CheckOutcome};
use crate::domain::manga::{DeepCheckCandidate, TitleDetail, UserPushTarget};

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Distinct title ids any user has checked at or after
    /// `min_last_check`. A row that never recorded a check counts as -1.
    async fn tracked_title_ids(&self, min_last_check: i64) -> Result<Vec<String>>;

    /// Highest `last_update` across all tracked titles, if any is > 0.
    async fn latest_update_watermark(&self) -> Result<Option<i64>>;

    /// Titles eligible for a deep probe: checked by someone at or after
    /// `min_last_check`, with `max(last_update, last_deep_check)` below
    /// `max_watermark`. Least-recently-deep-checked first, at most
    /// `limit` distinct titles.
    async fn stale_deep_check_candidates(
        &self,
        limit: u32,
        min_last_check: i64,
        max_watermark: i64,
    ) -> Result<Vec<DeepCheckCandidate>>;

    /// Titles whose metadata is stale: `last_title_check` strictly below
    /// `max_last_title_check`, least-recently-checked first.
    async fn stale_title_candidates(
        &self,
        limit: u32,
        max_last_title_check: i64,
    ) -> Result<Vec<String>>;

    /// Set `last_update = epoch` for every given title (all users
    /// tracking it). Returns the number of rows touched.
    async fn apply_update_batch(&self, manga_ids: &[String], epoch: i64) -> Result<u64>;

    /// Persist one deep run's probes: for every `(manga_id, find_time)`
    /// advance `last_deep_check` to `epoch` and `last_deep_check_find`
    /// to `find_time` where that moves it forward. All writes commit
    /// together.
    async fn apply_deep_check_batch(&self, probes: &[(String, i64)], epoch: i64) -> Result<()>;

    /// Write refreshed metadata and stamp `last_title_check = epoch`.
    async fn apply_title_metadata(&self, details: &[TitleDetail], epoch: i64) -> Result<()>;

    /// Mark titles as currently failing metadata resolution. Existing
    /// records for the same ids are replaced, keeping one row per title.
    async fn record_failed_titles(&self, manga_ids: &[String], epoch: i64) -> Result<()>;

    /// Drop titles from the currently-failing set.
    async fn clear_failed_titles(&self, manga_ids: &[String]) -> Result<()>;

    /// Open a check-run row (`end_time` null marks it running).
    async fn start_run(&self, kind: CheckKind, epoch: i64) -> Result<()>;

    /// Close the run row opened at `epoch` with its outcome and the
    /// job-specific secondary counter.
    async fn complete_run(
        &self,
        kind: CheckKind,
        epoch: i64,
        end_epoch: i64,
        outcome: CheckOutcome,
        extra: Option<i64>,
    ) -> Result<()>;

    /// Mid-run progress for observers polling run status.
    async fn update_run_progress(&self, kind: CheckKind, epoch: i64, processed: u32) -> Result<()>;

    /// Most recently started run of the given kind.
    async fn latest_run(&self, kind: CheckKind) -> Result<Option<CheckRun>>;

    /// Users with a push token and at least one title whose `last_update`
    /// equals `epoch`, with that title count.
    async fn users_to_notify(&self, epoch: i64) -> Result<Vec<UserPushTarget>>;
}
