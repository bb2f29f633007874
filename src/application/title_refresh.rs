//! Batch refresh of cached title metadata.
//!
//! Pulls one batch of the least-recently-refreshed titles from the
//! catalog and writes names, status and volume/chapter markers back. Ids
//! the catalog does not answer for go into the failed-titles set and are
//! retried next cycle because their `last_title_check` stays put.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;

use crate::domain::check::{CheckOutcome, RunReport};
use crate::domain::repositories::WatermarkStore;
use crate::domain::services::CatalogClient;
use crate::utils::DAY_MS;

/// Metadata older than this is due for a refresh.
const TITLE_STALE_MS: i64 = 2 * DAY_MS;

pub struct TitleRefresher {
    store: Arc<dyn WatermarkStore>,
    catalog: Arc<dyn CatalogClient>,
    batch_size: u32,
}

impl TitleRefresher {
    pub fn new(
        store: Arc<dyn WatermarkStore>,
        catalog: Arc<dyn CatalogClient>,
        batch_size: u32,
    ) -> Self {
        Self {
            store,
            catalog,
            batch_size,
        }
    }

    /// Execute one refresh batch with `now` as the run epoch.
    pub async fn run(&self, now: i64) -> RunReport {
        match self.refresh_batch(now).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Title refresh aborted: {:#}", e);
                RunReport::new(CheckOutcome::UnknownError)
            }
        }
    }

    async fn refresh_batch(&self, now: i64) -> Result<RunReport> {
        let candidates = self
            .store
            .stale_title_candidates(self.batch_size, now - TITLE_STALE_MS)
            .await?;
        if candidates.is_empty() {
            tracing::info!("No stale title metadata");
            return Ok(RunReport::new(CheckOutcome::NoItems));
        }

        let details = match self.catalog.title_details(&candidates, self.batch_size).await {
            Ok(details) => details,
            // This is a best-effort batch call; no availability distinction.
            Err(e) => {
                tracing::error!("Title details request failed: {}", e);
                return Ok(RunReport::new(CheckOutcome::UnknownError));
            }
        };

        let resolved: HashSet<&str> = details.iter().map(|d| d.manga_id.as_str()).collect();
        let missing: Vec<String> = candidates
            .iter()
            .filter(|id| !resolved.contains(id.as_str()))
            .cloned()
            .collect();

        self.store.apply_title_metadata(&details, now).await?;

        let resolved_ids: Vec<String> = details.iter().map(|d| d.manga_id.clone()).collect();
        self.store.clear_failed_titles(&resolved_ids).await?;

        if !missing.is_empty() {
            tracing::warn!(
                "{} title(s) absent from the catalog response, marked failed",
                missing.len()
            );
            self.store.record_failed_titles(&missing, now).await?;
        }

        let count = u32::try_from(details.len()).unwrap_or(u32::MAX);
        let failed = i64::try_from(missing.len()).unwrap_or(i64::MAX);
        tracing::info!("Refreshed {} title(s), {} failed", count, failed);
        Ok(RunReport::with_extra(CheckOutcome::Completed(count), failed))
    }
}
