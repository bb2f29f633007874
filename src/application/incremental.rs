//! Incremental scan of the catalog chapter feed.
//!
//! Pages through "chapters published since the stored watermark" newest
//! first and intersects the feed with the tracked titles. One batched
//! `last_update` write for every matched title at the end.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;

use crate::application::notifications::NotificationDispatcher;
use crate::domain::check::{CheckOutcome, RunReport};
use crate::domain::repositories::WatermarkStore;
use crate::domain::services::{CatalogClient, CatalogError, FeedResponse};
use crate::utils::{DAY_MS, MINUTE_MS, WEEK_MS};

/// Watermark safety margin against catalog clock and ordering skew.
const SCAN_MARGIN_MS: i64 = MINUTE_MS;
/// Rows whose owner has not checked in this long are abandoned; the deep
/// prober sweeps them, not the scan.
const TRACKED_WINDOW_MS: i64 = WEEK_MS;
/// Feed window when the store holds no watermark at all.
const FIRST_SCAN_WINDOW_MS: i64 = DAY_MS;

pub struct IncrementalScanner {
    store: Arc<dyn WatermarkStore>,
    catalog: Arc<dyn CatalogClient>,
    dispatcher: Arc<NotificationDispatcher>,
    page_size: u32,
    max_pages: u32,
}

impl IncrementalScanner {
    pub fn new(
        store: Arc<dyn WatermarkStore>,
        catalog: Arc<dyn CatalogClient>,
        dispatcher: Arc<NotificationDispatcher>,
        page_size: u32,
        max_pages: u32,
    ) -> Self {
        Self {
            store,
            catalog,
            dispatcher,
            page_size,
            max_pages,
        }
    }

    /// Execute one scan with `now` as the run epoch.
    pub async fn run(&self, now: i64) -> RunReport {
        match self.scan(now).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Incremental scan aborted: {:#}", e);
                RunReport::new(CheckOutcome::UnknownError)
            }
        }
    }

    async fn scan(&self, now: i64) -> Result<RunReport> {
        let since = match self.store.latest_update_watermark().await? {
            Some(watermark) => watermark - SCAN_MARGIN_MS,
            None => now - FIRST_SCAN_WINDOW_MS,
        };

        let tracked = self.store.tracked_title_ids(now - TRACKED_WINDOW_MS).await?;
        if tracked.is_empty() {
            tracing::info!("No tracked titles, nothing to scan");
            return Ok(RunReport::new(CheckOutcome::NoItems));
        }
        let tracked: HashSet<String> = tracked.into_iter().collect();
        tracing::info!(
            "Scanning feed since {} for {} tracked titles",
            crate::utils::format_epoch(since),
            tracked.len()
        );

        let mut matched: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut offset = 0u32;
        let mut pages = 0u32;
        let mut hit_cap = false;

        loop {
            if pages >= self.max_pages {
                tracing::warn!("Feed pagination cap reached after {} pages", pages);
                hit_cap = true;
                break;
            }

            let response = match self.catalog.changes_since(since, offset, self.page_size).await {
                Ok(response) => response,
                Err(e) if e.is_unavailable() => {
                    tracing::warn!("Catalog unavailable during scan: {}", e);
                    return Ok(RunReport::new(CheckOutcome::ServiceUnavailable));
                }
                Err(CatalogError::Malformed { detail }) if pages > 0 => {
                    tracing::warn!(
                        "Malformed feed page at offset {}, treating as end of feed: {}",
                        offset,
                        detail
                    );
                    break;
                }
                Err(e) => {
                    tracing::error!("Feed request failed at offset {}: {}", offset, e);
                    return Ok(RunReport::new(CheckOutcome::UnknownError));
                }
            };

            let page = match response {
                FeedResponse::NoContent => break,
                FeedResponse::Page(page) => page,
            };

            for item in &page.items {
                if tracked.contains(&item.title_id) && seen.insert(item.title_id.clone()) {
                    matched.push(item.title_id.clone());
                }
            }

            pages += 1;
            offset += self.page_size;
            if page.total <= offset {
                break;
            }
        }

        if matched.is_empty() {
            tracing::info!("Scan finished with no updates across {} page(s)", pages);
            return Ok(RunReport::with_extra(
                CheckOutcome::Completed(0),
                i64::from(hit_cap),
            ));
        }

        let touched = self.store.apply_update_batch(&matched, now).await?;
        tracing::info!(
            "Scan matched {} updated title(s), {} tracking rows stamped",
            matched.len(),
            touched
        );

        self.dispatcher.notify_run(now).await;

        let count = u32::try_from(matched.len()).unwrap_or(u32::MAX);
        Ok(RunReport::with_extra(
            CheckOutcome::Completed(count),
            i64::from(hit_cap),
        ))
    }
}
