//! External-service contracts: the catalog and the push gateway.
//!
//! The catalog error taxonomy drives the run result codes, so it is a
//! typed enum rather than an opaque error; everything a runner needs to
//! decide "service unavailable vs unknown" is carried here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classification for catalog calls.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Availability-class HTTP status (429/502/503/504). The catalog is
    /// alive but not serving; runs resolve to "service unavailable".
    #[error("catalog unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    /// Any other non-success HTTP status.
    #[error("catalog request failed (HTTP {status})")]
    Http { status: u16 },

    /// Network/timeout failure before an HTTP status existed.
    #[error("catalog transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response parsed but the expected payload shape was missing.
    #[error("catalog response malformed: {detail}")]
    Malformed { detail: String },
}

impl CatalogError {
    /// Map a non-success HTTP status to its error class.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 | 502 | 503 | 504 => CatalogError::Unavailable { status },
            _ => CatalogError::Http { status },
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, CatalogError::Unavailable { .. })
    }
}

/// One chapter-feed entry, reduced to what the scanner needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Id of the title the chapter belongs to.
    pub title_id: String,
    /// Chapter publish time, epoch milliseconds.
    pub publish_at: i64,
    pub page_count: u32,
}

/// One page of the chapter feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    /// Total matching entries the catalog reports across all pages.
    pub total: u32,
}

/// Outcome of a feed-page request: a page, or the catalog's explicit
/// "nothing here" (HTTP 204).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedResponse {
    Page(FeedPage),
    NoContent,
}

/// Latest-chapter probe result for a single title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestChapter {
    pub publish_at: i64,
    pub page_count: u32,
}

/// Read access to the external catalog.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// One page of the chapter feed, newest first, filtered server-side
    /// to chapters published at or after `since_epoch`.
    async fn changes_since(
        &self,
        since_epoch: i64,
        offset: u32,
        page_size: u32,
    ) -> Result<FeedResponse, CatalogError>;

    /// The single most recent chapter of one title, if any.
    async fn latest_chapter(&self, title_id: &str) -> Result<Option<LatestChapter>, CatalogError>;

    /// Metadata for a batch of titles. Ids the catalog does not answer
    /// for are simply absent from the result.
    async fn title_details(
        &self,
        manga_ids: &[String],
        page_size: u32,
    ) -> Result<Vec<crate::domain::manga::TitleDetail>, CatalogError>;
}

/// Terminal state of one push delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    Delivered,
    /// The gateway rejected the request (4xx): a client-config problem,
    /// logged and skipped.
    Rejected,
    /// The gateway was unreachable or answered out of protocol.
    ApiUnavailable,
}

/// Push gateway contract. Delivery failures are values, not errors; the
/// dispatcher never retries in this core.
#[async_trait]
pub trait PushSender: Send + Sync {
    /// Send `message` to the user identified by `user_token`, using
    /// `app_token` as the sending application. `title` is an optional
    /// short headline supported by the gateway.
    async fn send(
        &self,
        app_token: &str,
        user_token: &str,
        message: &str,
        title: Option<&str>,
    ) -> PushResult;
}
