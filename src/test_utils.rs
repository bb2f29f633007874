//! Shared test infrastructure.
//!
//! Every test gets an isolated in-memory database run through the real
//! migration, plus hand-rolled catalog/push stubs with queued responses
//! so runner behavior can be driven call by call.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::manga::TitleDetail;
use crate::domain::services::{
    CatalogClient, CatalogError, FeedResponse, LatestChapter, PushResult, PushSender,
};
use crate::infrastructure::{DatabaseConnection, SqliteWatermarkStore};

/// Isolated test database, one private memory instance per test.
pub struct TestDatabase {
    pub connection: DatabaseConnection,
}

impl TestDatabase {
    pub async fn new() -> Result<Self> {
        // A single connection keeps the memory database alive and shared
        // across every query in the test.
        let db = DatabaseConnection::new("sqlite::memory:", 1).await?;
        db.migrate().await?;
        Ok(Self { connection: db })
    }

    pub fn pool(&self) -> Arc<sqlx::SqlitePool> {
        Arc::new(self.connection.pool().clone())
    }

    pub fn store(&self) -> Arc<SqliteWatermarkStore> {
        Arc::new(SqliteWatermarkStore::new(self.pool()))
    }

    /// Insert one tracking row with explicit watermarks.
    #[allow(clippy::too_many_arguments)]
    pub async fn seed_tracking(
        &self,
        user_id: &str,
        manga_id: &str,
        last_check: i64,
        last_update: i64,
        last_deep_check: i64,
        last_deep_check_find: i64,
        last_title_check: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_manga
                 (user_id, manga_id, last_check, last_update,
                  last_deep_check, last_deep_check_find, last_title_check)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(manga_id)
        .bind(last_check)
        .bind(last_update)
        .bind(last_deep_check)
        .bind(last_deep_check_find)
        .bind(last_title_check)
        .execute(self.connection.pool())
        .await?;
        Ok(())
    }

    pub async fn seed_user(&self, user_id: &str, pushover_token: Option<&str>) -> Result<()> {
        sqlx::query("INSERT INTO user_id (user_id, pushover_token) VALUES (?, ?)")
            .bind(user_id)
            .bind(pushover_token)
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    pub async fn last_update_of(&self, manga_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT MAX(last_update) AS v FROM user_manga WHERE manga_id = ?")
            .bind(manga_id)
            .fetch_one(self.connection.pool())
            .await?;
        let value: Option<i64> = sqlx::Row::get(&row, "v");
        Ok(value.unwrap_or(-1))
    }

    pub async fn run_rows(&self, check_type: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM update_check WHERE check_type = ?")
            .bind(check_type)
            .fetch_one(self.connection.pool())
            .await?;
        Ok(sqlx::Row::get(&row, "n"))
    }
}

/// Catalog stub with queued responses, consumed in call order.
#[derive(Default)]
pub struct StubCatalog {
    feed: Mutex<VecDeque<Result<FeedResponse, CatalogError>>>,
    latest: Mutex<VecDeque<Result<Option<LatestChapter>, CatalogError>>>,
    details: Mutex<VecDeque<Result<Vec<TitleDetail>, CatalogError>>>,
    /// Recorded `(since_epoch, offset)` of every feed request.
    pub feed_requests: Mutex<Vec<(i64, u32)>>,
    /// Recorded title ids of every latest-chapter probe.
    pub probed: Mutex<Vec<String>>,
    /// Recorded id batches of every details request.
    pub detail_requests: Mutex<Vec<Vec<String>>>,
}

impl StubCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_feed(&self, response: Result<FeedResponse, CatalogError>) {
        self.feed.lock().unwrap().push_back(response);
    }

    pub fn queue_latest(&self, response: Result<Option<LatestChapter>, CatalogError>) {
        self.latest.lock().unwrap().push_back(response);
    }

    pub fn queue_details(&self, response: Result<Vec<TitleDetail>, CatalogError>) {
        self.details.lock().unwrap().push_back(response);
    }
}

#[async_trait]
impl CatalogClient for StubCatalog {
    async fn changes_since(
        &self,
        since_epoch: i64,
        offset: u32,
        _page_size: u32,
    ) -> Result<FeedResponse, CatalogError> {
        self.feed_requests.lock().unwrap().push((since_epoch, offset));
        self.feed
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(FeedResponse::NoContent))
    }

    async fn latest_chapter(&self, title_id: &str) -> Result<Option<LatestChapter>, CatalogError> {
        self.probed.lock().unwrap().push(title_id.to_string());
        self.latest.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn title_details(
        &self,
        manga_ids: &[String],
        _page_size: u32,
    ) -> Result<Vec<TitleDetail>, CatalogError> {
        self.detail_requests.lock().unwrap().push(manga_ids.to_vec());
        self.details
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Vec::new()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPush {
    pub app_token: String,
    pub user_token: String,
    pub message: String,
    pub title: Option<String>,
}

/// Push stub recording every delivery attempt.
pub struct RecordingPush {
    pub sent: Mutex<Vec<SentPush>>,
    result: Mutex<PushResult>,
}

impl Default for RecordingPush {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            result: Mutex::new(PushResult::Delivered),
        }
    }
}

impl RecordingPush {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_result(&self, result: PushResult) {
        *self.result.lock().unwrap() = result;
    }

    pub fn sent(&self) -> Vec<SentPush> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushSender for RecordingPush {
    async fn send(
        &self,
        app_token: &str,
        user_token: &str,
        message: &str,
        title: Option<&str>,
    ) -> PushResult {
        self.sent.lock().unwrap().push(SentPush {
            app_token: app_token.to_string(),
            user_token: user_token.to_string(),
            message: message.to_string(),
            title: title.map(str::to_string),
        });
        *self.result.lock().unwrap()
    }
}
