//! SQLite-backed implementation of the [`WatermarkStore`] contract.
//!
//! All queries run against the pool opened by
//! [`DatabaseConnection`](super::DatabaseConnection); batch writes that
//! must land together go through a single transaction.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::domain::check::{CheckKind, CheckOutcome, CheckRun};
use crate::domain::manga::{DeepCheckCandidate, TitleDetail, UserPushTarget};
use crate::domain::repositories::WatermarkStore;

pub struct SqliteWatermarkStore {
    pool: Arc<SqlitePool>,
}

impl SqliteWatermarkStore {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    fn placeholders(count: usize) -> String {
        vec!["?"; count].join(", ")
    }
}

#[async_trait]
impl WatermarkStore for SqliteWatermarkStore {
    async fn tracked_title_ids(&self, min_last_check: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT manga_id FROM user_manga
             WHERE COALESCE(last_check, -1) >= ?
             ORDER BY manga_id",
        )
        .bind(min_last_check)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("manga_id")).collect())
    }

    async fn latest_update_watermark(&self) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT MAX(last_update) AS watermark FROM user_manga")
            .fetch_one(&*self.pool)
            .await?;

        let watermark: Option<i64> = row.get("watermark");
        // 0 is the "never updated" sentinel, not a usable watermark.
        Ok(watermark.filter(|w| *w > 0))
    }

    async fn stale_deep_check_candidates(
        &self,
        limit: u32,
        min_last_check: i64,
        max_watermark: i64,
    ) -> Result<Vec<DeepCheckCandidate>> {
        // max(last_update, last_deep_check) < threshold, spelled as two
        // comparisons so the aggregate MAX stays unambiguous.
        let rows = sqlx::query(
            "SELECT manga_id,
                    MAX(last_update) AS last_update,
                    MAX(last_deep_check) AS last_deep_check,
                    MAX(last_deep_check_find) AS last_deep_check_find
             FROM user_manga
             WHERE COALESCE(last_check, -1) >= ?
             GROUP BY manga_id
             HAVING MAX(last_update) < ? AND MAX(last_deep_check) < ?
             ORDER BY last_deep_check ASC
             LIMIT ?",
        )
        .bind(min_last_check)
        .bind(max_watermark)
        .bind(max_watermark)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DeepCheckCandidate {
                manga_id: row.get("manga_id"),
                last_update: row.get("last_update"),
                last_deep_check: row.get("last_deep_check"),
                last_deep_check_find: row.get("last_deep_check_find"),
            })
            .collect())
    }

    async fn stale_title_candidates(
        &self,
        limit: u32,
        max_last_title_check: i64,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT manga_id FROM user_manga
             WHERE last_title_check < ?
             GROUP BY manga_id
             ORDER BY MIN(last_title_check) ASC
             LIMIT ?",
        )
        .bind(max_last_title_check)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("manga_id")).collect())
    }

    async fn apply_update_batch(&self, manga_ids: &[String], epoch: i64) -> Result<u64> {
        if manga_ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "UPDATE user_manga SET last_update = ? WHERE manga_id IN ({})",
            Self::placeholders(manga_ids.len())
        );
        let mut query = sqlx::query(&sql).bind(epoch);
        for manga_id in manga_ids {
            query = query.bind(manga_id);
        }
        let result = query.execute(&*self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn apply_deep_check_batch(&self, probes: &[(String, i64)], epoch: i64) -> Result<()> {
        if probes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (manga_id, find_time) in probes {
            // find-time only ever moves forward; a probe that saw nothing
            // (find_time 0) keeps the previous value.
            sqlx::query(
                "UPDATE user_manga
                 SET last_deep_check = ?,
                     last_deep_check_find = MAX(last_deep_check_find, ?)
                 WHERE manga_id = ?",
            )
            .bind(epoch)
            .bind(find_time)
            .bind(manga_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn apply_title_metadata(&self, details: &[TitleDetail], epoch: i64) -> Result<()> {
        if details.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for detail in details {
            sqlx::query(
                "UPDATE user_manga
                 SET manga_title = ?,
                     manga_status = ?,
                     last_volume = ?,
                     last_chapter = ?,
                     last_title_check = ?
                 WHERE manga_id = ?",
            )
            .bind(&detail.title)
            .bind(&detail.status)
            .bind(&detail.last_volume)
            .bind(&detail.last_chapter)
            .bind(epoch)
            .bind(&detail.manga_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn record_failed_titles(&self, manga_ids: &[String], epoch: i64) -> Result<()> {
        if manga_ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for manga_id in manga_ids {
            sqlx::query("INSERT OR REPLACE INTO failed_titles (manga_id, last_failure) VALUES (?, ?)")
                .bind(manga_id)
                .bind(epoch)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear_failed_titles(&self, manga_ids: &[String]) -> Result<()> {
        if manga_ids.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "DELETE FROM failed_titles WHERE manga_id IN ({})",
            Self::placeholders(manga_ids.len())
        );
        let mut query = sqlx::query(&sql);
        for manga_id in manga_ids {
            query = query.bind(manga_id);
        }
        query.execute(&*self.pool).await?;
        Ok(())
    }

    async fn start_run(&self, kind: CheckKind, epoch: i64) -> Result<()> {
        sqlx::query("INSERT INTO update_check (check_type, check_start_time) VALUES (?, ?)")
            .bind(kind.as_str())
            .bind(epoch)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn complete_run(
        &self,
        kind: CheckKind,
        epoch: i64,
        end_epoch: i64,
        outcome: CheckOutcome,
        extra: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE update_check
             SET check_end_time = ?, result = ?, extra = ?
             WHERE check_type = ? AND check_start_time = ?",
        )
        .bind(end_epoch)
        .bind(outcome.as_code())
        .bind(extra)
        .bind(kind.as_str())
        .bind(epoch)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn update_run_progress(&self, kind: CheckKind, epoch: i64, processed: u32) -> Result<()> {
        // Progress is parked in `extra` until complete_run writes the
        // final value; the row still reads as running (end_time null).
        sqlx::query(
            "UPDATE update_check SET extra = ?
             WHERE check_type = ? AND check_start_time = ?",
        )
        .bind(i64::from(processed))
        .bind(kind.as_str())
        .bind(epoch)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn latest_run(&self, kind: CheckKind) -> Result<Option<CheckRun>> {
        let row = sqlx::query(
            "SELECT check_start_time, check_end_time, result, extra
             FROM update_check
             WHERE check_type = ?
             ORDER BY check_start_time DESC
             LIMIT 1",
        )
        .bind(kind.as_str())
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|row| CheckRun {
            kind,
            start_time: row.get("check_start_time"),
            end_time: row.get("check_end_time"),
            result: row.get("result"),
            extra: row.get("extra"),
        }))
    }

    async fn users_to_notify(&self, epoch: i64) -> Result<Vec<UserPushTarget>> {
        let rows = sqlx::query(
            "SELECT u.user_id,
                    u.pushover_token,
                    u.pushover_app_token_override,
                    COUNT(m.manga_id) AS updated_count
             FROM user_id u
             JOIN user_manga m ON m.user_id = u.user_id
             WHERE u.pushover_token IS NOT NULL
               AND m.last_update = ?
             GROUP BY u.user_id, u.pushover_token, u.pushover_app_token_override
             ORDER BY u.user_id",
        )
        .bind(epoch)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let updated_count: i64 = row.get("updated_count");
                UserPushTarget {
                    user_id: row.get("user_id"),
                    push_token: row.get("pushover_token"),
                    app_token_override: row.get("pushover_app_token_override"),
                    updated_count: u32::try_from(updated_count).unwrap_or(u32::MAX),
                }
            })
            .collect())
    }
}
