// Database connection and pool management.
// Owns the SQLite pool and the idempotent schema migration.

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        // Create the database file (and its directory) if necessary;
        // sqlx will not create missing files by default.
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        if db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if !Path::new(db_path).exists() {
                std::fs::File::create(db_path)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_user_manga_sql = r#"
            CREATE TABLE IF NOT EXISTS user_manga (
                user_id TEXT NOT NULL,
                manga_id TEXT NOT NULL,
                last_check INTEGER,
                last_update INTEGER NOT NULL DEFAULT 0,
                last_deep_check INTEGER NOT NULL DEFAULT 0,
                last_deep_check_find INTEGER NOT NULL DEFAULT 0,
                manga_title TEXT,
                manga_status TEXT,
                last_volume TEXT,
                last_chapter TEXT,
                last_title_check INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, manga_id)
            )
        "#;

        let create_update_check_sql = r#"
            CREATE TABLE IF NOT EXISTS update_check (
                check_type TEXT NOT NULL,
                check_start_time INTEGER NOT NULL,
                check_end_time INTEGER,
                result INTEGER,
                extra INTEGER,
                PRIMARY KEY (check_type, check_start_time)
            )
        "#;

        let create_failed_titles_sql = r#"
            CREATE TABLE IF NOT EXISTS failed_titles (
                manga_id TEXT PRIMARY KEY,
                last_failure INTEGER NOT NULL
            )
        "#;

        let create_user_id_sql = r#"
            CREATE TABLE IF NOT EXISTS user_id (
                user_id TEXT PRIMARY KEY,
                pushover_token TEXT,
                pushover_app_token_override TEXT
            )
        "#;

        let create_index_sqls = [
            "CREATE INDEX IF NOT EXISTS idx_user_manga_manga_id ON user_manga (manga_id)",
            "CREATE INDEX IF NOT EXISTS idx_user_manga_last_check ON user_manga (last_check)",
            "CREATE INDEX IF NOT EXISTS idx_user_manga_last_update ON user_manga (last_update)",
            "CREATE INDEX IF NOT EXISTS idx_user_manga_last_title_check ON user_manga (last_title_check)",
        ];

        sqlx::query(create_user_manga_sql).execute(&self.pool).await?;
        sqlx::query(create_update_check_sql).execute(&self.pool).await?;
        sqlx::query(create_failed_titles_sql).execute(&self.pool).await?;
        sqlx::query(create_user_id_sql).execute(&self.pool).await?;
        for sql in create_index_sqls {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test.db");
        let database_url = format!("sqlite:{}", db_path.to_string_lossy());

        let db = DatabaseConnection::new(&database_url, 2).await?;
        assert!(!db.pool().is_closed());
        Ok(())
    }

    #[tokio::test]
    async fn test_database_migration() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test_migration.db");
        let database_url = format!("sqlite:{}", db_path.display());

        let db = DatabaseConnection::new(&database_url, 2).await?;
        db.migrate().await?;

        for table in ["user_manga", "update_check", "failed_titles", "user_id"] {
            let row = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                .bind(table)
                .fetch_optional(db.pool())
                .await?;
            assert!(row.is_some(), "table {table} missing after migration");
        }

        // Running the migration again must be a no-op.
        db.migrate().await?;
        Ok(())
    }
}
