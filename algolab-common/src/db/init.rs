//! Database initialization
//!
//! Opens (or creates) the SQLite database shared by the corpus store and
//! the versioning ledger, applies connection pragmas and makes sure the
//! `settings` table exists with its defaults. Crate-specific tables are
//! created by their owners (see `algolab_eval::db`).

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Default busy timeout applied before settings are readable
const DEFAULT_BUSY_TIMEOUT_MS: i64 = 5000;

/// Initialize database connection and create the settings table if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL lets the proxy endpoint read while a harness run writes back
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    apply_busy_timeout(&pool, DEFAULT_BUSY_TIMEOUT_MS).await?;

    create_settings_table(&pool).await?;
    init_default_settings(&pool).await?;

    let timeout_ms: i64 = sqlx::query_scalar(
        "SELECT CAST(value AS INTEGER) FROM settings WHERE key = 'db_lock_retry_ms'",
    )
    .fetch_optional(&pool)
    .await?
    .unwrap_or(250);
    apply_busy_timeout(&pool, timeout_ms).await?;

    info!("Database busy timeout set to {} ms", timeout_ms);

    Ok(pool)
}

/// Open a private in-memory database with the settings table
///
/// A single connection is used: every SQLite `:memory:` connection is a
/// distinct database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    create_settings_table(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

async fn apply_busy_timeout(pool: &SqlitePool, timeout_ms: i64) -> Result<()> {
    let pragma_sql = format!("PRAGMA busy_timeout = {}", timeout_ms);
    sqlx::query(&pragma_sql).execute(pool).await?;
    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or repair default settings
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // SQLite lock handling
    ensure_setting(pool, "db_lock_retry_ms", "250").await?;
    ensure_setting(pool, "db_max_lock_wait_ms", "5000").await?;

    // Validation harness
    ensure_setting(pool, "harness_default_sample_size", "200").await?;

    Ok(())
}

/// Ensure a setting exists, resetting NULL values to the default
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // INSERT OR IGNORE: two processes may bootstrap the same file
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;

        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_database_creates_file_and_settings() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("sub").join("algolab.db");

        let pool = init_database(&db_path).await.unwrap();
        assert!(db_path.exists());

        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'db_max_lock_wait_ms'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(value.as_deref(), Some("5000"));
    }

    #[tokio::test]
    async fn test_init_database_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("algolab.db");

        let pool = init_database(&db_path).await.unwrap();
        pool.close().await;
        let pool = init_database(&db_path).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_null_setting_is_reset() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query("UPDATE settings SET value = NULL WHERE key = 'db_lock_retry_ms'")
            .execute(&pool)
            .await
            .unwrap();

        init_default_settings(&pool).await.unwrap();

        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'db_lock_retry_ms'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(value.as_deref(), Some("250"));
    }
}
