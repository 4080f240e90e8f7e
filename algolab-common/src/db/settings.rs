//! Settings table accessors (key-value)

use crate::{Error, Result};
use sqlx::{Pool, Sqlite};

/// Settings key holding the language-model API key
pub const LLM_API_KEY_SETTING: &str = "llm_api_key";

/// Read a typed setting; `None` when the key is absent or NULL
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row.and_then(|(value,)| value) {
        Some(value) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Upsert a setting
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Get the language-model API key stored in the database
pub async fn get_llm_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, LLM_API_KEY_SETTING).await
}

/// Store the language-model API key in the database
pub async fn set_llm_api_key(db: &Pool<Sqlite>, key: &str) -> Result<()> {
    set_setting(db, LLM_API_KEY_SETTING, key).await
}

/// Maximum time write paths keep retrying on lock contention
pub async fn get_max_lock_wait_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting(db, "db_max_lock_wait_ms")
        .await
        .map(|opt| opt.unwrap_or(5000))
}
