//! Versioning & Test-Run Ledger
//!
//! Persists validation snapshots (`test_runs`), promoted algorithm
//! versions (`algorithm_version_registry`) and manual investigation notes
//! (`investigation_annotations`). Operations are grouped by concern:
//! - [`test_runs`]: capture and lifecycle of runs
//! - [`versions`]: promotion and baseline management
//! - [`investigation`]: annotations and summaries

pub mod investigation;
pub mod models;
pub mod test_runs;
pub mod versions;

pub use models::*;

use algolab_common::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Ledger over the shared database pool
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    /// Wrap a pool whose tables were created by [`crate::db::init_tables`]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_json<T: Serialize>(column: &str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", column, e)))
}

fn from_json<T: DeserializeOwned>(column: &str, value: &str) -> Result<T> {
    serde_json::from_str(value)
        .map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", column, e)))
}

fn from_json_opt<T: DeserializeOwned>(column: &str, value: Option<String>) -> Result<Option<T>> {
    value.map(|v| from_json(column, &v)).transpose()
}

fn parse_uuid(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("Invalid {} '{}': {}", column, value, e)))
}

fn now_db() -> (DateTime<Utc>, String) {
    let now = algolab_common::time::now();
    let text = algolab_common::time::to_db(&now);
    (now, text)
}
