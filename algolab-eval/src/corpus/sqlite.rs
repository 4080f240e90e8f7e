//! SQLite corpus store over the `turn_pairs` table

use super::{check_projection, CorpusPair, CorpusStore, PairFilter};
use crate::types::{ComputationStatus, Projection};
use crate::utils::retry_on_lock;
use algolab_common::db::get_max_lock_wait_ms;
use algolab_common::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Row, SqlitePool};

pub struct SqliteCorpusStore {
    pool: SqlitePool,
}

impl SqliteCorpusStore {
    /// Wrap a pool whose tables were created by [`crate::db::init_tables`]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace the annotated part of a pair
    ///
    /// Projection columns of an existing row are left untouched.
    pub async fn upsert_pair(&self, pair: &CorpusPair) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO turn_pairs (
                pair_id, call_id, strategy_tag, reaction_tag,
                advisor_verbatim, client_verbatim, advisor_turn_id, client_turn_id,
                prev1_verbatim, prev1_speaker, prev2_verbatim, prev2_speaker,
                next1_verbatim, computation_status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(pair_id) DO UPDATE SET
                call_id = excluded.call_id,
                strategy_tag = excluded.strategy_tag,
                reaction_tag = excluded.reaction_tag,
                advisor_verbatim = excluded.advisor_verbatim,
                client_verbatim = excluded.client_verbatim,
                advisor_turn_id = excluded.advisor_turn_id,
                client_turn_id = excluded.client_turn_id,
                prev1_verbatim = excluded.prev1_verbatim,
                prev1_speaker = excluded.prev1_speaker,
                prev2_verbatim = excluded.prev2_verbatim,
                prev2_speaker = excluded.prev2_speaker,
                next1_verbatim = excluded.next1_verbatim
            "#,
        )
        .bind(pair.pair_id)
        .bind(&pair.call_id)
        .bind(&pair.strategy_tag)
        .bind(&pair.reaction_tag)
        .bind(&pair.advisor_verbatim)
        .bind(&pair.client_verbatim)
        .bind(pair.advisor_turn_id)
        .bind(pair.client_turn_id)
        .bind(&pair.prev1_verbatim)
        .bind(&pair.prev1_speaker)
        .bind(&pair.prev2_verbatim)
        .bind(&pair.prev2_speaker)
        .bind(&pair.next1_verbatim)
        .bind(&pair.computation_status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn pair_from_row(row: &SqliteRow) -> CorpusPair {
    CorpusPair {
        pair_id: row.get("pair_id"),
        call_id: row.get("call_id"),
        strategy_tag: row.get("strategy_tag"),
        reaction_tag: row.get("reaction_tag"),
        advisor_verbatim: row.get("advisor_verbatim"),
        client_verbatim: row.get("client_verbatim"),
        advisor_turn_id: row.get("advisor_turn_id"),
        client_turn_id: row.get("client_turn_id"),
        prev1_verbatim: row.get("prev1_verbatim"),
        prev1_speaker: row.get("prev1_speaker"),
        prev2_verbatim: row.get("prev2_verbatim"),
        prev2_speaker: row.get("prev2_speaker"),
        next1_verbatim: row.get("next1_verbatim"),
        computation_status: row.get("computation_status"),
    }
}

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind a JSON value with its natural SQLite affinity
///
/// Arrays and objects are stored as JSON text.
fn bind_json<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

#[async_trait]
impl CorpusStore for SqliteCorpusStore {
    async fn fetch_pairs(&self, filter: &PairFilter) -> Result<Vec<CorpusPair>> {
        // LIMIT -1 is unbounded in SQLite
        let limit = filter.limit.map_or(-1, |l| l as i64);

        let rows = sqlx::query(
            r#"
            SELECT pair_id, call_id, strategy_tag, reaction_tag,
                   advisor_verbatim, client_verbatim, advisor_turn_id, client_turn_id,
                   prev1_verbatim, prev1_speaker, prev2_verbatim, prev2_speaker,
                   next1_verbatim, computation_status
            FROM turn_pairs
            WHERE (?1 IS NULL OR call_id = ?1)
            ORDER BY pair_id
            LIMIT ?2
            "#,
        )
        .bind(&filter.call_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(pair_from_row).collect())
    }

    async fn update_projection(&self, pair_id: i64, projection: &Projection) -> Result<()> {
        check_projection(projection)?;
        if projection.is_empty() {
            return Ok(());
        }

        // Column names come from the allow-list checked above
        let assignments: Vec<String> = projection
            .iter()
            .map(|(column, _)| format!("{} = ?", column))
            .collect();
        let sql = format!(
            "UPDATE turn_pairs SET {}, updated_at = ? WHERE pair_id = ?",
            assignments.join(", ")
        );
        let updated_at = algolab_common::time::to_db(&algolab_common::time::now());
        let max_wait_ms = get_max_lock_wait_ms(&self.pool).await?;

        let rows_affected = retry_on_lock("projection write", max_wait_ms, || async {
            let mut query = sqlx::query(&sql);
            for (_, value) in projection.iter() {
                query = bind_json(query, value);
            }
            let result = query
                .bind(&updated_at)
                .bind(pair_id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
            Ok(result.rows_affected())
        })
        .await?;

        if rows_affected == 0 {
            return Err(Error::NotFound(format!("Pair {}", pair_id)));
        }
        Ok(())
    }

    async fn mark_status(&self, pair_id: i64, status: ComputationStatus) -> Result<()> {
        let updated_at = algolab_common::time::to_db(&algolab_common::time::now());
        let max_wait_ms = get_max_lock_wait_ms(&self.pool).await?;

        let rows_affected = retry_on_lock("status write", max_wait_ms, || async {
            let result = sqlx::query(
                "UPDATE turn_pairs SET computation_status = ?, updated_at = ? WHERE pair_id = ?",
            )
            .bind(status.as_str())
            .bind(&updated_at)
            .bind(pair_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(result.rows_affected())
        })
        .await?;

        if rows_affected == 0 {
            return Err(Error::NotFound(format!("Pair {}", pair_id)));
        }
        Ok(())
    }
}
