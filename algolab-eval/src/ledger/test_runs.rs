//! Test-run capture and lifecycle

use super::{from_json, from_json_opt, now_db, parse_uuid, to_json, BaselineDiff, Ledger, TestOutcome, TestRun};
use crate::registry::AlgorithmRegistry;
use crate::types::Target;
use crate::utils::retry_on_lock;
use crate::validation::{compute_metrics, ValidationRun};
use algolab_common::db::get_max_lock_wait_ms;
use algolab_common::time::{from_db, from_db_opt};
use algolab_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::info;
use uuid::Uuid;

const RUN_COLUMNS: &str = r#"
    run_id, algorithm_key, algorithm_version, target, sample_size, metrics,
    error_pairs, outcome, baseline_version_id, baseline_diff, run_duration_ms,
    created_by, annotation_count, investigation_started_at,
    investigation_completed_at, investigation_summary, investigation_notes,
    promoted_to_version_id, run_date
"#;

fn run_from_row(row: &SqliteRow) -> Result<TestRun> {
    let run_id: String = row.get("run_id");
    let target: String = row.get("target");
    let metrics: String = row.get("metrics");
    let error_pairs: String = row.get("error_pairs");
    let outcome: String = row.get("outcome");
    let run_date: String = row.get("run_date");
    let sample_size: i64 = row.get("sample_size");
    let run_duration_ms: Option<i64> = row.get("run_duration_ms");
    let annotation_count: i64 = row.get("annotation_count");

    Ok(TestRun {
        run_id: parse_uuid("run_id", &run_id)?,
        algorithm_key: row.get("algorithm_key"),
        algorithm_version: row.get("algorithm_version"),
        target: target
            .parse::<Target>()
            .map_err(|e| Error::Internal(format!("Invalid target '{}': {}", target, e)))?,
        sample_size: sample_size.max(0) as usize,
        metrics: from_json("metrics", &metrics)?,
        error_pairs: from_json("error_pairs", &error_pairs)?,
        outcome: outcome.parse()?,
        baseline_version_id: row.get("baseline_version_id"),
        baseline_diff: from_json_opt("baseline_diff", row.get("baseline_diff"))?,
        run_duration_ms: run_duration_ms.map(|ms| ms.max(0) as u64),
        created_by: row.get("created_by"),
        annotation_count: annotation_count.max(0) as u32,
        investigation_started_at: from_db_opt(
            "investigation_started_at",
            row.get("investigation_started_at"),
        )?,
        investigation_completed_at: from_db_opt(
            "investigation_completed_at",
            row.get("investigation_completed_at"),
        )?,
        investigation_summary: from_json_opt(
            "investigation_summary",
            row.get("investigation_summary"),
        )?,
        investigation_notes: row.get("investigation_notes"),
        promoted_to_version_id: row.get("promoted_to_version_id"),
        run_date: from_db("run_date", &run_date)?,
    })
}

/// Read a run's outcome, check `next` is reachable, then write it
///
/// Entering `investigating` or `investigated` stamps the matching
/// investigation timestamp.
pub(crate) async fn transition(conn: &mut SqliteConnection, run_id: Uuid, next: TestOutcome) -> Result<()> {
    let current: Option<String> = sqlx::query_scalar("SELECT outcome FROM test_runs WHERE run_id = ?")
        .bind(run_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    let current: TestOutcome = current
        .ok_or_else(|| Error::NotFound(format!("Test run {}", run_id)))?
        .parse()?;
    current.check_transition(next)?;

    let (_, now) = now_db();
    let stamp_column = match next {
        TestOutcome::Investigating => Some("investigation_started_at"),
        TestOutcome::Investigated => Some("investigation_completed_at"),
        TestOutcome::Pending | TestOutcome::Promoted | TestOutcome::Discarded => None,
    };

    match stamp_column {
        Some(column) => {
            let sql = format!("UPDATE test_runs SET outcome = ?, {} = ? WHERE run_id = ?", column);
            sqlx::query(&sql)
                .bind(next.as_str())
                .bind(&now)
                .bind(run_id.to_string())
                .execute(&mut *conn)
                .await?;
        }
        None => {
            sqlx::query("UPDATE test_runs SET outcome = ? WHERE run_id = ?")
                .bind(next.as_str())
                .bind(run_id.to_string())
                .execute(&mut *conn)
                .await?;
        }
    }

    info!(run_id = %run_id, from = %current, to = %next, "Test run outcome changed");
    Ok(())
}

impl Ledger {
    /// Snapshot a finished harness run as a `pending` test run
    ///
    /// When the target has a baseline version with metrics for it, the
    /// run stores the baseline id and the computed [`BaselineDiff`].
    pub async fn capture_version_after_test(
        &self,
        run: &ValidationRun,
        registry: &AlgorithmRegistry,
    ) -> Result<TestRun> {
        let descriptor = registry
            .descriptor(&run.algorithm_key)
            .ok_or_else(|| Error::NotFound(format!("Algorithm '{}'", run.algorithm_key)))?;

        let metrics = compute_metrics(&run.records);
        let sample_size = run.records.len();

        let baseline = self.baseline_for_target(descriptor.target).await?;
        let (baseline_version_id, baseline_diff) = match baseline {
            Some(version) => {
                let diff = version
                    .level1_metrics
                    .get(&descriptor.target)
                    .map(|base| BaselineDiff::compute(&metrics, base, sample_size));
                (Some(version.version_id), diff)
            }
            None => (None, None),
        };

        let (run_date, run_date_db) = now_db();
        let test_run = TestRun {
            run_id: Uuid::new_v4(),
            algorithm_key: run.algorithm_key.clone(),
            algorithm_version: descriptor.version.clone(),
            target: descriptor.target,
            sample_size,
            metrics,
            error_pairs: run.error_pair_ids(),
            outcome: TestOutcome::Pending,
            baseline_version_id,
            baseline_diff,
            run_duration_ms: Some(run.duration_ms),
            created_by: None,
            annotation_count: 0,
            investigation_started_at: None,
            investigation_completed_at: None,
            investigation_summary: None,
            investigation_notes: None,
            promoted_to_version_id: None,
            run_date,
        };

        // Serialize before touching the database
        let run_id = test_run.run_id.to_string();
        let metrics_json = to_json("metrics", &test_run.metrics)?;
        let error_pairs_json = to_json("error_pairs", &test_run.error_pairs)?;
        let diff_json = test_run
            .baseline_diff
            .as_ref()
            .map(|d| to_json("baseline_diff", d))
            .transpose()?;
        let max_wait_ms = get_max_lock_wait_ms(&self.pool).await?;

        retry_on_lock("capture test run", max_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO test_runs (
                    run_id, algorithm_key, algorithm_version, target, sample_size,
                    metrics, error_pairs, outcome, baseline_version_id, baseline_diff,
                    run_duration_ms, annotation_count, run_date
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
                "#,
            )
            .bind(&run_id)
            .bind(&test_run.algorithm_key)
            .bind(&test_run.algorithm_version)
            .bind(test_run.target.as_str())
            .bind(sample_size as i64)
            .bind(&metrics_json)
            .bind(&error_pairs_json)
            .bind(TestOutcome::Pending.as_str())
            .bind(&test_run.baseline_version_id)
            .bind(&diff_json)
            .bind(run.duration_ms as i64)
            .bind(&run_date_db)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(())
        })
        .await?;

        info!(
            run_id = %test_run.run_id,
            algorithm = %test_run.algorithm_key,
            accuracy = test_run.metrics.accuracy,
            baseline = ?test_run.baseline_version_id,
            "Test run captured"
        );
        Ok(test_run)
    }

    pub async fn get_test_run(&self, run_id: Uuid) -> Result<TestRun> {
        let sql = format!("SELECT {} FROM test_runs WHERE run_id = ?", RUN_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Test run {}", run_id)))?;
        run_from_row(&row)
    }

    /// Most recent runs first
    pub async fn runs_for_algorithm(&self, algorithm_key: &str, limit: usize) -> Result<Vec<TestRun>> {
        let sql = format!(
            "SELECT {} FROM test_runs WHERE algorithm_key = ? ORDER BY run_date DESC LIMIT ?",
            RUN_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(algorithm_key)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(run_from_row).collect()
    }

    /// Move a run along its lifecycle
    ///
    /// # Errors
    /// `InvalidInput` for a transition outside the lifecycle, `NotFound`
    /// for an unknown run.
    pub async fn update_outcome(&self, run_id: Uuid, outcome: TestOutcome) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        transition(&mut tx, run_id, outcome).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn increment_annotation_count(&self, run_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE test_runs SET annotation_count = annotation_count + 1 WHERE run_id = ?",
        )
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Test run {}", run_id)));
        }
        Ok(())
    }
}
