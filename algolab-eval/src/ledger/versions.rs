//! Version registry: promotion and baseline management

use super::test_runs::transition;
use super::{
    from_json, now_db, to_json, AlgorithmVersion, CreateVersionInput, Ledger, TestOutcome,
    VariableSlot, VersionStatus,
};
use crate::types::Target;
use crate::validation::ValidationMetrics;
use algolab_common::time::{from_db, to_db};
use algolab_common::{Error, Result};
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

const VERSION_COLUMNS: &str = r#"
    version_id, version_name, description, changelog,
    x_key, x_version, x_config, y_key, y_version, y_config,
    m1_key, m1_version, m1_config, m2_key, m2_version, m2_config,
    m3_key, m3_version, m3_config,
    level1_metrics, status, is_active, is_baseline, baseline_target, deprecated,
    git_commit_hash, git_tag, validation_sample_size, validation_date, created_at
"#;

/// `<key>-v<version>-<first 6 hex digits of sha256(seed)>`
fn make_version_id(key: &str, version: &str, seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let short: String = digest.iter().take(3).map(|b| format!("{:02x}", b)).collect();
    format!("{}-v{}-{}", key, version, short)
}

fn parse_target(value: &str) -> Result<Target> {
    value
        .parse::<Target>()
        .map_err(|e| Error::Internal(format!("Invalid target '{}': {}", value, e)))
}

fn version_from_row(row: &SqliteRow) -> Result<AlgorithmVersion> {
    let mut slots = BTreeMap::new();
    for target in Target::ALL {
        let prefix = target.column_prefix();
        let key: Option<String> = row.get(format!("{}_key", prefix).as_str());
        let Some(key) = key else { continue };
        let version: Option<String> = row.get(format!("{}_version", prefix).as_str());
        let config: Option<String> = row.get(format!("{}_config", prefix).as_str());
        let config = match config {
            Some(text) => from_json(&format!("{}_config", prefix), &text)?,
            None => serde_json::json!({}),
        };
        slots.insert(
            target,
            VariableSlot {
                key,
                version: version.unwrap_or_default(),
                config,
            },
        );
    }

    let level1_metrics: String = row.get("level1_metrics");
    let level1_metrics: BTreeMap<Target, ValidationMetrics> =
        from_json("level1_metrics", &level1_metrics)?;
    let status: String = row.get("status");
    let baseline_target: Option<String> = row.get("baseline_target");
    let sample_size: Option<i64> = row.get("validation_sample_size");
    let validation_date: String = row.get("validation_date");
    let created_at: String = row.get("created_at");
    let is_active: i64 = row.get("is_active");
    let is_baseline: i64 = row.get("is_baseline");
    let deprecated: i64 = row.get("deprecated");

    Ok(AlgorithmVersion {
        version_id: row.get("version_id"),
        version_name: row.get("version_name"),
        description: row.get("description"),
        changelog: row.get("changelog"),
        slots,
        level1_metrics,
        status: status.parse()?,
        is_active: is_active != 0,
        is_baseline: is_baseline != 0,
        baseline_target: baseline_target.as_deref().map(parse_target).transpose()?,
        deprecated: deprecated != 0,
        git_commit_hash: row.get("git_commit_hash"),
        git_tag: row.get("git_tag"),
        validation_sample_size: sample_size.map(|n| n.max(0) as usize),
        validation_date: from_db("validation_date", &validation_date)?,
        created_at: from_db("created_at", &created_at)?,
    })
}

async fn insert_version(conn: &mut SqliteConnection, version: &AlgorithmVersion) -> Result<()> {
    let mut columns: Vec<String> = ["version_id", "version_name", "description", "changelog"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    let mut slot_values = Vec::new();
    for target in Target::ALL {
        let prefix = target.column_prefix();
        columns.push(format!("{}_key", prefix));
        columns.push(format!("{}_version", prefix));
        columns.push(format!("{}_config", prefix));
        let value = match version.slot(target) {
            Some(slot) => (
                Some(slot.key.clone()),
                Some(slot.version.clone()),
                Some(to_json("slot config", &slot.config)?),
            ),
            None => (None, None, None),
        };
        slot_values.push(value);
    }
    columns.extend(
        [
            "level1_metrics",
            "status",
            "is_active",
            "is_baseline",
            "baseline_target",
            "deprecated",
            "git_commit_hash",
            "git_tag",
            "validation_sample_size",
            "validation_date",
            "created_at",
        ]
        .iter()
        .map(|c| c.to_string()),
    );

    let sql = format!(
        "INSERT INTO algorithm_version_registry ({}) VALUES ({})",
        columns.join(", "),
        vec!["?"; columns.len()].join(", ")
    );
    let level1_metrics = to_json("level1_metrics", &version.level1_metrics)?;

    let mut query = sqlx::query(&sql)
        .bind(&version.version_id)
        .bind(&version.version_name)
        .bind(&version.description)
        .bind(&version.changelog);
    for (key, slot_version, config) in slot_values {
        query = query.bind(key).bind(slot_version).bind(config);
    }
    query
        .bind(level1_metrics)
        .bind(version.status.as_str())
        .bind(version.is_active)
        .bind(version.is_baseline)
        .bind(version.baseline_target.map(|t| t.as_str()))
        .bind(version.deprecated)
        .bind(&version.git_commit_hash)
        .bind(&version.git_tag)
        .bind(version.validation_sample_size.map(|n| n as i64))
        .bind(to_db(&version.validation_date))
        .bind(to_db(&version.created_at))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Drop the baseline flag from every version that serves `target`
async fn clear_baseline(conn: &mut SqliteConnection, target: Target) -> Result<u64> {
    let sql = format!(
        r#"
        UPDATE algorithm_version_registry
        SET is_baseline = 0,
            baseline_target = NULL,
            status = CASE WHEN status = 'baseline' THEN 'validated' ELSE status END
        WHERE is_baseline = 1
          AND (baseline_target = ? OR (baseline_target IS NULL AND {}_key IS NOT NULL))
        "#,
        target.column_prefix()
    );
    let result = sqlx::query(&sql)
        .bind(target.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

async fn mark_baseline(conn: &mut SqliteConnection, version_id: &str, target: Target) -> Result<()> {
    let cleared = clear_baseline(&mut *conn, target).await?;
    sqlx::query(
        r#"
        UPDATE algorithm_version_registry
        SET is_baseline = 1, baseline_target = ?, status = 'baseline', is_active = 1
        WHERE version_id = ?
        "#,
    )
    .bind(target.as_str())
    .bind(version_id)
    .execute(&mut *conn)
    .await?;

    info!(version_id, target = %target, replaced = cleared, "Baseline set");
    Ok(())
}

impl Ledger {
    /// Turn a test run into a registered version
    ///
    /// The run's target slot is filled from the run itself and its metrics
    /// become the version's level-1 metrics. The version row, the run's
    /// `promoted` outcome and the optional baseline switch are written in
    /// one transaction.
    ///
    /// # Errors
    /// `InvalidInput` for an empty name or a run that cannot be promoted.
    pub async fn promote_to_version(
        &self,
        run_id: Uuid,
        input: CreateVersionInput,
    ) -> Result<AlgorithmVersion> {
        if input.version_name.trim().is_empty() {
            return Err(Error::InvalidInput("Version name is required".to_string()));
        }

        let run = self.get_test_run(run_id).await?;
        run.outcome.check_transition(TestOutcome::Promoted)?;

        let (created_at, created_at_db) = now_db();
        let mut slots = input.slots;
        let mut slot = VariableSlot::new(&run.algorithm_key, &run.algorithm_version);
        if let Some(config) = input.config {
            slot.config = config;
        }
        slots.insert(run.target, slot);

        let status = if input.is_baseline {
            VersionStatus::Baseline
        } else {
            input.status.unwrap_or(VersionStatus::Validated)
        };

        let version = AlgorithmVersion {
            version_id: make_version_id(
                &run.algorithm_key,
                &run.algorithm_version,
                &format!("{}{}", run_id, created_at_db),
            ),
            version_name: input.version_name,
            description: input.description,
            changelog: input.changelog,
            slots,
            level1_metrics: BTreeMap::from([(run.target, run.metrics.clone())]),
            status,
            is_active: true,
            is_baseline: false,
            baseline_target: None,
            deprecated: false,
            git_commit_hash: Some(
                input
                    .git_commit_hash
                    .unwrap_or_else(|| env!("GIT_HASH").to_string()),
            ),
            git_tag: input.git_tag,
            validation_sample_size: Some(run.sample_size),
            validation_date: run.run_date,
            created_at,
        };

        let mut tx = self.pool.begin().await?;
        insert_version(&mut tx, &version).await?;
        transition(&mut tx, run_id, TestOutcome::Promoted).await?;
        sqlx::query("UPDATE test_runs SET promoted_to_version_id = ? WHERE run_id = ?")
            .bind(&version.version_id)
            .bind(run_id.to_string())
            .execute(&mut *tx)
            .await?;
        if input.is_baseline {
            mark_baseline(&mut tx, &version.version_id, run.target).await?;
        }
        tx.commit().await?;

        info!(
            version_id = %version.version_id,
            run_id = %run_id,
            baseline = input.is_baseline,
            "Run promoted to version"
        );

        let version = AlgorithmVersion {
            is_baseline: input.is_baseline,
            baseline_target: input.is_baseline.then_some(run.target),
            ..version
        };
        Ok(version)
    }

    /// Make `version_id` the only baseline for `target`
    ///
    /// # Errors
    /// `InvalidInput` when the version has no slot for `target` or is
    /// deprecated.
    pub async fn set_as_baseline(&self, version_id: &str, target: Target) -> Result<()> {
        let version = self.get_version(version_id).await?;
        if version.deprecated {
            return Err(Error::InvalidInput(format!(
                "Version {} is deprecated",
                version_id
            )));
        }
        if version.slot(target).is_none() {
            return Err(Error::InvalidInput(format!(
                "Version {} has no {} algorithm",
                version_id, target
            )));
        }

        let mut tx = self.pool.begin().await?;
        mark_baseline(&mut tx, version_id, target).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn toggle_version_active(&self, version_id: &str, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE algorithm_version_registry SET is_active = ? WHERE version_id = ?")
            .bind(active)
            .bind(version_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Version {}", version_id)));
        }
        info!(version_id, active, "Version activity changed");
        Ok(())
    }

    /// Retire a version; a deprecated version is never a baseline
    pub async fn deprecate_version(&self, version_id: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE algorithm_version_registry
            SET status = 'deprecated', deprecated = 1, is_active = 0,
                is_baseline = 0, baseline_target = NULL
            WHERE version_id = ?
            "#,
        )
        .bind(version_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Version {}", version_id)));
        }
        warn!(version_id, "Version deprecated");
        Ok(())
    }

    pub async fn get_version(&self, version_id: &str) -> Result<AlgorithmVersion> {
        let sql = format!(
            "SELECT {} FROM algorithm_version_registry WHERE version_id = ?",
            VERSION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(version_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Version {}", version_id)))?;
        version_from_row(&row)
    }

    /// Newest first
    pub async fn all_versions(&self) -> Result<Vec<AlgorithmVersion>> {
        let sql = format!(
            "SELECT {} FROM algorithm_version_registry ORDER BY created_at DESC",
            VERSION_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(version_from_row).collect()
    }

    /// Versions with an algorithm bound to `target`, newest first
    pub async fn versions_for_target(&self, target: Target) -> Result<Vec<AlgorithmVersion>> {
        let sql = format!(
            "SELECT {} FROM algorithm_version_registry WHERE {}_key IS NOT NULL ORDER BY created_at DESC",
            VERSION_COLUMNS,
            target.column_prefix()
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(version_from_row).collect()
    }

    pub async fn baseline_for_target(&self, target: Target) -> Result<Option<AlgorithmVersion>> {
        let sql = format!(
            "SELECT {} FROM algorithm_version_registry WHERE is_baseline = 1 AND baseline_target = ?",
            VERSION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(target.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(version_from_row).transpose()
    }
}
