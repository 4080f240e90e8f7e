//! Eval database tables
//!
//! The shared database file is opened by `algolab_common::db`; this module
//! adds the tables owned by the harness and the ledger. Every statement is
//! `IF NOT EXISTS`, so bootstrapping an existing file is a no-op.

use algolab_common::Result;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

/// Open (or create) the database file and make sure every table exists
pub async fn open(db_path: &Path) -> Result<SqlitePool> {
    let pool = algolab_common::db::init_database(db_path).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Private in-memory database with every table (tests, dry runs)
pub async fn open_memory() -> Result<SqlitePool> {
    let pool = algolab_common::db::init_memory_database().await?;
    init_tables(&pool).await?;
    Ok(pool)
}

pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    create_turn_pairs_table(pool).await?;
    create_test_runs_table(pool).await?;
    create_version_registry_table(pool).await?;
    create_annotations_table(pool).await?;
    info!("Eval tables ready");
    Ok(())
}

/// Corpus of annotated pairs plus the projection columns written back
async fn create_turn_pairs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS turn_pairs (
            pair_id INTEGER PRIMARY KEY,
            call_id TEXT NOT NULL,
            strategy_tag TEXT NOT NULL DEFAULT '',
            reaction_tag TEXT NOT NULL DEFAULT '',
            advisor_verbatim TEXT NOT NULL DEFAULT '',
            client_verbatim TEXT NOT NULL DEFAULT '',
            advisor_turn_id INTEGER,
            client_turn_id INTEGER,
            prev1_verbatim TEXT,
            prev1_speaker TEXT,
            prev2_verbatim TEXT,
            prev2_speaker TEXT,
            next1_verbatim TEXT,
            x_predicted_tag TEXT,
            x_confidence REAL,
            x_algorithm_key TEXT,
            x_algorithm_version TEXT,
            x_computed_at TEXT,
            y_predicted_tag TEXT,
            y_confidence REAL,
            y_algorithm_key TEXT,
            y_algorithm_version TEXT,
            y_computed_at TEXT,
            m1_verb_density REAL,
            m1_verb_count INTEGER,
            m1_total_words INTEGER,
            m1_action_verbs TEXT,
            m2_global_alignment REAL,
            m2_lexical_alignment REAL,
            m2_semantic_alignment REAL,
            m2_scores TEXT,
            m2_details TEXT,
            m3_cognitive_score REAL,
            m3_hesitation_count INTEGER,
            m3_pause_count INTEGER,
            m3_markers TEXT,
            computation_status TEXT,
            updated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_turn_pairs_call_id ON turn_pairs(call_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_test_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS test_runs (
            run_id TEXT PRIMARY KEY,
            algorithm_key TEXT NOT NULL,
            algorithm_version TEXT NOT NULL,
            target TEXT NOT NULL,
            sample_size INTEGER NOT NULL,
            metrics TEXT NOT NULL,
            error_pairs TEXT NOT NULL DEFAULT '[]',
            outcome TEXT NOT NULL DEFAULT 'pending'
                CHECK (outcome IN ('pending', 'investigating', 'investigated', 'promoted', 'discarded')),
            baseline_version_id TEXT,
            baseline_diff TEXT,
            run_duration_ms INTEGER,
            created_by TEXT,
            annotation_count INTEGER NOT NULL DEFAULT 0,
            investigation_started_at TEXT,
            investigation_completed_at TEXT,
            investigation_summary TEXT,
            investigation_notes TEXT,
            promoted_to_version_id TEXT,
            run_date TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_test_runs_algorithm ON test_runs(algorithm_key, run_date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Promoted versions, one key/version/config slot per target
///
/// `baseline_target` names the target a baseline row serves; the partial
/// unique index allows at most one baseline per target.
async fn create_version_registry_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS algorithm_version_registry (
            version_id TEXT PRIMARY KEY,
            version_name TEXT NOT NULL,
            description TEXT,
            changelog TEXT,
            x_key TEXT,
            x_version TEXT,
            x_config TEXT,
            y_key TEXT,
            y_version TEXT,
            y_config TEXT,
            m1_key TEXT,
            m1_version TEXT,
            m1_config TEXT,
            m2_key TEXT,
            m2_version TEXT,
            m2_config TEXT,
            m3_key TEXT,
            m3_version TEXT,
            m3_config TEXT,
            level1_metrics TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'validated',
            is_active INTEGER NOT NULL DEFAULT 1,
            is_baseline INTEGER NOT NULL DEFAULT 0,
            baseline_target TEXT,
            deprecated INTEGER NOT NULL DEFAULT 0,
            git_commit_hash TEXT,
            git_tag TEXT,
            validation_sample_size INTEGER,
            validation_date TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_version_registry_one_baseline
        ON algorithm_version_registry(baseline_target)
        WHERE is_baseline = 1
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_annotations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS investigation_annotations (
            id TEXT PRIMARY KEY,
            run_id TEXT NOT NULL REFERENCES test_runs(run_id) ON DELETE CASCADE,
            pair_id INTEGER,
            turn_id INTEGER,
            annotation_type TEXT NOT NULL,
            content TEXT NOT NULL,
            expected_tag TEXT,
            predicted_tag TEXT,
            verbatim_excerpt TEXT,
            error_category TEXT,
            severity TEXT NOT NULL DEFAULT 'minor',
            actionable INTEGER NOT NULL DEFAULT 1,
            created_by TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_annotations_run_id ON investigation_annotations(run_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
