//! Database Test Utilities

use algolab_eval::corpus::{CorpusPair, SqliteCorpusStore};
use anyhow::Result;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Create a file-backed database with every eval table
///
/// Returns (TempDir, SqlitePool); the TempDir must outlive the test.
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_algolab.db");
    let pool = algolab_eval::db::open(&db_path).await?;
    Ok((temp_dir, pool))
}

/// Four annotated pairs from two calls
///
/// Advisor strategies: two ENGAGEMENT, one EXPLICATION, one REFLET_VOUS.
pub fn corpus_pairs() -> Vec<CorpusPair> {
    vec![
        CorpusPair::new(
            1,
            "call-1",
            "ENGAGEMENT",
            "CLIENT_POSITIF",
            "je vous envoie le formulaire aujourd'hui",
            "d'accord merci beaucoup",
        ),
        CorpusPair::new(
            2,
            "call-1",
            "EXPLICATION",
            "CLIENT_NEUTRE",
            "le système fonctionne avec un délai de traitement",
            "euh... bon... je vois",
        ),
        CorpusPair::new(
            3,
            "call-2",
            "ENGAGEMENT",
            "CLIENT_NEUTRE",
            "je m'en occupe tout de suite",
            "hum d'accord",
        ),
        CorpusPair::new(
            4,
            "call-2",
            "REFLET_VOUS",
            "CLIENT_NEGATIF",
            "vous avez reçu un courrier",
            "non mais c'est inadmissible",
        ),
    ]
}

pub async fn seed_corpus(store: &SqliteCorpusStore) -> Result<()> {
    for pair in corpus_pairs() {
        store.upsert_pair(&pair).await?;
    }
    Ok(())
}

/// Column names of `table` (PRAGMA table_info)
pub async fn table_columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>> {
    let rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
        sqlx::query_as(&format!("PRAGMA table_info({})", table))
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(_, name, ..)| name).collect())
}
