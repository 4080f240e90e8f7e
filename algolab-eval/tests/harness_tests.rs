//! Harness integration tests over a file-backed corpus

mod helpers;

use algolab_common::Error;
use algolab_eval::corpus::{CorpusPair, CorpusStore, PairFilter, SqliteCorpusStore};
use algolab_eval::labels::UNRECOGNIZED_LABEL;
use algolab_eval::metrics::PauseLoadCalculator;
use algolab_eval::registry::AlgorithmRegistry;
use algolab_eval::types::Target;
use algolab_eval::validation::{HarnessOptions, ValidationHarness, WriteBackConfig};
use helpers::{create_test_db, seed_corpus, table_columns, FixedClassifier};
use sqlx::Row;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn options(write_back: bool) -> HarnessOptions {
    HarnessOptions {
        write_back,
        seed: Some(7),
        write_back_config: WriteBackConfig {
            retry_backoff: Duration::from_millis(1),
            inter_batch_pause: Duration::ZERO,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn registry() -> Arc<AlgorithmRegistry> {
    let mut registry = AlgorithmRegistry::new();
    registry.register("fixed-x", Arc::new(FixedClassifier::new("ENGAGEMENT", "1.1.0")), None);
    registry.register("broken-x", Arc::new(FixedClassifier::failing()), None);
    registry.register("m3-pauses", Arc::new(PauseLoadCalculator::new()), None);
    Arc::new(registry)
}

#[tokio::test]
async fn test_projection_columns_exist() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let columns = table_columns(&pool, "turn_pairs").await.unwrap();
    for column in algolab_eval::corpus::PROJECTION_COLUMNS {
        assert!(columns.iter().any(|c| c == column), "missing {}", column);
    }
}

#[tokio::test]
async fn test_validate_writes_predictions_back() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = Arc::new(SqliteCorpusStore::new(pool.clone()));
    seed_corpus(&store).await.unwrap();

    let harness = ValidationHarness::with_options(registry(), store.clone(), options(true));
    let run = harness
        .validate("fixed-x", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.target, Target::X);
    assert_eq!(run.sample_size(), 4);
    assert_eq!(run.metrics.correct, 2);
    assert_eq!(run.metrics.accuracy, 0.5);
    assert_eq!(run.write_back.map(|r| r.succeeded), Some(4));

    let row = sqlx::query(
        "SELECT x_predicted_tag, x_algorithm_key, x_algorithm_version, computation_status \
         FROM turn_pairs WHERE pair_id = 2",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.get::<String, _>("x_predicted_tag"), "ENGAGEMENT");
    assert_eq!(row.get::<String, _>("x_algorithm_key"), "fixed-x");
    assert_eq!(row.get::<String, _>("x_algorithm_version"), "1.1.0");
    assert_eq!(row.get::<String, _>("computation_status"), "complete");

    // annotated columns untouched
    let pairs = store.fetch_pairs(&PairFilter::for_call("call-1")).await.unwrap();
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[1].strategy_tag, "EXPLICATION");
}

#[tokio::test]
async fn test_failures_are_recorded_not_raised() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = Arc::new(SqliteCorpusStore::new(pool.clone()));
    seed_corpus(&store).await.unwrap();

    let harness = ValidationHarness::with_options(registry(), store, options(true));
    let run = harness
        .validate("broken-x", Some(3), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.sample_size(), 3);
    assert_eq!(run.metrics.fallback_count, 3);
    assert!(run.records.iter().all(|r| r.predicted == UNRECOGNIZED_LABEL));
    assert_eq!(run.metrics.accuracy, 0.0);

    let errors: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM turn_pairs WHERE computation_status = 'error'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(errors, 3);
}

#[tokio::test]
async fn test_metric_run_and_comparison() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = Arc::new(SqliteCorpusStore::new(pool.clone()));
    seed_corpus(&store).await.unwrap();

    let harness = ValidationHarness::with_options(registry(), store, options(true));
    let run = harness
        .validate("m3-pauses", None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(run.target, Target::M3);
    let summary = run.metrics.continuous.as_ref().unwrap();
    assert_eq!(summary.count, 4);
    assert!(summary.max >= summary.min);

    let hesitant: Option<f64> =
        sqlx::query_scalar("SELECT m3_cognitive_score FROM turn_pairs WHERE pair_id = 2")
            .fetch_one(&pool)
            .await
            .unwrap();
    let calm: Option<f64> =
        sqlx::query_scalar("SELECT m3_cognitive_score FROM turn_pairs WHERE pair_id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(hesitant.unwrap() > calm.unwrap());

    let keys = vec!["fixed-x".to_string(), "m3-pauses".to_string()];
    let runs = harness.compare(&keys, Some(2), &CancellationToken::new()).await;
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].algorithm_key, "fixed-x");
    assert_eq!(runs[1].target, Target::M3);
    assert!(runs.iter().all(|r| r.sample_size() == 2));
}

#[tokio::test]
async fn test_seeded_sampling_is_reproducible() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = Arc::new(SqliteCorpusStore::new(pool));
    seed_corpus(&store).await.unwrap();

    let harness = ValidationHarness::with_options(registry(), store, options(false));
    let cancel = CancellationToken::new();
    let first = harness.validate("fixed-x", Some(2), &cancel).await.unwrap();
    let second = harness.validate("fixed-x", Some(2), &cancel).await.unwrap();

    let ids = |run: &algolab_eval::validation::ValidationRun| {
        run.records.iter().map(|r| r.pair_id).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
    assert!(first.write_back.is_none());
}

#[tokio::test]
async fn test_untagged_and_blank_pairs_are_not_scored() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = Arc::new(SqliteCorpusStore::new(pool.clone()));
    seed_corpus(&store).await.unwrap();
    store
        .upsert_pair(&CorpusPair::new(5, "call-3", "", "", "texte sans tag", "oui"))
        .await
        .unwrap();
    store
        .upsert_pair(&CorpusPair::new(6, "call-3", "ENGAGEMENT", "CLIENT_POSITIF", "   ", "   "))
        .await
        .unwrap();

    let mut registry = AlgorithmRegistry::new();
    registry.register("fixed-x", Arc::new(FixedClassifier::new("EXPLICATION", "1.0.0")), None);
    let harness = ValidationHarness::with_options(Arc::new(registry), store, options(false));

    let counts = harness.available_sample_counts().await.unwrap();
    assert_eq!(counts[&Target::X], 4);
    assert_eq!(counts[&Target::Y], 4);

    let run = harness
        .validate("fixed-x", None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(run.sample_size(), 4);
    assert_eq!(run.metrics.correct, 1);
    assert_eq!(run.metrics.accuracy, 0.25);
    assert!(run.records.iter().all(|r| matches!(r.pair_id, Some(1..=4))));

    let confusion = &run.metrics.confusion;
    assert_eq!(confusion.total(), 4);
    assert_eq!(confusion.labels, vec!["ENGAGEMENT", "EXPLICATION", "REFLET_VOUS"]);
    assert_eq!(confusion.row_total("EXPLICATION"), 1);
}

#[tokio::test]
async fn test_corpus_without_gold_rows_is_rejected() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = Arc::new(SqliteCorpusStore::new(pool.clone()));
    store
        .upsert_pair(&CorpusPair::new(1, "call-1", "", "", "texte sans tag", "oui"))
        .await
        .unwrap();
    store
        .upsert_pair(&CorpusPair::new(2, "call-1", "ENGAGEMENT", "CLIENT_POSITIF", "  ", "  "))
        .await
        .unwrap();

    let harness = ValidationHarness::with_options(registry(), store, options(false));
    let result = harness
        .validate("fixed-x", None, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}
