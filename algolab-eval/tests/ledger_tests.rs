//! Ledger integration tests: capture, investigate, promote, baseline

mod helpers;

use algolab_common::Error;
use algolab_eval::corpus::SqliteCorpusStore;
use algolab_eval::ledger::{
    AnnotationSeverity, AnnotationType, CreateAnnotationInput, CreateVersionInput, Ledger,
    TestOutcome, VersionStatus,
};
use algolab_eval::registry::AlgorithmRegistry;
use algolab_eval::types::Target;
use algolab_eval::validation::{HarnessOptions, ValidationHarness, ValidationRun};
use helpers::{create_test_db, seed_corpus, FixedClassifier};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn run_with(
    pool: &SqlitePool,
    prediction: &str,
    version: &str,
) -> (ValidationRun, Arc<AlgorithmRegistry>) {
    let mut registry = AlgorithmRegistry::new();
    registry.register("fixed-x", Arc::new(FixedClassifier::new(prediction, version)), None);
    let registry = Arc::new(registry);

    let store = Arc::new(SqliteCorpusStore::new(pool.clone()));
    let options = HarnessOptions {
        write_back: false,
        seed: Some(3),
        ..Default::default()
    };
    let harness = ValidationHarness::with_options(Arc::clone(&registry), store, options);
    let run = harness
        .validate("fixed-x", None, &CancellationToken::new())
        .await
        .unwrap();
    (run, registry)
}

#[tokio::test]
async fn test_promotion_lifecycle_and_baseline_diff() {
    let (_dir, pool) = create_test_db().await.unwrap();
    seed_corpus(&SqliteCorpusStore::new(pool.clone())).await.unwrap();
    let ledger = Ledger::new(pool.clone());

    // v1 predicts ENGAGEMENT everywhere: 2 of 4
    let (run, registry) = run_with(&pool, "ENGAGEMENT", "1.0.0").await;
    let first = ledger.capture_version_after_test(&run, &registry).await.unwrap();
    assert!(first.baseline_version_id.is_none());
    assert_eq!(first.error_pairs.len(), 2);

    ledger.start_investigation(first.run_id).await.unwrap();
    ledger
        .add_annotation(CreateAnnotationInput {
            error_category: Some("explication prise pour engagement".to_string()),
            expected_tag: Some("EXPLICATION".to_string()),
            predicted_tag: Some("ENGAGEMENT".to_string()),
            pair_id: Some(2),
            severity: Some(AnnotationSeverity::Critical),
            ..CreateAnnotationInput::note(first.run_id, AnnotationType::ErrorPattern, "verbe d'état")
        })
        .await
        .unwrap();
    let summary = ledger
        .complete_investigation(first.run_id, None, Some("baseline candidate".to_string()))
        .await
        .unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.by_severity["critical"], 1);

    let base = ledger
        .promote_to_version(
            first.run_id,
            CreateVersionInput {
                version_name: "Baseline v1".to_string(),
                is_baseline: true,
                git_commit_hash: Some("abc12345".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(base.status, VersionStatus::Baseline);
    assert_eq!(base.baseline_target, Some(Target::X));
    assert_eq!(base.git_commit_hash.as_deref(), Some("abc12345"));

    // v2 predicts EXPLICATION everywhere: 1 of 4
    let (run, registry) = run_with(&pool, "EXPLICATION", "2.0.0").await;
    let second = ledger.capture_version_after_test(&run, &registry).await.unwrap();
    assert_eq!(second.baseline_version_id.as_deref(), Some(base.version_id.as_str()));
    let diff = second.baseline_diff.unwrap();
    assert!((diff.accuracy_delta + 0.25).abs() < 1e-9);
    assert!((diff.errors_delta - 1.0).abs() < 1e-9);
    assert!((diff.corrections - 1.0).abs() < 1e-9);
    assert_eq!(diff.regressions, 0.0);

    ledger.update_outcome(second.run_id, TestOutcome::Discarded).await.unwrap();
    assert!(matches!(
        ledger
            .promote_to_version(
                second.run_id,
                CreateVersionInput {
                    version_name: "nope".to_string(),
                    ..Default::default()
                },
            )
            .await,
        Err(Error::InvalidInput(_))
    ));

    let runs = ledger.runs_for_algorithm("fixed-x", 10).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].run_id, second.run_id);
}

#[tokio::test]
async fn test_baseline_survives_reopen() {
    let (dir, pool) = create_test_db().await.unwrap();
    seed_corpus(&SqliteCorpusStore::new(pool.clone())).await.unwrap();

    let version_id = {
        let ledger = Ledger::new(pool.clone());
        let (run, registry) = run_with(&pool, "ENGAGEMENT", "1.0.0").await;
        let captured = ledger.capture_version_after_test(&run, &registry).await.unwrap();
        ledger
            .promote_to_version(
                captured.run_id,
                CreateVersionInput {
                    version_name: "persisted".to_string(),
                    is_baseline: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .version_id
    };
    pool.close().await;

    let reopened = algolab_eval::db::open(&dir.path().join("test_algolab.db"))
        .await
        .unwrap();
    let ledger = Ledger::new(reopened);
    let baseline = ledger.baseline_for_target(Target::X).await.unwrap().unwrap();
    assert_eq!(baseline.version_id, version_id);
    assert_eq!(baseline.level1_metrics[&Target::X].accuracy, 0.5);
    assert_eq!(ledger.all_versions().await.unwrap().len(), 1);
}
