//! Manual investigation of a test run
//!
//! A run enters `investigating`, collects annotations, and either
//! completes with a summary or is cancelled back to `pending`.

use super::test_runs::transition;
use super::{
    now_db, parse_uuid, to_json, AnnotationType, CategorySummary, CreateAnnotationInput,
    InvestigationAnnotation, InvestigationSummary, Ledger, TestOutcome,
};
use algolab_common::time::from_db;
use algolab_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

/// Category used for annotations without `error_category`
pub const UNCATEGORIZED: &str = "uncategorized";

const TOP_CATEGORIES: usize = 5;
const CATEGORY_EXAMPLES: usize = 3;

fn annotation_from_row(row: &SqliteRow) -> Result<InvestigationAnnotation> {
    let id: String = row.get("id");
    let run_id: String = row.get("run_id");
    let annotation_type: String = row.get("annotation_type");
    let severity: String = row.get("severity");
    let actionable: i64 = row.get("actionable");
    let created_at: String = row.get("created_at");

    Ok(InvestigationAnnotation {
        id: parse_uuid("id", &id)?,
        run_id: parse_uuid("run_id", &run_id)?,
        pair_id: row.get("pair_id"),
        turn_id: row.get("turn_id"),
        annotation_type: annotation_type.parse()?,
        content: row.get("content"),
        expected_tag: row.get("expected_tag"),
        predicted_tag: row.get("predicted_tag"),
        verbatim_excerpt: row.get("verbatim_excerpt"),
        error_category: row.get("error_category"),
        severity: severity.parse()?,
        actionable: actionable != 0,
        created_by: row.get("created_by"),
        created_at: from_db("created_at", &created_at)?,
    })
}

/// Aggregate annotations the way `generate_summary` reports them
pub fn summarize(annotations: &[InvestigationAnnotation]) -> InvestigationSummary {
    let mut summary = InvestigationSummary {
        total: annotations.len(),
        ..Default::default()
    };

    for annotation in annotations {
        *summary
            .by_type
            .entry(annotation.annotation_type.as_str().to_string())
            .or_insert(0) += 1;
        *summary
            .by_severity
            .entry(annotation.severity.as_str().to_string())
            .or_insert(0) += 1;
        if annotation.actionable {
            summary.actionable_count += 1;
        }
    }

    let mut categories: Vec<CategorySummary> = group_by_category(annotations)
        .into_iter()
        .map(|(category, items)| CategorySummary {
            category,
            count: items.len(),
            examples: items
                .iter()
                .take(CATEGORY_EXAMPLES)
                .map(|a| a.content.clone())
                .collect(),
        })
        .collect();
    // Stable sort keeps categories with equal counts in name order
    categories.sort_by(|a, b| b.count.cmp(&a.count));
    categories.truncate(TOP_CATEGORIES);
    summary.top_categories = categories;

    summary
}

fn group_by_category(
    annotations: &[InvestigationAnnotation],
) -> BTreeMap<String, Vec<InvestigationAnnotation>> {
    let mut groups: BTreeMap<String, Vec<InvestigationAnnotation>> = BTreeMap::new();
    for annotation in annotations {
        let category = annotation
            .error_category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNCATEGORIZED);
        groups
            .entry(category.to_string())
            .or_default()
            .push(annotation.clone());
    }
    groups
}

impl Ledger {
    pub async fn start_investigation(&self, run_id: Uuid) -> Result<()> {
        self.update_outcome(run_id, TestOutcome::Investigating).await
    }

    /// Return an investigating run to `pending`
    pub async fn cancel_investigation(&self, run_id: Uuid) -> Result<()> {
        self.update_outcome(run_id, TestOutcome::Pending).await
    }

    /// Store an annotation and bump the run's annotation count atomically
    ///
    /// # Errors
    /// `InvalidInput` for empty content, `NotFound` for an unknown run.
    pub async fn add_annotation(&self, input: CreateAnnotationInput) -> Result<InvestigationAnnotation> {
        if input.content.trim().is_empty() {
            return Err(Error::InvalidInput("Annotation content is required".to_string()));
        }

        let (created_at, created_at_db) = now_db();
        let annotation = InvestigationAnnotation {
            id: Uuid::new_v4(),
            run_id: input.run_id,
            pair_id: input.pair_id,
            turn_id: input.turn_id,
            annotation_type: input.annotation_type,
            content: input.content,
            expected_tag: input.expected_tag,
            predicted_tag: input.predicted_tag,
            verbatim_excerpt: input.verbatim_excerpt,
            error_category: input.error_category,
            severity: input.severity.unwrap_or_default(),
            actionable: input.actionable.unwrap_or(true),
            created_by: input.created_by,
            created_at,
        };

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE test_runs SET annotation_count = annotation_count + 1 WHERE run_id = ?",
        )
        .bind(annotation.run_id.to_string())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Test run {}", annotation.run_id)));
        }

        sqlx::query(
            r#"
            INSERT INTO investigation_annotations (
                id, run_id, pair_id, turn_id, annotation_type, content,
                expected_tag, predicted_tag, verbatim_excerpt, error_category,
                severity, actionable, created_by, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(annotation.id.to_string())
        .bind(annotation.run_id.to_string())
        .bind(annotation.pair_id)
        .bind(annotation.turn_id)
        .bind(annotation.annotation_type.as_str())
        .bind(&annotation.content)
        .bind(&annotation.expected_tag)
        .bind(&annotation.predicted_tag)
        .bind(&annotation.verbatim_excerpt)
        .bind(&annotation.error_category)
        .bind(annotation.severity.as_str())
        .bind(annotation.actionable)
        .bind(&annotation.created_by)
        .bind(&created_at_db)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(
            run_id = %annotation.run_id,
            annotation_type = annotation.annotation_type.as_str(),
            "Annotation added"
        );
        Ok(annotation)
    }

    /// Newest first
    pub async fn annotations_for_run(&self, run_id: Uuid) -> Result<Vec<InvestigationAnnotation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, run_id, pair_id, turn_id, annotation_type, content,
                   expected_tag, predicted_tag, verbatim_excerpt, error_category,
                   severity, actionable, created_by, created_at
            FROM investigation_annotations
            WHERE run_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(annotation_from_row).collect()
    }

    pub async fn annotations_of_type(
        &self,
        run_id: Uuid,
        annotation_type: AnnotationType,
    ) -> Result<Vec<InvestigationAnnotation>> {
        let annotations = self.annotations_for_run(run_id).await?;
        Ok(annotations
            .into_iter()
            .filter(|a| a.annotation_type == annotation_type)
            .collect())
    }

    /// Annotations grouped by `error_category`, missing ones under [`UNCATEGORIZED`]
    pub async fn annotations_by_category(
        &self,
        run_id: Uuid,
    ) -> Result<BTreeMap<String, Vec<InvestigationAnnotation>>> {
        let annotations = self.annotations_for_run(run_id).await?;
        Ok(group_by_category(&annotations))
    }

    pub async fn generate_summary(&self, run_id: Uuid) -> Result<InvestigationSummary> {
        // Surface NotFound rather than an empty summary
        self.get_test_run(run_id).await?;
        let annotations = self.annotations_for_run(run_id).await?;
        Ok(summarize(&annotations))
    }

    /// Close the investigation, storing the summary (generated when absent)
    /// and free-form notes
    pub async fn complete_investigation(
        &self,
        run_id: Uuid,
        summary: Option<InvestigationSummary>,
        notes: Option<String>,
    ) -> Result<InvestigationSummary> {
        let summary = match summary {
            Some(summary) => summary,
            None => self.generate_summary(run_id).await?,
        };
        let summary_json = to_json("investigation_summary", &summary)?;

        let mut tx = self.pool.begin().await?;
        transition(&mut tx, run_id, TestOutcome::Investigated).await?;
        sqlx::query(
            "UPDATE test_runs SET investigation_summary = ?, investigation_notes = ? WHERE run_id = ?",
        )
        .bind(&summary_json)
        .bind(&notes)
        .bind(run_id.to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(run_id = %run_id, annotations = summary.total, "Investigation completed");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory;
    use crate::ledger::AnnotationSeverity;
    use crate::normalizer::{RecordMetadata, ValidationRecord};
    use crate::registry::mock::MockAlgorithm;
    use crate::registry::AlgorithmRegistry;
    use crate::types::Target;
    use crate::validation::ValidationRun;
    use std::sync::Arc;

    async fn run(ledger: &Ledger) -> Uuid {
        let mut registry = AlgorithmRegistry::new();
        registry.register("mock-y", Arc::new(MockAlgorithm::new(Target::Y, "CLIENT_POSITIF")), None);
        let mut run = ValidationRun::empty("mock-y", Target::Y);
        run.records = vec![ValidationRecord {
            pair_id: Some(7),
            target: Target::Y,
            verbatim: "oui".to_string(),
            gold: "CLIENT_NEUTRE".to_string(),
            predicted: "CLIENT_POSITIF".to_string(),
            correct: false,
            confidence: 0.6,
            processing_time_ms: 1.0,
            algorithm_version: "0.9.0".to_string(),
            metadata: RecordMetadata::default(),
        }];
        ledger
            .capture_version_after_test(&run, &registry)
            .await
            .unwrap()
            .run_id
    }

    fn annotation(run_id: Uuid, category: Option<&str>, content: &str) -> CreateAnnotationInput {
        CreateAnnotationInput {
            error_category: category.map(str::to_string),
            ..CreateAnnotationInput::note(run_id, AnnotationType::ErrorPattern, content)
        }
    }

    #[tokio::test]
    async fn test_full_investigation_cycle() {
        let ledger = Ledger::new(open_memory().await.unwrap());
        let run_id = run(&ledger).await;

        ledger.start_investigation(run_id).await.unwrap();
        for i in 0..4 {
            ledger
                .add_annotation(annotation(run_id, Some("acquiescement"), &format!("oui neutre {}", i)))
                .await
                .unwrap();
        }
        ledger
            .add_annotation(CreateAnnotationInput {
                severity: Some(AnnotationSeverity::Critical),
                actionable: Some(false),
                ..annotation(run_id, None, "transcription bruitée")
            })
            .await
            .unwrap();
        ledger
            .add_annotation(CreateAnnotationInput::note(run_id, AnnotationType::Suggestion, "ajouter 'ouais'"))
            .await
            .unwrap();

        let loaded = ledger.get_test_run(run_id).await.unwrap();
        assert_eq!(loaded.annotation_count, 6);

        let summary = ledger.complete_investigation(run_id, None, Some("ok".to_string())).await.unwrap();
        assert_eq!(summary.total, 6);
        assert_eq!(summary.by_type["error_pattern"], 5);
        assert_eq!(summary.by_type["suggestion"], 1);
        assert_eq!(summary.by_severity["critical"], 1);
        assert_eq!(summary.by_severity["minor"], 5);
        assert_eq!(summary.actionable_count, 5);
        assert_eq!(summary.top_categories[0].category, "acquiescement");
        assert_eq!(summary.top_categories[0].count, 4);
        assert_eq!(summary.top_categories[0].examples.len(), 3);

        let loaded = ledger.get_test_run(run_id).await.unwrap();
        assert_eq!(loaded.outcome, TestOutcome::Investigated);
        assert_eq!(loaded.investigation_summary, Some(summary));
        assert_eq!(loaded.investigation_notes.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_cancel_returns_to_pending() {
        let ledger = Ledger::new(open_memory().await.unwrap());
        let run_id = run(&ledger).await;

        ledger.start_investigation(run_id).await.unwrap();
        ledger.cancel_investigation(run_id).await.unwrap();
        assert_eq!(
            ledger.get_test_run(run_id).await.unwrap().outcome,
            TestOutcome::Pending
        );
        // completing requires an open investigation
        assert!(ledger.complete_investigation(run_id, None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_annotation_for_unknown_run_is_rejected() {
        let ledger = Ledger::new(open_memory().await.unwrap());
        let ghost = Uuid::new_v4();
        assert!(matches!(
            ledger.add_annotation(annotation(ghost, None, "rien")).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            ledger.add_annotation(annotation(ghost, None, "   ")).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_grouping_by_category() {
        let ledger = Ledger::new(open_memory().await.unwrap());
        let run_id = run(&ledger).await;
        ledger.add_annotation(annotation(run_id, Some("ironie"), "c'est ça oui")).await.unwrap();
        ledger.add_annotation(annotation(run_id, Some(" "), "?")).await.unwrap();
        ledger.add_annotation(annotation(run_id, None, "??")).await.unwrap();

        let groups = ledger.annotations_by_category(run_id).await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["ironie"].len(), 1);
        assert_eq!(groups[UNCATEGORIZED].len(), 2);

        let suggestions = ledger
            .annotations_of_type(run_id, AnnotationType::Suggestion)
            .await
            .unwrap();
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_summary_of_nothing() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0);
        assert!(summary.top_categories.is_empty());
    }
}
