//! Ledger data model

use crate::types::Target;
use crate::validation::ValidationMetrics;
use algolab_common::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Test runs
// ============================================================================

/// Lifecycle state of a test run
///
/// ```text
/// pending ──► investigating ──► investigated ──► promoted
///    │   ◄────────┘ (cancel)                       ▲
///    ├──► discarded                                │
///    └─────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Pending,
    Investigating,
    Investigated,
    Promoted,
    Discarded,
}

impl TestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestOutcome::Pending => "pending",
            TestOutcome::Investigating => "investigating",
            TestOutcome::Investigated => "investigated",
            TestOutcome::Promoted => "promoted",
            TestOutcome::Discarded => "discarded",
        }
    }

    pub fn can_transition_to(&self, next: TestOutcome) -> bool {
        use TestOutcome::*;
        matches!(
            (self, next),
            (Pending, Investigating)
                | (Investigating, Investigated)
                | (Investigating, Pending)
                | (Pending, Promoted)
                | (Investigated, Promoted)
                | (Pending, Discarded)
        )
    }

    /// `InvalidInput` for any transition outside the lifecycle
    pub fn check_transition(&self, next: TestOutcome) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "Invalid test run transition {} -> {}",
                self, next
            )))
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestOutcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TestOutcome::Pending),
            "investigating" => Ok(TestOutcome::Investigating),
            "investigated" => Ok(TestOutcome::Investigated),
            "promoted" => Ok(TestOutcome::Promoted),
            "discarded" => Ok(TestOutcome::Discarded),
            other => Err(Error::Internal(format!("Unknown test outcome '{}'", other))),
        }
    }
}

/// Comparison of a run against the target's baseline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineDiff {
    pub accuracy_delta: f64,
    pub kappa_delta: f64,
    /// F1 change for classes present in both snapshots
    pub f1_deltas: BTreeMap<String, f64>,
    /// Approximate change in error count (negative means fewer errors)
    pub errors_delta: f64,
    /// `max(errors_delta, 0)`: positive when the run makes more errors than
    /// the baseline, so a drop in accuracy lands here
    pub corrections: f64,
    /// `max(-errors_delta, 0)`: positive when the run makes fewer errors
    /// than the baseline, so a gain in accuracy lands here
    pub regressions: f64,
}

impl BaselineDiff {
    pub fn compute(current: &ValidationMetrics, baseline: &ValidationMetrics, sample_size: usize) -> Self {
        let accuracy_delta = current.accuracy - baseline.accuracy;
        let kappa_delta = current.kappa - baseline.kappa;

        let f1_deltas = current
            .per_class
            .iter()
            .filter_map(|(label, m)| {
                baseline
                    .per_class
                    .get(label)
                    .map(|b| (label.clone(), m.f1 - b.f1))
            })
            .collect();

        let errors_delta = -accuracy_delta * sample_size as f64;

        Self {
            accuracy_delta,
            kappa_delta,
            f1_deltas,
            errors_delta,
            corrections: errors_delta.max(0.0),
            regressions: (-errors_delta).max(0.0),
        }
    }
}

/// One validation snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    pub run_id: Uuid,
    pub algorithm_key: String,
    pub algorithm_version: String,
    pub target: Target,
    pub sample_size: usize,
    pub metrics: ValidationMetrics,
    pub error_pairs: Vec<i64>,
    pub outcome: TestOutcome,
    pub baseline_version_id: Option<String>,
    pub baseline_diff: Option<BaselineDiff>,
    pub run_duration_ms: Option<u64>,
    pub created_by: Option<String>,
    pub annotation_count: u32,
    pub investigation_started_at: Option<DateTime<Utc>>,
    pub investigation_completed_at: Option<DateTime<Utc>>,
    pub investigation_summary: Option<InvestigationSummary>,
    pub investigation_notes: Option<String>,
    pub promoted_to_version_id: Option<String>,
    pub run_date: DateTime<Utc>,
}

// ============================================================================
// Version registry
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Draft,
    Validated,
    Baseline,
    Deprecated,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Draft => "draft",
            VersionStatus::Validated => "validated",
            VersionStatus::Baseline => "baseline",
            VersionStatus::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(VersionStatus::Draft),
            "validated" => Ok(VersionStatus::Validated),
            "baseline" => Ok(VersionStatus::Baseline),
            "deprecated" => Ok(VersionStatus::Deprecated),
            other => Err(Error::Internal(format!("Unknown version status '{}'", other))),
        }
    }
}

/// Algorithm bound to one target in a version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSlot {
    pub key: String,
    pub version: String,
    pub config: serde_json::Value,
}

impl VariableSlot {
    pub fn new(key: &str, version: &str) -> Self {
        Self {
            key: key.to_string(),
            version: version.to_string(),
            config: serde_json::json!({}),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmVersion {
    pub version_id: String,
    pub version_name: String,
    pub description: Option<String>,
    pub changelog: Option<String>,
    pub slots: BTreeMap<Target, VariableSlot>,
    /// Metrics that justified promotion, per target
    pub level1_metrics: BTreeMap<Target, ValidationMetrics>,
    pub status: VersionStatus,
    pub is_active: bool,
    pub is_baseline: bool,
    pub baseline_target: Option<Target>,
    pub deprecated: bool,
    pub git_commit_hash: Option<String>,
    pub git_tag: Option<String>,
    pub validation_sample_size: Option<usize>,
    pub validation_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AlgorithmVersion {
    pub fn slot(&self, target: Target) -> Option<&VariableSlot> {
        self.slots.get(&target)
    }
}

/// Input of `promote_to_version`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateVersionInput {
    pub version_name: String,
    pub description: Option<String>,
    pub changelog: Option<String>,
    /// Extra target slots bound alongside the run's own slot
    #[serde(default)]
    pub slots: BTreeMap<Target, VariableSlot>,
    /// Configuration stored in the run's slot
    pub config: Option<serde_json::Value>,
    pub status: Option<VersionStatus>,
    #[serde(default)]
    pub is_baseline: bool,
    /// Defaults to the hash of the running build
    pub git_commit_hash: Option<String>,
    pub git_tag: Option<String>,
}

// ============================================================================
// Investigation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationType {
    ErrorPattern,
    Suggestion,
    Note,
}

impl AnnotationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationType::ErrorPattern => "error_pattern",
            AnnotationType::Suggestion => "suggestion",
            AnnotationType::Note => "note",
        }
    }
}

impl FromStr for AnnotationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "error_pattern" => Ok(AnnotationType::ErrorPattern),
            "suggestion" => Ok(AnnotationType::Suggestion),
            "note" => Ok(AnnotationType::Note),
            other => Err(Error::InvalidInput(format!("Unknown annotation type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationSeverity {
    Critical,
    #[default]
    Minor,
    EdgeCase,
}

impl AnnotationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationSeverity::Critical => "critical",
            AnnotationSeverity::Minor => "minor",
            AnnotationSeverity::EdgeCase => "edge_case",
        }
    }
}

impl FromStr for AnnotationSeverity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "critical" => Ok(AnnotationSeverity::Critical),
            "minor" => Ok(AnnotationSeverity::Minor),
            "edge_case" => Ok(AnnotationSeverity::EdgeCase),
            other => Err(Error::InvalidInput(format!("Unknown severity '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationAnnotation {
    pub id: Uuid,
    pub run_id: Uuid,
    pub pair_id: Option<i64>,
    pub turn_id: Option<i64>,
    pub annotation_type: AnnotationType,
    pub content: String,
    pub expected_tag: Option<String>,
    pub predicted_tag: Option<String>,
    pub verbatim_excerpt: Option<String>,
    pub error_category: Option<String>,
    pub severity: AnnotationSeverity,
    pub actionable: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input of `add_annotation`; severity defaults to minor, actionable to true
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAnnotationInput {
    pub run_id: Uuid,
    pub pair_id: Option<i64>,
    pub turn_id: Option<i64>,
    pub annotation_type: AnnotationType,
    pub content: String,
    pub expected_tag: Option<String>,
    pub predicted_tag: Option<String>,
    pub verbatim_excerpt: Option<String>,
    pub error_category: Option<String>,
    pub severity: Option<AnnotationSeverity>,
    pub actionable: Option<bool>,
    pub created_by: Option<String>,
}

impl CreateAnnotationInput {
    pub fn note(run_id: Uuid, annotation_type: AnnotationType, content: &str) -> Self {
        Self {
            run_id,
            pair_id: None,
            turn_id: None,
            annotation_type,
            content: content.to_string(),
            expected_tag: None,
            predicted_tag: None,
            verbatim_excerpt: None,
            error_category: None,
            severity: None,
            actionable: None,
            created_by: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub count: usize,
    pub examples: Vec<String>,
}

/// Aggregate of a run's annotations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvestigationSummary {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub top_categories: Vec<CategorySummary>,
    pub actionable_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ClassMetrics;

    #[test]
    fn test_lifecycle_transitions() {
        use TestOutcome::*;
        assert!(Pending.can_transition_to(Investigating));
        assert!(Investigating.can_transition_to(Investigated));
        assert!(Investigating.can_transition_to(Pending));
        assert!(Investigated.can_transition_to(Promoted));
        assert!(Pending.can_transition_to(Promoted));
        assert!(Pending.can_transition_to(Discarded));

        assert!(!Promoted.can_transition_to(Pending));
        assert!(!Investigated.can_transition_to(Investigating));
        assert!(!Discarded.can_transition_to(Investigating));
        assert!(!Investigating.can_transition_to(Promoted));
        assert!(matches!(
            Promoted.check_transition(Investigating),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_outcome_round_trips_through_text() {
        for outcome in [
            TestOutcome::Pending,
            TestOutcome::Investigating,
            TestOutcome::Investigated,
            TestOutcome::Promoted,
            TestOutcome::Discarded,
        ] {
            assert_eq!(outcome.as_str().parse::<TestOutcome>().unwrap(), outcome);
        }
        assert!("archived".parse::<TestOutcome>().is_err());
    }

    fn metrics(accuracy: f64, kappa: f64, f1: &[(&str, f64)]) -> ValidationMetrics {
        ValidationMetrics {
            accuracy,
            kappa,
            per_class: f1
                .iter()
                .map(|(label, f1)| {
                    (
                        label.to_string(),
                        ClassMetrics {
                            f1: *f1,
                            ..Default::default()
                        },
                    )
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_baseline_diff_formula() {
        let current = metrics(0.8, 0.7, &[("ENGAGEMENT", 0.9), ("OUVERTURE", 0.5)]);
        let baseline = metrics(0.7, 0.6, &[("ENGAGEMENT", 0.8)]);

        let diff = BaselineDiff::compute(&current, &baseline, 100);
        assert!((diff.accuracy_delta - 0.1).abs() < 1e-9);
        assert!((diff.kappa_delta - 0.1).abs() < 1e-9);
        assert_eq!(diff.f1_deltas.len(), 1);
        assert!((diff.f1_deltas["ENGAGEMENT"] - 0.1).abs() < 1e-9);
        // errors_delta = -accuracy_delta * sample_size
        assert!((diff.errors_delta + 10.0).abs() < 1e-9);
        assert_eq!(diff.corrections, 0.0);
        assert!((diff.regressions - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_loss_lands_in_corrections() {
        let current = metrics(0.6, 0.5, &[]);
        let baseline = metrics(0.75, 0.6, &[]);

        let diff = BaselineDiff::compute(&current, &baseline, 40);
        assert!((diff.errors_delta - 6.0).abs() < 1e-9);
        assert!((diff.corrections - 6.0).abs() < 1e-9);
        assert_eq!(diff.regressions, 0.0);

        let unchanged = BaselineDiff::compute(&baseline, &baseline, 40);
        assert_eq!(unchanged.corrections, 0.0);
        assert_eq!(unchanged.regressions, 0.0);
    }
}
