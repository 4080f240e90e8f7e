//! Level-1 metrics over validation records
//!
//! Accuracy, per-class precision/recall/F1, Cohen's kappa and the
//! confusion matrix. Everything is rebuilt from the records on each call.

use crate::normalizer::ValidationRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Confusion column for predictions outside the gold label set
pub const OTHER_LABEL: &str = "__AUTRE__";

/// Gold label → predicted column → count
///
/// Rows are every gold label seen; columns are the gold labels plus
/// [`OTHER_LABEL`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub counts: BTreeMap<String, BTreeMap<String, usize>>,
}

impl ConfusionMatrix {
    pub fn build(records: &[ValidationRecord]) -> Self {
        let labels: Vec<String> = records
            .iter()
            .map(|r| r.gold.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut counts: BTreeMap<String, BTreeMap<String, usize>> = labels
            .iter()
            .map(|gold| {
                let row = labels
                    .iter()
                    .cloned()
                    .chain(std::iter::once(OTHER_LABEL.to_string()))
                    .map(|column| (column, 0))
                    .collect();
                (gold.clone(), row)
            })
            .collect();

        for record in records {
            let column = if labels.contains(&record.predicted) {
                record.predicted.as_str()
            } else {
                OTHER_LABEL
            };
            if let Some(cell) = counts
                .get_mut(&record.gold)
                .and_then(|row| row.get_mut(column))
            {
                *cell += 1;
            }
        }

        Self { labels, counts }
    }

    /// Columns in display order
    pub fn columns(&self) -> Vec<&str> {
        self.labels
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(OTHER_LABEL))
            .collect()
    }

    pub fn get(&self, gold: &str, predicted: &str) -> usize {
        self.counts
            .get(gold)
            .and_then(|row| row.get(predicted))
            .copied()
            .unwrap_or(0)
    }

    pub fn row_total(&self, gold: &str) -> usize {
        self.counts.get(gold).map_or(0, |row| row.values().sum())
    }

    pub fn column_total(&self, predicted: &str) -> usize {
        self.counts.values().filter_map(|row| row.get(predicted)).sum()
    }

    pub fn total(&self) -> usize {
        self.counts.values().flat_map(|row| row.values()).sum()
    }

    fn diagonal(&self) -> usize {
        self.labels.iter().map(|l| self.get(l, l)).sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Gold occurrences
    pub support: usize,
}

/// Distribution of numeric predictions (metric targets)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContinuousSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Mean value per gold label
    pub mean_by_gold: BTreeMap<String, f64>,
}

impl ContinuousSummary {
    /// `None` when no record carries a numeric value
    pub fn from_records(records: &[ValidationRecord]) -> Option<Self> {
        let values: Vec<(&str, f64)> = records
            .iter()
            .filter_map(|r| r.value().map(|v| (r.gold.as_str(), v)))
            .filter(|(_, v)| v.is_finite())
            .collect();
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let mean = values.iter().map(|(_, v)| v).sum::<f64>() / count as f64;
        let min = values.iter().map(|(_, v)| *v).fold(f64::INFINITY, f64::min);
        let max = values.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max);

        let mut grouped: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for (gold, value) in &values {
            let entry = grouped.entry(gold.to_string()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
        let mean_by_gold = grouped
            .into_iter()
            .map(|(gold, (sum, n))| (gold, sum / n as f64))
            .collect();

        Some(Self {
            count,
            mean,
            min,
            max,
            mean_by_gold,
        })
    }
}

/// Metrics snapshot for one run
///
/// Metric targets (M1, M2, M3) predict a band or a value while their gold is
/// a strategy or reaction tag, so their records are never `correct`:
/// `accuracy`, `kappa` and the per-class scores stay at 0 and `continuous`
/// carries the meaningful summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub total: usize,
    pub correct: usize,
    /// Fraction in [0, 1]
    pub accuracy: f64,
    pub kappa: f64,
    pub macro_f1: f64,
    pub per_class: BTreeMap<String, ClassMetrics>,
    pub confusion: ConfusionMatrix,
    pub avg_confidence: f64,
    pub avg_processing_time_ms: f64,
    pub fallback_count: usize,
    pub continuous: Option<ContinuousSummary>,
}

impl ValidationMetrics {
    pub fn accuracy_percent(&self) -> f64 {
        self.accuracy * 100.0
    }

    pub fn f1_scores(&self) -> BTreeMap<String, f64> {
        self.per_class
            .iter()
            .map(|(label, m)| (label.clone(), m.f1))
            .collect()
    }
}

pub fn compute_metrics(records: &[ValidationRecord]) -> ValidationMetrics {
    let total = records.len();
    let correct = records.iter().filter(|r| r.correct).count();
    let confusion = ConfusionMatrix::build(records);

    let per_class: BTreeMap<String, ClassMetrics> = confusion
        .labels
        .iter()
        .map(|label| (label.clone(), class_metrics(&confusion, label)))
        .collect();

    let macro_f1 = if per_class.is_empty() {
        0.0
    } else {
        per_class.values().map(|m| m.f1).sum::<f64>() / per_class.len() as f64
    };

    let mean = |f: fn(&ValidationRecord) -> f64| {
        if total == 0 {
            0.0
        } else {
            records.iter().map(f).sum::<f64>() / total as f64
        }
    };

    ValidationMetrics {
        total,
        correct,
        accuracy: ratio(correct, total),
        kappa: cohen_kappa(&confusion),
        macro_f1,
        per_class,
        avg_confidence: mean(|r| r.confidence),
        avg_processing_time_ms: mean(|r| r.processing_time_ms),
        fallback_count: records.iter().filter(|r| r.is_fallback()).count(),
        continuous: ContinuousSummary::from_records(records),
        confusion,
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn class_metrics(confusion: &ConfusionMatrix, label: &str) -> ClassMetrics {
    let tp = confusion.get(label, label);
    let predicted = confusion.column_total(label);
    let support = confusion.row_total(label);

    let precision = ratio(tp, predicted);
    let recall = ratio(tp, support);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    ClassMetrics {
        precision,
        recall,
        f1,
        support,
    }
}

/// Cohen's kappa over the square matrix (gold labels + other)
///
/// Always in [-1, 1]. When expected agreement is total, kappa is 1 for
/// perfect observed agreement and 0 otherwise.
pub fn cohen_kappa(confusion: &ConfusionMatrix) -> f64 {
    let n = confusion.total();
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;

    let observed = confusion.diagonal() as f64 / n;
    let expected: f64 = confusion
        .columns()
        .iter()
        .map(|label| {
            let row = confusion.row_total(label) as f64 / n;
            let column = confusion.column_total(label) as f64 / n;
            row * column
        })
        .sum();

    if (1.0 - expected).abs() < 1e-12 {
        return if (observed - 1.0).abs() < 1e-12 { 1.0 } else { 0.0 };
    }

    ((observed - expected) / (1.0 - expected)).clamp(-1.0, 1.0)
}
