//! Error clustering over incorrect records

use crate::normalizer::ValidationRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const MAX_EXAMPLES: usize = 3;
const EXAMPLE_CHARS: usize = 80;
const MAX_CLUSTERS: usize = 10;
const ERROR_RATE_ALERT: f64 = 0.3;
const CONFIDENCE_ALERT: f64 = 0.7;
const FREQUENT_CONFUSION: usize = 3;

/// Incorrect records sharing one `gold → predicted` confusion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCluster {
    pub expected: String,
    pub predicted: String,
    pub frequency: usize,
    pub examples: Vec<String>,
    pub pair_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    pub total_errors: usize,
    pub error_rate: f64,
    /// Most frequent first
    pub clusters: Vec<ErrorCluster>,
    pub suggestions: Vec<String>,
}

fn excerpt(verbatim: &str) -> String {
    let mut chars = verbatim.chars();
    let head: String = chars.by_ref().take(EXAMPLE_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

pub fn analyze_errors(records: &[ValidationRecord]) -> ErrorAnalysis {
    let errors: Vec<&ValidationRecord> = records.iter().filter(|r| !r.correct).collect();

    // First-seen order breaks frequency ties
    let mut order: Vec<(String, String)> = Vec::new();
    let mut clusters: HashMap<(String, String), ErrorCluster> = HashMap::new();
    for record in &errors {
        let key = (record.gold.clone(), record.predicted.clone());
        let cluster = clusters.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            ErrorCluster {
                expected: record.gold.clone(),
                predicted: record.predicted.clone(),
                frequency: 0,
                examples: Vec::new(),
                pair_ids: Vec::new(),
            }
        });
        cluster.frequency += 1;
        if cluster.examples.len() < MAX_EXAMPLES {
            cluster.examples.push(excerpt(&record.verbatim));
        }
        if let Some(pair_id) = record.pair_id {
            cluster.pair_ids.push(pair_id);
        }
    }

    let mut ranked: Vec<ErrorCluster> = order
        .iter()
        .filter_map(|key| clusters.remove(key))
        .collect();
    // Stable sort keeps first-seen order among equals
    ranked.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    ranked.truncate(MAX_CLUSTERS);

    let error_rate = if records.is_empty() {
        0.0
    } else {
        errors.len() as f64 / records.len() as f64
    };
    let avg_confidence = if records.is_empty() {
        0.0
    } else {
        records.iter().map(|r| r.confidence).sum::<f64>() / records.len() as f64
    };

    let mut suggestions = Vec::new();
    if !records.is_empty() && error_rate > ERROR_RATE_ALERT {
        suggestions.push("Accuracy below 70%: review the rules or refine the model".to_string());
    }
    if avg_confidence < CONFIDENCE_ALERT {
        suggestions.push("Low average confidence: adjust the classification thresholds".to_string());
    }
    for cluster in ranked.iter().filter(|c| c.frequency >= FREQUENT_CONFUSION) {
        suggestions.push(format!(
            "Frequent confusion {}/{}: inspect the linguistic patterns ({} cases)",
            cluster.expected, cluster.predicted, cluster.frequency
        ));
    }

    ErrorAnalysis {
        total_errors: errors.len(),
        error_rate,
        clusters: ranked,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::RecordMetadata;
    use crate::types::Target;

    fn record(gold: &str, predicted: &str, verbatim: &str, confidence: f64) -> ValidationRecord {
        ValidationRecord {
            pair_id: Some(1),
            target: Target::X,
            verbatim: verbatim.to_string(),
            gold: gold.to_string(),
            predicted: predicted.to_string(),
            correct: gold == predicted,
            confidence,
            processing_time_ms: 0.0,
            algorithm_version: "1.0.0".to_string(),
            metadata: RecordMetadata::default(),
        }
    }

    #[test]
    fn test_clusters_ranked_by_frequency() {
        let mut records = vec![record("OUVERTURE", "EXPLICATION", "vous allez", 0.9)];
        for i in 0..4 {
            records.push(record("ENGAGEMENT", "OUVERTURE", &format!("je vais {}", i), 0.9));
        }
        records.push(record("ENGAGEMENT", "ENGAGEMENT", "je fais", 0.9));

        let analysis = analyze_errors(&records);
        assert_eq!(analysis.total_errors, 5);
        assert_eq!(analysis.clusters[0].expected, "ENGAGEMENT");
        assert_eq!(analysis.clusters[0].frequency, 4);
        assert_eq!(analysis.clusters[0].examples.len(), 3);
        assert_eq!(analysis.clusters[1].predicted, "EXPLICATION");
    }

    #[test]
    fn test_suggestions() {
        let records = vec![
            record("A", "B", "x", 0.5),
            record("A", "B", "y", 0.5),
            record("A", "B", "z", 0.5),
            record("A", "A", "w", 0.5),
        ];
        let analysis = analyze_errors(&records);
        assert_eq!(analysis.suggestions.len(), 3);
        assert!(analysis.suggestions[2].contains("A/B"));
        assert!(analysis.suggestions[2].contains("3 cases"));
    }

    #[test]
    fn test_examples_truncated_on_char_boundary() {
        let long = "é".repeat(100);
        let analysis = analyze_errors(&[record("A", "B", &long, 0.9)]);
        let example = &analysis.clusters[0].examples[0];
        assert!(example.ends_with("..."));
        assert_eq!(example.chars().count(), 83);

        let short = analyze_errors(&[record("A", "B", "court", 0.9)]);
        assert_eq!(short.clusters[0].examples[0], "court");
    }

    #[test]
    fn test_no_errors() {
        let analysis = analyze_errors(&[record("A", "A", "ok", 0.95)]);
        assert!(analysis.clusters.is_empty());
        assert!(analysis.suggestions.is_empty());
        assert_eq!(analysis.error_rate, 0.0);
    }
}
