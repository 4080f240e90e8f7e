//! Categorical classifiers (advisor X, client Y)
//!
//! Rule-based classifiers are pure functions over sanitized text. The
//! language-model classifiers live in [`llm`] and share the projection
//! helpers defined here.

pub mod advisor_rules;
pub mod client_charter;
pub mod client_dictionary;
pub mod llm;

pub use advisor_rules::{AdvisorRulesConfig, RegexAdvisorClassifier};
pub use client_charter::CharterClientClassifier;
pub use client_dictionary::{DictionaryClientClassifier, DictionaryConfig};
pub use llm::{LlmClassifier, LlmProfile};

use crate::types::{ComputationStatus, Projection, Target};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static ANNOTATION_MARKERS: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\[(?:TC|AP)\]|\(\.\.\.\)").ok());
static WHITESPACE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\s+").ok());

/// Strip transcription markers, normalize apostrophes, collapse whitespace
pub fn sanitize(verbatim: &str) -> String {
    let mut text = verbatim.replace(['\u{2019}', '\u{2018}', '\u{02BC}'], "'");
    if let Some(re) = ANNOTATION_MARKERS.as_ref() {
        text = re.replace_all(&text, " ").into_owned();
    }
    match WHITESPACE.as_ref() {
        Some(re) => re.replace_all(&text, " ").trim().to_string(),
        None => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

/// [`sanitize`] then lower-case
pub fn sanitize_lower(verbatim: &str) -> String {
    sanitize(verbatim).to_lowercase()
}

/// Compile a static pattern table, skipping (and logging) broken entries
pub(crate) fn compile_patterns(table: &str, sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .filter_map(|source| match Regex::new(source) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(table, pattern = source, error = %e, "Skipping invalid pattern");
                None
            }
        })
        .collect()
}

/// Corpus columns written for a categorical prediction
pub fn label_projection(
    target: Target,
    algorithm_key: &str,
    version: &str,
    label: &str,
    confidence: f64,
    status: ComputationStatus,
) -> Projection {
    let prefix = target.column_prefix();
    Projection::new()
        .with(&format!("{}_predicted_tag", prefix), label)
        .with(&format!("{}_confidence", prefix), confidence)
        .with(&format!("{}_algorithm_key", prefix), algorithm_key)
        .with(&format!("{}_algorithm_version", prefix), version)
        .with(
            &format!("{}_computed_at", prefix),
            algolab_common::time::to_db(&algolab_common::time::now()),
        )
        .with("computation_status", status.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_markers_and_apostrophes() {
        assert_eq!(
            sanitize("  [TC] d\u{2019}accord  (...)   je  vais [ap] voir "),
            "d'accord je vais voir"
        );
        assert_eq!(sanitize_lower("Très BIEN"), "très bien");
        assert_eq!(sanitize("   "), "");
    }

    #[test]
    fn test_label_projection_columns() {
        let projection = label_projection(
            Target::Y,
            "charter-y",
            "1.0.0",
            "CLIENT_POSITIF",
            1.0,
            ComputationStatus::Complete,
        );
        assert_eq!(
            projection.get("y_predicted_tag"),
            Some(&serde_json::json!("CLIENT_POSITIF"))
        );
        assert_eq!(
            projection.get("computation_status"),
            Some(&serde_json::json!("complete"))
        );
        assert!(projection.get("y_computed_at").is_some());
        assert_eq!(projection.len(), 6);
    }
}
