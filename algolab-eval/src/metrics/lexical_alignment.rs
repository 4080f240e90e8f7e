//! M2: lexical alignment (Jaccard overlap of content tokens)

use super::text::{jaccard, shared, token_set};
use super::{alignment_projection, pair_turns, AlignmentBands};
use crate::types::{
    Algorithm, AlgorithmDescriptor, AlgorithmError, AlgorithmInput, AlgorithmKind,
    AlignmentDetails, ExecutionResult, ParameterSpec, ResultDetails, Target,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Instant;

pub const KEY: &str = "m2-lexical";
const VERSION: &str = "1.0.0";

pub const DEFAULT_BANDS: AlignmentBands = AlignmentBands::new(0.5, 0.3);

/// Overlap score and the terms behind it
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalScore {
    pub score: f64,
    pub shared_terms: Vec<String>,
}

pub struct LexicalAlignment {
    bands: AlignmentBands,
}

impl LexicalAlignment {
    pub fn new() -> Self {
        Self::with_bands(DEFAULT_BANDS)
    }

    pub fn with_bands(bands: AlignmentBands) -> Self {
        Self { bands }
    }

    pub fn score(&self, t0: &str, t1: &str) -> LexicalScore {
        let a = token_set(t0);
        let b = token_set(t1);
        LexicalScore {
            score: jaccard(&a, &b),
            shared_terms: shared(&a, &b),
        }
    }
}

impl Default for LexicalAlignment {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Algorithm for LexicalAlignment {
    fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError> {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "threshold_aligned".to_string(),
            ParameterSpec::number(self.bands.strong, 0.0, 1.0, "Lower bound of ALIGNEMENT_FORT"),
        );
        parameters.insert(
            "threshold_partial".to_string(),
            ParameterSpec::number(self.bands.partial, 0.0, 1.0, "Lower bound of ALIGNEMENT_FAIBLE"),
        );

        Ok(AlgorithmDescriptor {
            key: KEY.to_string(),
            display_name: "M2 - Lexical alignment (Jaccard)".to_string(),
            version: VERSION.to_string(),
            kind: AlgorithmKind::Metric,
            target: Target::M2,
            batch_supported: true,
            requires_context: true,
            description: "Jaccard overlap between advisor and client content tokens".to_string(),
            parameters,
        })
    }

    fn validate_config(&self) -> bool {
        self.bands.strong > 0.0 && self.bands.is_valid()
    }

    async fn run(&self, input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError> {
        let start = Instant::now();
        let (t0, t1) = pair_turns(input)?;
        let LexicalScore {
            score,
            shared_terms,
        } = self.score(t0, t1);
        let band = self.bands.classify(score);

        let details = AlignmentDetails {
            value: score,
            band: band.to_string(),
            lexical: Some(score),
            semantic: None,
            dimensions: BTreeMap::new(),
            shared_terms,
            patterns: Vec::new(),
        };

        Ok(ExecutionResult::new(band, score, ResultDetails::Alignment(details))
            .with_version(VERSION)
            .with_projection(alignment_projection(score, Some(score), None))
            .with_processing_time(start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ALIGNMENT_STRONG, MISALIGNMENT};

    #[tokio::test]
    async fn test_shared_vocabulary_is_strong() {
        let result = LexicalAlignment::new()
            .run(&AlgorithmInput::pair(
                "je vais vérifier votre dossier",
                "vérifier le dossier oui",
            ))
            .await
            .unwrap();
        assert_eq!(result.prediction, ALIGNMENT_STRONG);
        assert!((result.confidence - 0.5).abs() < 1e-9);
        match result.details {
            ResultDetails::Alignment(d) => assert_eq!(d.shared_terms, vec!["dossier", "verifier"]),
            other => panic!("unexpected details {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_turns_are_misaligned() {
        let result = LexicalAlignment::new()
            .run(&AlgorithmInput::pair("", ""))
            .await
            .unwrap();
        assert_eq!(result.prediction, MISALIGNMENT);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_validate_requires_ordered_thresholds() {
        assert!(LexicalAlignment::new().validate_config());
        assert!(!LexicalAlignment::with_bands(AlignmentBands::new(0.3, 0.3)).validate_config());
    }
}
