//! M2: weighted fusion of lexical and semantic alignment

use super::lexical_alignment::LexicalAlignment;
use super::semantic_alignment::SemanticAlignment;
use super::{alignment_projection, pair_turns, AlignmentBands};
use crate::types::{
    Algorithm, AlgorithmDescriptor, AlgorithmError, AlgorithmInput, AlgorithmKind,
    AlignmentDetails, ExecutionResult, ParameterSpec, ResultDetails, Target,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

pub const KEY: &str = "m2-composite";
const VERSION: &str = "1.0.0";

#[derive(Debug, Clone)]
pub struct CompositeConfig {
    pub lexical_weight: f64,
    pub semantic_weight: f64,
    pub bands: AlignmentBands,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            lexical_weight: 0.4,
            semantic_weight: 0.6,
            bands: AlignmentBands::new(0.5, 0.3),
        }
    }
}

pub struct CompositeAlignment {
    config: CompositeConfig,
    lexical: LexicalAlignment,
    semantic: SemanticAlignment,
}

impl CompositeAlignment {
    pub fn new() -> Self {
        Self::with_config(CompositeConfig::default())
    }

    pub fn with_config(config: CompositeConfig) -> Self {
        Self {
            config,
            lexical: LexicalAlignment::new(),
            semantic: SemanticAlignment::new(),
        }
    }

    pub fn fuse(&self, lexical: f64, semantic: f64) -> f64 {
        lexical * self.config.lexical_weight + semantic * self.config.semantic_weight
    }
}

impl Default for CompositeAlignment {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Algorithm for CompositeAlignment {
    fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError> {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "lexical_weight".to_string(),
            ParameterSpec::number(self.config.lexical_weight, 0.0, 1.0, "Weight of the Jaccard score"),
        );
        parameters.insert(
            "semantic_weight".to_string(),
            ParameterSpec::number(self.config.semantic_weight, 0.0, 1.0, "Weight of the pattern score"),
        );
        parameters.insert(
            "threshold".to_string(),
            ParameterSpec::number(self.config.bands.strong, 0.0, 1.0, "Lower bound of ALIGNEMENT_FORT"),
        );

        Ok(AlgorithmDescriptor {
            key: KEY.to_string(),
            display_name: "M2 - Composite alignment".to_string(),
            version: VERSION.to_string(),
            kind: AlgorithmKind::Metric,
            target: Target::M2,
            batch_supported: true,
            requires_context: true,
            description: "0.4 lexical + 0.6 semantic alignment".to_string(),
            parameters,
        })
    }

    fn validate_config(&self) -> bool {
        let CompositeConfig {
            lexical_weight,
            semantic_weight,
            bands,
        } = &self.config;
        *lexical_weight >= 0.0
            && *semantic_weight >= 0.0
            && (lexical_weight + semantic_weight - 1.0).abs() < 1e-6
            && bands.is_valid()
    }

    async fn run(&self, input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError> {
        let start = Instant::now();
        let (t0, t1) = pair_turns(input)?;
        let lexical = self.lexical.score(t0, t1);
        let semantic = self.semantic.score(t0, t1);
        let value = self.fuse(lexical.score, semantic.score);
        let band = self.config.bands.classify(value);

        if (lexical.score - semantic.score).abs() > 0.5 {
            debug!(
                lexical = lexical.score,
                semantic = semantic.score,
                "Lexical and semantic alignment diverge"
            );
        }

        let mut dimensions = BTreeMap::new();
        dimensions.insert("lexical".to_string(), lexical.score);
        dimensions.insert("semantic".to_string(), semantic.score);

        let details = AlignmentDetails {
            value,
            band: band.to_string(),
            lexical: Some(lexical.score),
            semantic: Some(semantic.score),
            dimensions,
            shared_terms: lexical.shared_terms,
            patterns: semantic.hits,
        };

        Ok(ExecutionResult::new(band, value, ResultDetails::Alignment(details))
            .with_version(VERSION)
            .with_projection(alignment_projection(
                value,
                Some(lexical.score),
                Some(semantic.score),
            ))
            .with_processing_time(start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ALIGNMENT_WEAK;

    #[test]
    fn test_fuse_weights() {
        let composite = CompositeAlignment::new();
        assert!((composite.fuse(0.5, 0.8) - 0.68).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_run_combines_both_scores() {
        let result = CompositeAlignment::new()
            .run(&AlgorithmInput::pair(
                "je vais vérifier votre dossier",
                "vérifier le dossier oui merci",
            ))
            .await
            .unwrap();
        // lexical 2/5, semantic 2/5 (acquiescement, action_response)
        assert!((result.confidence - 0.4).abs() < 1e-9);
        assert_eq!(result.prediction, ALIGNMENT_WEAK);
        assert_eq!(
            result.projection.get("m2_lexical_alignment"),
            Some(&serde_json::json!(0.4))
        );
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let config = CompositeConfig {
            lexical_weight: 0.5,
            ..Default::default()
        };
        assert!(!CompositeAlignment::with_config(config).validate_config());
        assert!(CompositeAlignment::new().validate_config());
    }
}
