//! M2: semantic alignment from a bank of French response patterns
//!
//! Each configured pattern family is tested on the normalized client
//! turn, except `action_response`, which looks at the advisor → client
//! chain. The score is the fraction of families that fired.

use super::text::normalize;
use super::{alignment_projection, pair_turns, AlignmentBands};
use crate::classifiers::compile_patterns;
use crate::types::{
    Algorithm, AlgorithmDescriptor, AlgorithmError, AlgorithmInput, AlgorithmKind,
    AlignmentDetails, ExecutionResult, ParameterSpec, ResultDetails, Target,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::time::Instant;

pub const KEY: &str = "m2-semantic";
const VERSION: &str = "1.0.0";

pub const ACTION_RESPONSE: &str = "action_response";

const FAMILIES: &[&str] = &[
    "acquiescement",
    "clarification",
    "objection",
    "reformulation",
    ACTION_RESPONSE,
];

static BANK: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_patterns(
        "m2-semantic",
        &[
            r"\b(daccord|oui|parfait|tres bien|super|merci)\b",
            r"\b(combien|quand|comment|pourquoi|preciser|clarifier)\b",
            r"\b(mais|cependant|je ne suis pas daccord|pas possible|impossible)\b",
            r"\b(vous dites|si je comprends|donc vous|autrement dit)\b",
            r"\b(je vais|nous allons|on va)\b.*\b(daccord|merci|tres bien|ok)\b",
        ],
    )
});

fn pattern(family: &str) -> Option<&'static Regex> {
    let idx = FAMILIES.iter().position(|f| *f == family)?;
    BANK.get(idx)
}

#[derive(Debug, Clone)]
pub struct SemanticConfig {
    /// Families in evaluation order
    pub patterns: Vec<String>,
    pub bands: AlignmentBands,
    pub confidence_threshold: f64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            patterns: [
                "acquiescement",
                "reformulation",
                "clarification",
                ACTION_RESPONSE,
                "objection",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            bands: AlignmentBands::new(0.5, 0.25),
            confidence_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticScore {
    pub score: f64,
    pub hits: Vec<String>,
}

impl SemanticScore {
    pub fn confidence(&self) -> f64 {
        (self.score + 0.1 * self.hits.len() as f64).clamp(0.0, 1.0)
    }
}

pub struct SemanticAlignment {
    config: SemanticConfig,
}

impl SemanticAlignment {
    pub fn new() -> Self {
        Self::with_config(SemanticConfig::default())
    }

    pub fn with_config(config: SemanticConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, t0: &str, t1: &str) -> SemanticScore {
        let t0 = normalize(t0);
        let t1 = normalize(t1);
        let chain = format!("{} >>> {}", t0, t1);

        let hits: Vec<String> = self
            .config
            .patterns
            .iter()
            .filter(|family| {
                let haystack = if family.as_str() == ACTION_RESPONSE {
                    chain.as_str()
                } else {
                    t1.as_str()
                };
                pattern(family).is_some_and(|re| re.is_match(haystack))
            })
            .cloned()
            .collect();

        SemanticScore {
            score: hits.len() as f64 / self.config.patterns.len().max(1) as f64,
            hits,
        }
    }
}

impl Default for SemanticAlignment {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Algorithm for SemanticAlignment {
    fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError> {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "patterns".to_string(),
            ParameterSpec::text(&self.config.patterns.join(","), "Pattern families evaluated"),
        );
        parameters.insert(
            "confidence_threshold".to_string(),
            ParameterSpec::number(self.config.confidence_threshold, 0.0, 1.0, "Reporting threshold"),
        );

        Ok(AlgorithmDescriptor {
            key: KEY.to_string(),
            display_name: "M2 - Semantic alignment (patterns)".to_string(),
            version: VERSION.to_string(),
            kind: AlgorithmKind::Metric,
            target: Target::M2,
            batch_supported: true,
            requires_context: true,
            description: "Acquiescence, reformulation, clarification and objection cues in the client reply"
                .to_string(),
            parameters,
        })
    }

    fn validate_config(&self) -> bool {
        (0.0..=1.0).contains(&self.config.confidence_threshold)
            && !self.config.patterns.is_empty()
            && self.config.patterns.iter().all(|p| pattern(p).is_some())
    }

    async fn run(&self, input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError> {
        let start = Instant::now();
        let (t0, t1) = pair_turns(input)?;
        let scored = self.score(t0, t1);
        let band = self.config.bands.classify(scored.score);
        let confidence = scored.confidence();

        let details = AlignmentDetails {
            value: scored.score,
            band: band.to_string(),
            lexical: None,
            semantic: Some(scored.score),
            dimensions: BTreeMap::new(),
            shared_terms: Vec::new(),
            patterns: scored.hits,
        };

        Ok(ExecutionResult::new(band, confidence, ResultDetails::Alignment(details))
            .with_version(VERSION)
            .with_projection(alignment_projection(scored.score, None, Some(scored.score)))
            .with_processing_time(start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ALIGNMENT_WEAK, MISALIGNMENT};

    #[test]
    fn test_bank_compiles() {
        assert_eq!(BANK.len(), FAMILIES.len());
    }

    #[test]
    fn test_acquiescence_after_announced_action() {
        let scored = SemanticAlignment::new().score("je vais traiter votre demande", "d'accord merci beaucoup");
        assert_eq!(scored.hits, vec!["acquiescement", ACTION_RESPONSE]);
        assert!((scored.score - 0.4).abs() < 1e-9);
        assert!((scored.confidence() - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_run_bands() {
        let algo = SemanticAlignment::new();
        let result = algo
            .run(&AlgorithmInput::pair("je vais traiter votre demande", "d'accord merci beaucoup"))
            .await
            .unwrap();
        assert_eq!(result.prediction, ALIGNMENT_WEAK);

        let result = algo
            .run(&AlgorithmInput::pair("bonjour", "il pleut"))
            .await
            .unwrap();
        assert_eq!(result.prediction, MISALIGNMENT);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_unknown_family_invalidates_config() {
        let config = SemanticConfig {
            patterns: vec!["telepathy".to_string()],
            ..Default::default()
        };
        assert!(!SemanticAlignment::with_config(config).validate_config());
        assert!(SemanticAlignment::new().validate_config());
    }
}
