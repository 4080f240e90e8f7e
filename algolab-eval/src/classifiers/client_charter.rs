//! Charter rules for client reactions (Y)
//!
//! Explicit agreement anywhere in the turn is positive; a turn that is
//! nothing but a backchannel is neutral; disagreement markers are
//! negative. Checked in that order.

use super::{label_projection, sanitize_lower};
use crate::labels::ClientTag;
use crate::types::{
    Algorithm, AlgorithmDescriptor, AlgorithmError, AlgorithmInput, AlgorithmKind, ClientDetails,
    ComputationStatus, ExecutionResult, ParameterSpec, ResultDetails, Target,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Instant;

pub const KEY: &str = "charter-y";
const VERSION: &str = "1.0.0";

const POSITIVE: &[&str] = &[
    "d'accord",
    "ok",
    "parfait",
    "très bien",
    "super",
    "excellent",
    "ça marche",
    "entendu",
    "bien sûr",
    "tout à fait",
    "avec plaisir",
    "absolument",
    "certainement",
    "volontiers",
    "c'est bon",
    "c'est parfait",
    "pas de problème",
    "formidable",
    "génial",
];

const BACKCHANNEL: &[&str] = &[
    "oui", "ouais", "voilà", "merci", "bon", "hm", "mh", "mmh", "hm hm", "mh mh",
];

const NEGATIVE: &[&str] = &[
    "mais",
    "non",
    "pas d'accord",
    "impossible",
    "pas normal",
    "inadmissible",
    "scandaleux",
    "j'hallucine",
    "vous rigolez",
    "c'est une blague",
    "n'importe quoi",
    "c'est inacceptable",
    "je refuse",
    "hors de question",
    "c'est pas possible",
];

#[derive(Debug, Clone)]
pub struct CharterConfig {
    pub charter_name: String,
    pub match_confidence: f64,
    pub default_confidence: f64,
}

impl Default for CharterConfig {
    fn default() -> Self {
        Self {
            charter_name: "Charter B - broad client agreement".to_string(),
            match_confidence: 1.0,
            default_confidence: 0.5,
        }
    }
}

pub struct CharterClientClassifier {
    config: CharterConfig,
}

impl CharterClientClassifier {
    pub fn new() -> Self {
        Self {
            config: CharterConfig::default(),
        }
    }

    /// `(tag, confidence, matched pattern)`
    pub fn classify(&self, verbatim: &str) -> (ClientTag, f64, Option<&'static str>) {
        let text = sanitize_lower(verbatim);
        let hit = self.config.match_confidence;

        if text.is_empty() {
            return (ClientTag::Neutre, self.config.default_confidence, None);
        }
        if let Some(p) = POSITIVE.iter().find(|p| text.contains(*p)) {
            return (ClientTag::Positif, hit, Some(*p));
        }
        if let Some(p) = BACKCHANNEL.iter().find(|p| text == **p) {
            return (ClientTag::Neutre, hit, Some(*p));
        }
        if let Some(p) = NEGATIVE.iter().find(|p| text.contains(*p)) {
            return (ClientTag::Negatif, hit, Some(*p));
        }

        (ClientTag::Neutre, self.config.default_confidence, None)
    }
}

impl Default for CharterClientClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Algorithm for CharterClientClassifier {
    fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError> {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "charter_name".to_string(),
            ParameterSpec::text(&self.config.charter_name, "Annotation charter implemented"),
        );

        Ok(AlgorithmDescriptor {
            key: KEY.to_string(),
            display_name: "Charter Y-B (broad agreement)".to_string(),
            version: VERSION.to_string(),
            kind: AlgorithmKind::Classifier,
            target: Target::Y,
            batch_supported: true,
            requires_context: false,
            description: "Agreement markers are positive, lone backchannels neutral, disagreement negative"
                .to_string(),
            parameters,
        })
    }

    fn validate_config(&self) -> bool {
        !self.config.charter_name.trim().is_empty()
    }

    async fn run(&self, input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError> {
        let start = Instant::now();
        let (tag, confidence, matched) = self.classify(input.primary_text());
        let label = tag.as_str();

        let details = ClientDetails {
            family: "CLIENT".to_string(),
            cues: matched.map(|m| vec![m.to_string()]).unwrap_or_default(),
            scores: BTreeMap::new(),
        };

        Ok(ExecutionResult::new(label, confidence, ResultDetails::Client(details))
            .with_version(VERSION)
            .with_projection(label_projection(
                Target::Y,
                KEY,
                VERSION,
                label,
                confidence,
                ComputationStatus::Complete,
            ))
            .with_processing_time(start.elapsed()))
    }
}
