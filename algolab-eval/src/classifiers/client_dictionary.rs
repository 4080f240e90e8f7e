//! Dictionary-weighted client reaction classifier (Y)
//!
//! Every category has a list of multi-word expressions (substring match)
//! and single words (word-boundary match, every occurrence counts). The
//! category score is the weighted hit count divided by the weighted
//! dictionary size.

use super::{label_projection, sanitize_lower};
use crate::labels::ClientTag;
use crate::types::{
    Algorithm, AlgorithmDescriptor, AlgorithmError, AlgorithmInput, AlgorithmKind, ClientDetails,
    ComputationStatus, ExecutionResult, ParameterSpec, ResultDetails, Target,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

pub const KEY: &str = "dictionary-y";
const VERSION: &str = "1.0.0";

struct Dictionary {
    tag: ClientTag,
    expressions: &'static [&'static str],
    words: Vec<(&'static str, Regex)>,
}

fn dictionary(
    tag: ClientTag,
    expressions: &'static [&'static str],
    words: &'static [&'static str],
) -> Dictionary {
    let words = words
        .iter()
        .filter_map(|word| {
            Regex::new(&format!(r"\b{}\b", regex::escape(word)))
                .ok()
                .map(|re| (*word, re))
        })
        .collect();
    Dictionary {
        tag,
        expressions,
        words,
    }
}

static DICTIONARIES: Lazy<Vec<Dictionary>> = Lazy::new(|| {
    vec![
        dictionary(
            ClientTag::Positif,
            &[
                "d'accord",
                "parfait",
                "très bien",
                "merci beaucoup",
                "c'est parfait",
                "ça marche",
                "pas de problème",
                "ok",
                "super",
                "génial",
                "excellent",
                "formidable",
                "c'est bon",
            ],
            &[
                "oui",
                "bien",
                "parfait",
                "merci",
                "accord",
                "ok",
                "super",
                "génial",
                "excellent",
                "satisfait",
                "content",
                "parfaitement",
                "absolument",
                "certainement",
                "volontiers",
            ],
        ),
        dictionary(
            ClientTag::Negatif,
            &[
                "pas d'accord",
                "c'est pas possible",
                "n'importe quoi",
                "c'est inadmissible",
                "je refuse",
                "hors de question",
                "c'est inacceptable",
                "je ne peux pas",
                "impossible",
            ],
            &[
                "non",
                "pas",
                "jamais",
                "impossible",
                "refuse",
                "contre",
                "mal",
                "problème",
                "ennui",
                "difficile",
                "compliqué",
                "inacceptable",
                "inadmissible",
                "scandaleux",
                "énervé",
            ],
        ),
        dictionary(
            ClientTag::Neutre,
            &[
                "je ne sais pas",
                "peut-être",
                "on verra",
                "je vais réfléchir",
                "c'est possible",
                "pourquoi pas",
                "je vais voir",
                "à voir",
            ],
            &[
                "peut-être",
                "possible",
                "voir",
                "réfléchir",
                "penser",
                "sais",
                "comprendre",
                "expliquer",
                "détail",
                "information",
                "précision",
                "question",
                "demande",
                "besoin",
            ],
        ),
        dictionary(
            ClientTag::Question,
            &[
                "comment ça",
                "c'est quoi",
                "qu'est-ce que",
                "comment faire",
                "j'aimerais savoir",
                "pouvez-vous m'expliquer",
                "est-ce que",
                "comment ça marche",
            ],
            &[
                "comment",
                "pourquoi",
                "quoi",
                "qui",
                "quand",
                "où",
                "combien",
                "quel",
                "quelle",
                "question",
                "demande",
                "expliquer",
                "préciser",
                "savoir",
            ],
        ),
        dictionary(
            ClientTag::Silence,
            &["...", "(silence)", "[silence]", "euh...", "heu...", "ben..."],
            &["euh", "heu", "ben", "hmm", "ah", "oh", "silence", "pause"],
        ),
        dictionary(
            ClientTag::AutreY,
            &[
                "je dois raccrocher",
                "ce n'est pas le sujet",
                "autre chose",
                "pas de rapport",
            ],
            &[
                "autre",
                "différent",
                "ailleurs",
                "raccrocher",
                "partir",
                "finir",
                "terminer",
                "changer",
            ],
        ),
    ]
});

/// Tokens that, alone, are a pure backchannel
const BACKCHANNELS: &[&str] = &[
    "oui", "ouais", "hm", "hum", "mh", "mmh", "hmm", "hm hm", "mh mh", "voilà",
];

/// Thresholds and weights; defaults are the calibrated values
#[derive(Debug, Clone)]
pub struct DictionaryConfig {
    pub positive_threshold: f64,
    pub negative_threshold: f64,
    pub silence_threshold: f64,
    pub question_threshold: f64,
    pub other_threshold: f64,
    pub expression_weight: f64,
    pub word_weight: f64,
    /// Confidence of the backchannel override
    pub backchannel_confidence: f64,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            positive_threshold: 0.6,
            negative_threshold: 0.4,
            silence_threshold: 0.5,
            question_threshold: 0.4,
            other_threshold: 0.3,
            expression_weight: 2.0,
            word_weight: 1.0,
            backchannel_confidence: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientClassification {
    pub tag: ClientTag,
    pub confidence: f64,
    pub cues: Vec<String>,
    pub scores: BTreeMap<String, f64>,
}

pub struct DictionaryClientClassifier {
    config: DictionaryConfig,
}

impl DictionaryClientClassifier {
    pub fn new() -> Self {
        Self::with_config(DictionaryConfig::default())
    }

    pub fn with_config(config: DictionaryConfig) -> Self {
        Self { config }
    }

    fn score(&self, text: &str, dict: &Dictionary, cues: &mut Vec<String>) -> f64 {
        let c = &self.config;
        let mut score = 0.0;
        let mut total = 0.0;

        for expr in dict.expressions {
            if text.contains(expr) {
                score += c.expression_weight;
                cues.push((*expr).to_string());
            }
            total += c.expression_weight;
        }
        for (word, re) in &dict.words {
            let hits = re.find_iter(text).count();
            if hits > 0 {
                score += hits as f64 * c.word_weight;
                cues.push((*word).to_string());
            }
            total += c.word_weight;
        }

        if total > 0.0 {
            score / total
        } else {
            0.0
        }
    }

    pub fn classify(&self, verbatim: &str) -> ClientClassification {
        let text = sanitize_lower(verbatim);
        let mut scores: BTreeMap<String, f64> = ClientTag::ALL
            .iter()
            .map(|t| (t.as_str().to_string(), 0.0))
            .collect();

        if text.is_empty() {
            return ClientClassification {
                tag: ClientTag::Neutre,
                confidence: 0.5,
                cues: Vec::new(),
                scores,
            };
        }

        let mut cues = Vec::new();
        for dict in DICTIONARIES.iter() {
            let value = self.score(&text, dict, &mut cues);
            scores.insert(dict.tag.as_str().to_string(), value);
        }
        let mut seen = BTreeSet::new();
        cues.retain(|cue| seen.insert(cue.clone()));

        let bare = text.trim_end_matches(['.', '!', '?', '…', ' ']);
        if BACKCHANNELS.contains(&bare) {
            return ClientClassification {
                tag: ClientTag::Neutre,
                confidence: self.config.backchannel_confidence,
                cues: vec![bare.to_string()],
                scores,
            };
        }

        let get = |tag: ClientTag| scores.get(tag.as_str()).copied().unwrap_or(0.0);
        let c = &self.config;

        if get(ClientTag::Silence) > c.silence_threshold {
            let confidence = get(ClientTag::Silence);
            return ClientClassification {
                tag: ClientTag::Silence,
                confidence,
                cues,
                scores,
            };
        }
        if get(ClientTag::Question) > c.question_threshold {
            let confidence = get(ClientTag::Question);
            return ClientClassification {
                tag: ClientTag::Question,
                confidence,
                cues,
                scores,
            };
        }

        let tag = if get(ClientTag::Negatif) >= c.negative_threshold {
            ClientTag::Negatif
        } else if get(ClientTag::Positif) >= c.positive_threshold {
            ClientTag::Positif
        } else if get(ClientTag::AutreY) > c.other_threshold {
            ClientTag::AutreY
        } else {
            ClientTag::Neutre
        };
        let confidence = scores.values().copied().fold(0.0_f64, f64::max);

        ClientClassification {
            tag,
            confidence,
            cues,
            scores,
        }
    }
}

impl Default for DictionaryClientClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Algorithm for DictionaryClientClassifier {
    fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError> {
        let c = &self.config;
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "positive_threshold".to_string(),
            ParameterSpec::number(c.positive_threshold, 0.0, 1.0, "Minimum POSITIF score"),
        );
        parameters.insert(
            "negative_threshold".to_string(),
            ParameterSpec::number(c.negative_threshold, 0.0, 1.0, "Minimum NEGATIF score"),
        );
        parameters.insert(
            "expression_weight".to_string(),
            ParameterSpec::number(c.expression_weight, 0.0, 10.0, "Weight of an expression hit"),
        );
        parameters.insert(
            "word_weight".to_string(),
            ParameterSpec::number(c.word_weight, 0.0, 10.0, "Weight of a word hit"),
        );

        Ok(AlgorithmDescriptor {
            key: KEY.to_string(),
            display_name: "Rules – Y (client dictionaries)".to_string(),
            version: VERSION.to_string(),
            kind: AlgorithmKind::Classifier,
            target: Target::Y,
            batch_supported: true,
            requires_context: false,
            description: "Client reaction classification by weighted expression and word dictionaries"
                .to_string(),
            parameters,
        })
    }

    fn validate_config(&self) -> bool {
        let c = &self.config;
        [c.positive_threshold, c.negative_threshold]
            .iter()
            .all(|t| (0.0..=1.0).contains(t))
            && c.expression_weight > 0.0
            && c.word_weight > 0.0
    }

    async fn run(&self, input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError> {
        let start = Instant::now();
        let outcome = self.classify(input.primary_text());
        let label = outcome.tag.as_str();

        let details = ClientDetails {
            family: "CLIENT".to_string(),
            cues: outcome.cues,
            scores: outcome.scores,
        };

        Ok(ExecutionResult::new(label, outcome.confidence, ResultDetails::Client(details))
            .with_version(VERSION)
            .with_projection(label_projection(
                Target::Y,
                KEY,
                VERSION,
                label,
                outcome.confidence,
                ComputationStatus::Complete,
            ))
            .with_processing_time(start.elapsed()))
    }
}
