//! M2: six-dimension alignment
//!
//! Continuous dimensions: lexical overlap, a root-overlap semantic proxy
//! and repetition of the advisor's action verbs. Binary pragmatic
//! dimensions: client acceptance, comprehension, and cooperation
//! (an informative answer to an advisor question).

use super::text::{jaccard, normalize, prefix, shared, token_set};
use super::{pair_turns, AlignmentBands};
use crate::classifiers::compile_patterns;
use crate::types::{
    Algorithm, AlgorithmDescriptor, AlgorithmError, AlgorithmInput, AlgorithmKind,
    AlignmentDetails, ComputationStatus, ExecutionResult, ParameterSpec, Projection,
    ResultDetails, Target,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

pub const KEY: &str = "m2-multi-dimension";
const VERSION: &str = "1.0.0";

/// Infinitives, diacritics folded
const ACTION_VERBS: &[&str] = &[
    "verifier", "envoyer", "faire", "appeler", "contacter", "transmettre", "traiter", "resoudre",
    "corriger", "modifier", "changer", "mettre", "prendre", "donner", "recevoir", "confirmer",
    "valider", "annuler", "creer", "supprimer", "ajouter", "retirer", "enregistrer",
    "sauvegarder", "telecharger", "imprimer", "scanner", "signer", "remplir", "completer",
    "finaliser", "terminer", "commencer", "lancer", "arreter", "reprendre", "continuer",
    "attendre", "patienter", "rappeler", "recontacter", "noter", "regarder", "consulter",
    "acceder", "ouvrir", "fermer", "cliquer", "selectionner", "choisir", "trouver",
];

static ACCEPTANCE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_patterns(
        "m2-acceptance",
        &[
            r"\b(daccord|d accord)\b",
            r"\b(ok|okay|oui)\b",
            r"\b(merci|merci beaucoup)\b",
            r"\b(parfait|super|tres bien)\b",
            r"\b(entendu|compris|note)\b",
            r"\bca marche\b",
            r"\b(je veux bien|volontiers)\b",
            r"\b(cest bon|c est bon)\b",
        ],
    )
});

static COMPREHENSION: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_patterns(
        "m2-comprehension",
        &[
            r"\b(je vois|je comprends|ah ok|ah daccord)\b",
            r"\b(je saisis|je percois)\b",
            r"\b(effectivement|en effet)\b",
            r"\b(ah oui|ah bon)\b",
            r"\bdaccord je comprends\b",
            r"\bok je vois\b",
        ],
    )
});

static COOPERATION: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_patterns(
        "m2-cooperation",
        &[
            r"\b(cest|c est)\s+.{2,}",
            r"\b(jai|j ai)\s+.{2,}",
            r"\bje suis\s+.{2,}",
            r"\b(mon|ma|mes)\s+\w+",
            r"\b(le|la)\s+\w+\s+(est|cest)\b",
            r"\b\d{2,}",
            r"\b(voila|voici)\b",
        ],
    )
});

static ADVISOR_QUESTION: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_patterns(
        "m2-advisor-question",
        &[r"(?i)\?|avez.vous|pouvez.vous|quel|quelle|combien"],
    )
});

/// Dimension weights of the global score
#[derive(Debug, Clone, Serialize)]
pub struct DimensionWeights {
    pub lexical: f64,
    pub semantic: f64,
    pub verb_repetition: f64,
    pub acceptance: f64,
    pub comprehension: f64,
    pub cooperation: f64,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            lexical: 0.15,
            semantic: 0.15,
            verb_repetition: 0.20,
            acceptance: 0.20,
            comprehension: 0.15,
            cooperation: 0.15,
        }
    }
}

impl DimensionWeights {
    pub fn sum(&self) -> f64 {
        self.lexical
            + self.semantic
            + self.verb_repetition
            + self.acceptance
            + self.comprehension
            + self.cooperation
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PragmaticScores {
    pub acceptance: u8,
    pub comprehension: u8,
    pub cooperation: u8,
}

/// Stored verbatim in `m2_scores`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DimensionScores {
    pub lexical: f64,
    pub semantic: f64,
    pub verb_repetition: f64,
    pub pragmatic: PragmaticScores,
    pub global: f64,
}

/// Stored verbatim in `m2_details`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DimensionEvidence {
    pub shared_lemmas: Vec<String>,
    pub pragmatic_patterns: Vec<String>,
    pub advisor_verbs: Vec<String>,
    pub client_markers: Vec<String>,
}

fn any_match(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|re| re.is_match(text))
}

/// Prefixes of the longer words (a crude stem)
fn roots(normalized: &str) -> BTreeSet<String> {
    normalized
        .split(' ')
        .filter(|w| w.chars().count() > 4)
        .map(|w| prefix(w, 5.min(w.chars().count() - 1)).to_string())
        .collect()
}

fn advisor_verbs(normalized_t0: &str) -> Vec<String> {
    ACTION_VERBS
        .iter()
        .filter(|v| normalized_t0.contains(*v))
        .map(|v| v.to_string())
        .collect()
}

pub struct MultiDimensionAlignment {
    weights: DimensionWeights,
    bands: AlignmentBands,
}

impl MultiDimensionAlignment {
    pub fn new() -> Self {
        Self::with_weights(DimensionWeights::default())
    }

    pub fn with_weights(weights: DimensionWeights) -> Self {
        Self {
            weights,
            bands: AlignmentBands::new(0.6, 0.3),
        }
    }

    pub fn score(&self, t0: &str, t1: &str) -> (DimensionScores, DimensionEvidence) {
        let n0 = normalize(t0);
        let n1 = normalize(t1);
        let tokens0 = token_set(t0);
        let tokens1 = token_set(t1);

        let lexical = jaccard(&tokens0, &tokens1);

        let roots0 = roots(&n0);
        let roots1 = roots(&n1);
        let root_score = if roots0.is_empty() {
            0.0
        } else {
            roots0.intersection(&roots1).count() as f64 / roots0.len() as f64
        };
        let semantic = (0.5 * lexical + 0.5 * root_score).min(1.0);

        let verbs = advisor_verbs(&n0);
        let verb_repetition = if verbs.is_empty() {
            0.0
        } else {
            let repeated = verbs
                .iter()
                .filter(|v| {
                    let len = v.chars().count();
                    n1.contains(prefix(v, 5.min(len.saturating_sub(2))))
                })
                .count();
            repeated as f64 / verbs.len() as f64
        };

        let asks = any_match(&ADVISOR_QUESTION, t0);
        let pragmatic = PragmaticScores {
            acceptance: any_match(&ACCEPTANCE, &n1) as u8,
            comprehension: any_match(&COMPREHENSION, &n1) as u8,
            cooperation: (asks && any_match(&COOPERATION, &n1)) as u8,
        };

        let w = &self.weights;
        let global = (lexical * w.lexical
            + semantic * w.semantic
            + verb_repetition * w.verb_repetition
            + f64::from(pragmatic.acceptance) * w.acceptance
            + f64::from(pragmatic.comprehension) * w.comprehension
            + f64::from(pragmatic.cooperation) * w.cooperation)
            .min(1.0);

        let mut client_markers = Vec::new();
        if pragmatic.acceptance == 1 {
            client_markers.push("ACCEPTANCE".to_string());
        }
        if pragmatic.comprehension == 1 {
            client_markers.push("COMPREHENSION".to_string());
        }
        if pragmatic.cooperation == 1 {
            client_markers.push("COOPERATION".to_string());
        }

        let mut pragmatic_patterns = Vec::new();
        if !verbs.is_empty() && pragmatic.acceptance == 1 {
            pragmatic_patterns.push("ACTION_ANNOUNCED->ACCEPTANCE".to_string());
        }
        if t0.contains('?') && pragmatic.cooperation == 1 {
            pragmatic_patterns.push("QUESTION->COOPERATION".to_string());
        }

        let scores = DimensionScores {
            lexical,
            semantic,
            verb_repetition,
            pragmatic,
            global,
        };
        let evidence = DimensionEvidence {
            shared_lemmas: shared(&tokens0, &tokens1),
            pragmatic_patterns,
            advisor_verbs: verbs,
            client_markers,
        };
        (scores, evidence)
    }
}

impl Default for MultiDimensionAlignment {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Algorithm for MultiDimensionAlignment {
    fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError> {
        let w = &self.weights;
        let mut parameters = BTreeMap::new();
        for (name, weight) in [
            ("weight_lexical", w.lexical),
            ("weight_semantic", w.semantic),
            ("weight_verb_repetition", w.verb_repetition),
            ("weight_acceptance", w.acceptance),
            ("weight_comprehension", w.comprehension),
            ("weight_cooperation", w.cooperation),
        ] {
            parameters.insert(
                name.to_string(),
                ParameterSpec::number(weight, 0.0, 1.0, "Dimension weight in the global score"),
            );
        }

        Ok(AlgorithmDescriptor {
            key: KEY.to_string(),
            display_name: "M2 - Multi-dimension alignment".to_string(),
            version: VERSION.to_string(),
            kind: AlgorithmKind::Metric,
            target: Target::M2,
            batch_supported: true,
            requires_context: true,
            description: "Lexical, semantic, verb repetition, acceptance, comprehension and cooperation"
                .to_string(),
            parameters,
        })
    }

    fn validate_config(&self) -> bool {
        (self.weights.sum() - 1.0).abs() < 0.01
    }

    async fn run(&self, input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError> {
        let start = Instant::now();
        let (t0, t1) = pair_turns(input)?;
        let (scores, evidence) = self.score(t0, t1);
        let band = self.bands.classify(scores.global);

        let json = |e: serde_json::Error| AlgorithmError::Internal(e.to_string());
        let projection = Projection::new()
            .with("m2_scores", serde_json::to_value(&scores).map_err(json)?)
            .with("m2_details", serde_json::to_value(&evidence).map_err(json)?)
            .with("m2_global_alignment", scores.global)
            .with("m2_lexical_alignment", scores.lexical)
            .with("m2_semantic_alignment", scores.semantic)
            .with("computation_status", ComputationStatus::Complete.as_str());

        let mut dimensions = BTreeMap::new();
        dimensions.insert("lexical".to_string(), scores.lexical);
        dimensions.insert("semantic".to_string(), scores.semantic);
        dimensions.insert("verb_repetition".to_string(), scores.verb_repetition);
        dimensions.insert("acceptance".to_string(), f64::from(scores.pragmatic.acceptance));
        dimensions.insert("comprehension".to_string(), f64::from(scores.pragmatic.comprehension));
        dimensions.insert("cooperation".to_string(), f64::from(scores.pragmatic.cooperation));

        let details = AlignmentDetails {
            value: scores.global,
            band: band.to_string(),
            lexical: Some(scores.lexical),
            semantic: Some(scores.semantic),
            dimensions,
            shared_terms: evidence.shared_lemmas,
            patterns: evidence.pragmatic_patterns,
        };

        Ok(ExecutionResult::new(band, scores.global, ResultDetails::Alignment(details))
            .with_version(VERSION)
            .with_projection(projection)
            .with_processing_time(start.elapsed()))
    }
}
