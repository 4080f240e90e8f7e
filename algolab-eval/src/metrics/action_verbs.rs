//! M1: action-verb density of the advisor turn
//!
//! Dictionary heuristic without an NLP model. Tokens are lemmatized by
//! suffix rules and looked up in a list of frequent action lemmas. The
//! near future (`aller` + infinitive) and the progressive (`en train de`
//! + infinitive) count as one action each.

use super::text::fold_diacritics;
use crate::types::{
    Algorithm, AlgorithmDescriptor, AlgorithmError, AlgorithmInput, AlgorithmKind,
    ComputationStatus, DensityDetails, ExecutionResult, ParameterSpec, Projection, ResultDetails,
    Target,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Instant;

pub const KEY: &str = "m1-action-verbs";
const VERSION: &str = "1.0.0";

const ACTION_LEMMAS: &[&str] = &[
    "verifier", "envoyer", "transmettre", "traiter", "regarder", "chercher", "noter", "ouvrir",
    "fermer", "mettre", "donner", "prendre", "appeler", "rappeler", "relancer", "contacter",
    "activer", "bloquer", "debloquer", "modifier", "mettre_a_jour", "valider", "annuler",
    "signaler", "deposer", "declencher", "renvoyer", "reexpedier", "rembourser", "commander",
    "saisir", "connecter", "installer", "reinstaller", "telecharger", "imprimer", "scanner",
    "transferer", "consulter", "analyser", "creer", "supprimer", "remplacer", "corriger",
    "verrouiller", "deverrouiller", "remonter", "escalader", "planifier", "programmer",
    "verbaliser", "encoder", "tester", "lancer", "relire", "confirmer",
];

const AUXILIARIES: &[&str] = &["etre", "avoir", "pouvoir", "devoir", "falloir"];

const ALLER_FORMS: &[&str] = &["vais", "vas", "va", "allons", "allez", "vont"];

pub const NEAR_FUTURE: &str = "aller+inf";
pub const PROGRESSIVE: &str = "periphrase+inf";

#[derive(Debug, Clone)]
pub struct ActionVerbConfig {
    /// Density is expressed per this many tokens
    pub per_tokens: f64,
    pub include_near_future: bool,
    pub include_progressive: bool,
    /// Extra domain lemmas
    pub custom_verbs: Vec<String>,
    pub exclude_auxiliaries: bool,
}

impl Default for ActionVerbConfig {
    fn default() -> Self {
        Self {
            per_tokens: 100.0,
            include_near_future: true,
            include_progressive: true,
            custom_verbs: Vec::new(),
            exclude_auxiliaries: true,
        }
    }
}

/// Raw counts behind an M1 score
#[derive(Debug, Clone, PartialEq)]
pub struct VerbCount {
    pub total_tokens: usize,
    pub verbs: Vec<String>,
    pub density: f64,
}

impl VerbCount {
    pub fn confidence(&self) -> f64 {
        (0.5 + (self.verbs.len() as f64 / 10.0).min(0.5)).min(1.0)
    }
}

pub struct ActionVerbCounter {
    config: ActionVerbConfig,
}

fn tokenize(text: &str) -> Vec<String> {
    fold_diacritics(&text.to_lowercase())
        .split(|c: char| !(c.is_ascii_lowercase() || c == '\'' || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn looks_infinitive(token: &str) -> bool {
    let letters = token.chars().all(|c| c.is_ascii_lowercase());
    letters
        && ["er", "ir", "re", "oir"]
            .iter()
            .any(|s| token.len() > s.len() && token.ends_with(s))
}

/// Replace the longest matching suffix, if any
fn replace_suffix(token: &str, suffixes: &[&str], replacement: &str) -> Option<String> {
    suffixes
        .iter()
        .filter(|s| token.ends_with(*s))
        .max_by_key(|s| s.len())
        .map(|s| format!("{}{}", &token[..token.len() - s.len()], replacement))
}

fn guess_lemma(token: &str) -> String {
    let bare = token.strip_prefix("s'").unwrap_or(token);
    if looks_infinitive(bare) {
        return bare.to_string();
    }

    // present tense of -er, -ir, -re verbs
    if let Some(lemma) = replace_suffix(token, &["e", "es", "ons", "ez", "ent"], "er") {
        return lemma;
    }
    if let Some(lemma) = replace_suffix(token, &["is", "it", "issons", "issez", "issent"], "ir") {
        return lemma;
    }
    if token.len() > 3 {
        if let Some(lemma) = replace_suffix(token, &["s", "t", "ons", "ez", "ent"], "re") {
            return lemma;
        }
    }

    // past participles
    if let Some(lemma) = replace_suffix(token, &["ee", "ees"], "er") {
        return lemma;
    }
    if let Some(lemma) = replace_suffix(token, &["i", "ie", "ies"], "ir") {
        return lemma;
    }
    if let Some(lemma) = replace_suffix(token, &["u", "ue", "ues"], "re") {
        return lemma;
    }

    token.to_string()
}

fn count_near_future(tokens: &[String]) -> usize {
    tokens
        .windows(2)
        .filter(|w| ALLER_FORMS.contains(&w[0].as_str()) && looks_infinitive(&w[1]))
        .count()
}

fn count_progressive(tokens: &[String]) -> usize {
    tokens
        .windows(4)
        .filter(|w| w[0] == "en" && w[1] == "train" && w[2] == "de" && looks_infinitive(&w[3]))
        .count()
}

impl ActionVerbCounter {
    pub fn new() -> Self {
        Self::with_config(ActionVerbConfig::default())
    }

    pub fn with_config(config: ActionVerbConfig) -> Self {
        Self { config }
    }

    pub fn count(&self, text: &str) -> VerbCount {
        let tokens = tokenize(text);
        let mut verbs = Vec::new();

        for token in &tokens {
            let lemma = guess_lemma(token);
            if self.config.exclude_auxiliaries && AUXILIARIES.contains(&lemma.as_str()) {
                continue;
            }
            if ACTION_LEMMAS.contains(&lemma.as_str())
                || self.config.custom_verbs.iter().any(|v| *v == lemma)
            {
                verbs.push(lemma);
            }
        }

        if self.config.include_near_future {
            verbs.extend(std::iter::repeat(NEAR_FUTURE.to_string()).take(count_near_future(&tokens)));
        }
        if self.config.include_progressive {
            verbs.extend(std::iter::repeat(PROGRESSIVE.to_string()).take(count_progressive(&tokens)));
        }

        let density = verbs.len() as f64 / tokens.len().max(1) as f64 * self.config.per_tokens;
        VerbCount {
            total_tokens: tokens.len(),
            verbs,
            density,
        }
    }
}

impl Default for ActionVerbCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Algorithm for ActionVerbCounter {
    fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError> {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "per_tokens".to_string(),
            ParameterSpec::number(self.config.per_tokens, 1.0, 1000.0, "Density normalization base"),
        );
        parameters.insert(
            "include_near_future".to_string(),
            ParameterSpec::boolean(self.config.include_near_future, "Count aller + infinitive"),
        );
        parameters.insert(
            "include_progressive".to_string(),
            ParameterSpec::boolean(self.config.include_progressive, "Count en train de + infinitive"),
        );
        parameters.insert(
            "exclude_auxiliaries".to_string(),
            ParameterSpec::boolean(self.config.exclude_auxiliaries, "Skip être/avoir/pouvoir/devoir/falloir"),
        );

        Ok(AlgorithmDescriptor {
            key: KEY.to_string(),
            display_name: "M1 - Action-verb density".to_string(),
            version: VERSION.to_string(),
            kind: AlgorithmKind::Metric,
            target: Target::M1,
            batch_supported: true,
            requires_context: false,
            description: "Action verbs in the advisor turn per 100 tokens".to_string(),
            parameters,
        })
    }

    fn validate_config(&self) -> bool {
        self.config.per_tokens > 0.0
    }

    async fn run(&self, input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError> {
        let start = Instant::now();
        let count = self.count(input.primary_text());
        let confidence = count.confidence();

        let projection = Projection::new()
            .with("m1_verb_density", count.density)
            .with("m1_verb_count", count.verbs.len())
            .with("m1_total_words", count.total_tokens)
            .with("m1_action_verbs", serde_json::json!(count.verbs))
            .with("computation_status", ComputationStatus::Complete.as_str());

        let details = DensityDetails {
            density: count.density,
            action_verb_count: count.verbs.len(),
            total_tokens: count.total_tokens,
            verbs_found: count.verbs,
        };

        Ok(ExecutionResult::new(
            format!("{:.2}", details.density),
            confidence,
            ResultDetails::Density(details),
        )
        .with_version(VERSION)
        .with_projection(projection)
        .with_processing_time(start.elapsed()))
    }
}
