//! Rule-based advisor strategy classifier (X)
//!
//! Each strategy has an ordered list of French surface patterns. The first
//! category in priority order with at least one hit wins, regardless of
//! how many hits lower-priority categories collect. Two reflection
//! categories carry guards: REFLET_VOUS is skipped when the turn also
//! contains an instruction, an explanation marker or figures, and
//! REFLET_ACQ is skipped for longer turns that read as instruction or
//! explanation.

use super::{compile_patterns, label_projection, sanitize};
use crate::labels::AdvisorTag;
use crate::types::{
    AdvisorDetails, Algorithm, AlgorithmDescriptor, AlgorithmError, AlgorithmInput,
    AlgorithmKind, ComputationStatus, ExecutionResult, ParameterSpec, ResultDetails, Target,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

pub const KEY: &str = "regex-x";
const VERSION: &str = "1.0.0";

/// One pattern; strong patterns are built on a commitment or directive cue
struct Rule {
    re: Regex,
    strong: bool,
}

fn rules(table: &str, sources: &[(&str, bool)]) -> Vec<Rule> {
    let patterns: Vec<&str> = sources.iter().map(|(s, _)| *s).collect();
    let strong: BTreeMap<&str, bool> = sources.iter().copied().collect();
    compile_patterns(table, &patterns)
        .into_iter()
        .map(|re| {
            let strong = strong.get(re.as_str()).copied().unwrap_or(false);
            Rule { re, strong }
        })
        .collect()
}

static ENGAGEMENT: Lazy<Vec<Rule>> = Lazy::new(|| {
    rules(
        "ENGAGEMENT",
        &[
            (r"(?i)\bje\s+(?:vais|m[' ]?appr[eê]te|peux|dois)\s+\w+", true),
            (
                r"(?i)\bje\s+(?:fais|v[ée]rifie|transf[eè]re|transmets?|regarde|demande|relance|note|envoie|mets|corrige|ouvre|cl[oô]ture)\b",
                false,
            ),
            (r"(?i)\bje\s+m[' ]?(?:en\s+)?(?:occupe|charge)\b", false),
            (r"(?i)\bje\s+\w+rai\b", false),
            (r"(?i)\bje\s+suis\s+en\s+train\s+de\s+\w+", false),
            (r"(?i)\bon\s+va\s+\w+", false),
        ],
    )
});

static OUVERTURE: Lazy<Vec<Rule>> = Lazy::new(|| {
    rules(
        "OUVERTURE",
        &[
            (r"(?i)\bvous\s+(?:allez|irez)\s+\w+", true),
            (r"(?i)\bvous\s+\w+rez\b", false),
            (r"(?i)\bvous\s+(?:pouvez|pourrez|devez|devrez)\b", true),
            (r"(?i)\b(?:pouvez|pourriez)[-\s]?vous\b", true),
            (r"(?i)\bveuillez\s+\w+", true),
            (r"(?i)\bmerci\s+de\s+\w+", true),
            (r"(?i)\bil\s+faudra\s+que\s+vous\b", false),
            (r"(?i)\bil\s+faut\s+(?:bien\s+)?(?:que\s+)?vous\b", true),
            (r"(?i)\bje\s+vous\s+invite\s+à\s+\w+", false),
            (r"(?i)\bpensez\s+à\s+\w+", false),
            (r"(?i)\bn[' ]?oubliez\s+pas\s+de\s+\w+", false),
            (r"(?i)\bvous\s+(?:serez|allez\s+être)\s+\w+", true),
            (
                r"(?i)(?:^|[.!?]\s+)(?:pr[ée]cisez|indiquez|donnez|appelez|envoyez|compl[ée]tez|patientez|attendez|joignez|cliquez|pr[ée]sentez)\b",
                false,
            ),
        ],
    )
});

static REFLET_VOUS: Lazy<Vec<Rule>> = Lazy::new(|| {
    rules(
        "REFLET_VOUS",
        &[
            (
                r"(?i)(?:^|[.!?]\s+|je\s+vois\s+que\s+|si\s+je\s+comprends\s+bien,\s+)vous\s+avez\s+\w+",
                false,
            ),
            (r"(?i)\bje\s+(?:vois|constate|note)\s+que\s+vous\s+\w+", false),
            (r"(?i)\bvous\s+dites\b", false),
            (r"(?i)\bd'apr[eè]s\s+vous\b", false),
            (r"(?i)\bsi\s+je\s+comprends\s+bien,\s+vous\s+\w+", false),
            (r"(?i)\bvous\s+m'avez\b", false),
        ],
    )
});

static REFLET_JE: Lazy<Vec<Rule>> = Lazy::new(|| {
    rules(
        "REFLET_JE",
        &[
            (r"(?i)\bje\s+(?:comprends|entends|vois|note)\b", false),
            (r"(?i)\bj[' ]?entends\b", false),
        ],
    )
});

static REFLET_ACQ: Lazy<Vec<Rule>> = Lazy::new(|| {
    rules(
        "REFLET_ACQ",
        &[
            (
                r"(?i)\b(?:d[' ]?accord|effectivement|tr[eè]s\s+bien|bien\s+s[uû]r|absolument|tout\s+à\s+fait|parfait|exactement)\b",
                false,
            ),
            (r"(?i)\bc[' ]?est\s+bien\s+ça\b", false),
            (
                r"(?i)^\s*(?:h+u?m+|m+hm+|mm+h+)(?:\s+(?:h+u?m+|m+hm+|mm+h+)){0,2}\s*[.!?…]*$",
                false,
            ),
            (r"(?i)^\s*(?:ou[iy]+|ouais|ok(?:ay)?)\s*[.!?…]*$", false),
        ],
    )
});

static EXPLICATION: Lazy<Vec<Rule>> = Lazy::new(|| {
    rules(
        "EXPLICATION",
        &[
            (
                r"(?i)\b(?:parce\s+que|car|c[' ]?est[- ]à[- ]dire|en\s+fait|autrement\s+dit)\b",
                false,
            ),
            (
                r"(?i)\b(?:notre|la)\s+(?:politique|proc[ée]dure|r[èe]glementation|processus|syst[èe]me)\b",
                false,
            ),
            (
                r"(?i)\b(?:vo(?:ici|ilà)\s+pourquoi|en\s+raison\s+de|la\s+raison|le\s+motif)\b",
                false,
            ),
            (r"(?i)\bc[' ]?est\s+pour\s+(?:ça|cela)\s+que\b", false),
            (r"(?i)\bil\s+s[' ]?agit\s+de\b", false),
            (r"(?i)\bça\s+veut\s+dire\b", false),
            (r"(?i)\ben\s+cons[ée]quence\b", false),
            (r"(?i)\b(?:le|ce)\s+principe\b", false),
            (r"(?i)\bfonctionne(?:nt)?\b", false),
            (r"(?i)\bje\s+vous\s+explique\b", false),
            (r"(?i)\bvous\s+comprenez(?:\s+bien)?\b", false),
            (r"(?i)\bc[' ]?est\s+(?:normal|faux|impossible)\b", false),
            (
                r"(?i)\bon\s+n[' ]?annule\s+rien\b|\bnous\s+n[' ]?annulons\s+rien\b",
                false,
            ),
            (
                r"(?i)(?:parce\s+que|car|donc).*(?:du\s+coup|c[' ]?est\s+pour\s+ça)",
                false,
            ),
        ],
    )
});

// Guards
static EXPLAIN_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_patterns(
        "explain_markers",
        &[r"(?i)\b(?:parce\s+que|c[' ]?est\s+pour\s+ça|il\s+s[' ]?agit|proc[ée]dure|syst[èe]me|fonctionne|raison|vo(?:ici|ilà)\s+pourquoi|en\s+raison)\b"],
    )
});
static FIGURES: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_patterns(
        "figures",
        &[r"(?:\d+[.,]?\d*){2,}", r"(?i)\d+[.,]?\d*.*(?:€|euros?)"],
    )
});
static INSTRUCTION_CUE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_patterns(
        "instruction_cue",
        &[r"(?i)\bil\s+faut\b|pensez\s+à|n[' ]?oubliez\s+pas|veuillez|merci\s+de|je\s+vous\s+invite\s+à|(?:^|[.!?]\s+)(?:pr[ée]cisez|indiquez|donnez|appelez|envoyez|compl[ée]tez|patientez|attendez|joignez|cliquez|pr[ée]sentez)\b"],
    )
});
static ACQ_EXPLAIN: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_patterns(
        "acq_explain",
        &[r"(?i)\b(?:parce\s+que|c[' ]?est\s+pour\s+ça|proc[ée]dure|fonctionne|syst[èe]me|raison|donc)\b"],
    )
});

fn any_match(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|re| re.is_match(text))
}

fn rules_for(tag: AdvisorTag) -> &'static [Rule] {
    match tag {
        AdvisorTag::Engagement => ENGAGEMENT.as_slice(),
        AdvisorTag::Ouverture => OUVERTURE.as_slice(),
        AdvisorTag::RefletVous => REFLET_VOUS.as_slice(),
        AdvisorTag::RefletJe => REFLET_JE.as_slice(),
        AdvisorTag::RefletAcq => REFLET_ACQ.as_slice(),
        AdvisorTag::Explication => EXPLICATION.as_slice(),
        AdvisorTag::Unrecognized => &[],
    }
}

/// Tunable constants; defaults are the calibrated values
#[derive(Debug, Clone)]
pub struct AdvisorRulesConfig {
    /// Category evaluation order (first category with a hit wins)
    pub priority: Vec<AdvisorTag>,
    pub base_confidence: f64,
    pub strong_increment: f64,
    pub weak_increment: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    /// Confidence of the no-match EXPLICATION default
    pub default_confidence: f64,
    /// REFLET_ACQ is kept regardless of cues up to this length
    pub very_short_chars: usize,
    pub short_ack_chars: usize,
    pub short_ack_bonus: f64,
    pub long_ack_chars: usize,
    pub long_ack_penalty: f64,
}

impl Default for AdvisorRulesConfig {
    fn default() -> Self {
        Self {
            priority: AdvisorTag::PRIORITY.to_vec(),
            base_confidence: 0.6,
            strong_increment: 0.12,
            weak_increment: 0.04,
            min_confidence: 0.45,
            max_confidence: 0.98,
            default_confidence: 0.3,
            very_short_chars: 20,
            short_ack_chars: 15,
            short_ack_bonus: 0.12,
            long_ack_chars: 40,
            long_ack_penalty: 0.1,
        }
    }
}

/// Outcome of the rule cascade
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorClassification {
    pub tag: AdvisorTag,
    pub confidence: f64,
    /// Every category with at least one hit (diagnostics)
    pub matched_categories: Vec<String>,
    /// Text spans matched by the winning category
    pub evidences: Vec<String>,
}

#[derive(Default)]
struct Hits {
    total: usize,
    strong: usize,
    spans: Vec<String>,
}

fn count_hits(tag: AdvisorTag, text: &str) -> Hits {
    let mut hits = Hits::default();
    for rule in rules_for(tag) {
        if let Some(m) = rule.re.find(text) {
            hits.total += 1;
            if rule.strong {
                hits.strong += 1;
            }
            hits.spans.push(m.as_str().trim().to_string());
        }
    }
    hits
}

pub struct RegexAdvisorClassifier {
    config: AdvisorRulesConfig,
}

impl RegexAdvisorClassifier {
    pub fn new() -> Self {
        Self::with_config(AdvisorRulesConfig::default())
    }

    pub fn with_config(config: AdvisorRulesConfig) -> Self {
        Self { config }
    }

    fn confidence(&self, hits: &Hits, text: &str, tag: AdvisorTag) -> f64 {
        let c = &self.config;
        let weak = hits.total.saturating_sub(hits.strong);
        let mut raw =
            c.base_confidence + c.strong_increment * hits.strong as f64 + c.weak_increment * weak as f64;

        if tag == AdvisorTag::RefletAcq {
            let len = text.chars().count();
            if len <= c.short_ack_chars {
                raw += c.short_ack_bonus;
            }
            if len > c.long_ack_chars {
                raw -= c.long_ack_penalty;
            }
        }

        raw.clamp(c.min_confidence, c.max_confidence)
    }

    /// Run the rule cascade over raw verbatim
    pub fn classify(&self, verbatim: &str) -> AdvisorClassification {
        let text = sanitize(verbatim);
        if text.is_empty() {
            return AdvisorClassification {
                tag: AdvisorTag::Explication,
                confidence: 0.0,
                matched_categories: Vec::new(),
                evidences: Vec::new(),
            };
        }

        let matched_categories: Vec<String> = AdvisorTag::PRIORITY
            .iter()
            .filter(|tag| count_hits(**tag, &text).total > 0)
            .map(|tag| tag.as_str().to_string())
            .collect();

        let instruction_cue = any_match(&INSTRUCTION_CUE, &text);
        let explain_markers = any_match(&EXPLAIN_MARKERS, &text);
        let figures = any_match(&FIGURES, &text);

        for tag in &self.config.priority {
            let hits = count_hits(*tag, &text);
            if hits.total == 0 {
                continue;
            }

            let guarded = match tag {
                AdvisorTag::RefletVous => instruction_cue || explain_markers || figures,
                AdvisorTag::RefletAcq => {
                    let very_short = text.chars().count() <= self.config.very_short_chars;
                    !very_short && (instruction_cue || any_match(&ACQ_EXPLAIN, &text))
                }
                _ => false,
            };
            if guarded {
                debug!(tag = %tag, "Guard suppressed reflection category");
                continue;
            }

            return AdvisorClassification {
                tag: *tag,
                confidence: self.confidence(&hits, &text, *tag),
                matched_categories,
                evidences: hits.spans,
            };
        }

        AdvisorClassification {
            tag: AdvisorTag::Explication,
            confidence: self.config.default_confidence,
            matched_categories,
            evidences: Vec::new(),
        }
    }
}

impl Default for RegexAdvisorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Algorithm for RegexAdvisorClassifier {
    fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError> {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "default_confidence".to_string(),
            ParameterSpec::number(
                self.config.default_confidence,
                0.0,
                1.0,
                "Confidence of the no-match EXPLICATION default",
            ),
        );
        parameters.insert(
            "priority".to_string(),
            ParameterSpec::text(
                &self
                    .config
                    .priority
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(">"),
                "Category evaluation order",
            ),
        );

        Ok(AlgorithmDescriptor {
            key: KEY.to_string(),
            display_name: "Rules – X (advisor)".to_string(),
            version: VERSION.to_string(),
            kind: AlgorithmKind::Classifier,
            target: Target::X,
            batch_supported: true,
            requires_context: false,
            description: "Advisor strategy classification by ordered regex rules with reflection guards"
                .to_string(),
            parameters,
        })
    }

    fn validate_config(&self) -> bool {
        let c = &self.config;
        !c.priority.is_empty()
            && c.min_confidence <= c.max_confidence
            && (0.0..=1.0).contains(&c.default_confidence)
    }

    async fn run(&self, input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError> {
        let start = Instant::now();
        let outcome = self.classify(input.primary_text());
        let label = outcome.tag.as_str();

        let details = AdvisorDetails {
            family: outcome.tag.family().to_string(),
            matched_patterns: outcome.matched_categories,
            rationale: None,
            evidences: outcome.evidences,
        };

        Ok(ExecutionResult::new(label, outcome.confidence, ResultDetails::Advisor(details))
            .with_version(VERSION)
            .with_projection(label_projection(
                Target::X,
                KEY,
                VERSION,
                label,
                outcome.confidence,
                ComputationStatus::Complete,
            ))
            .with_processing_time(start.elapsed()))
    }
}
