//! Corpus access
//!
//! The corpus is a table of annotated advisor → client turn pairs. The
//! harness only sees it through [`CorpusStore`]; adapters exist for
//! SQLite ([`SqliteCorpusStore`]) and for tests ([`InMemoryCorpusStore`]).

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryCorpusStore;
pub use sqlite::SqliteCorpusStore;

use crate::labels::{is_advisor_gold, is_client_gold};
use crate::types::{ComputationStatus, Projection, Sample, SampleKind, SampleMetadata, Target};
use algolab_common::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One annotated advisor turn and the client turn that follows it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusPair {
    pub pair_id: i64,
    pub call_id: String,
    /// Gold advisor strategy (X)
    pub strategy_tag: String,
    /// Gold client reaction (Y)
    pub reaction_tag: String,
    pub advisor_verbatim: String,
    pub client_verbatim: String,
    pub advisor_turn_id: Option<i64>,
    pub client_turn_id: Option<i64>,
    pub prev1_verbatim: Option<String>,
    pub prev1_speaker: Option<String>,
    pub prev2_verbatim: Option<String>,
    pub prev2_speaker: Option<String>,
    pub next1_verbatim: Option<String>,
    pub computation_status: Option<String>,
}

impl CorpusPair {
    /// Minimal pair, mostly for tests and fixtures
    pub fn new(
        pair_id: i64,
        call_id: &str,
        strategy_tag: &str,
        reaction_tag: &str,
        advisor_verbatim: &str,
        client_verbatim: &str,
    ) -> Self {
        Self {
            pair_id,
            call_id: call_id.to_string(),
            strategy_tag: strategy_tag.to_string(),
            reaction_tag: reaction_tag.to_string(),
            advisor_verbatim: advisor_verbatim.to_string(),
            client_verbatim: client_verbatim.to_string(),
            ..Default::default()
        }
    }

    /// Turn immediately before the advisor turn, as `speaker: text`
    pub fn prev1(&self) -> Option<String> {
        speaker_turn(self.prev1_speaker.as_deref(), self.prev1_verbatim.as_deref())
    }

    /// Turn two steps before the advisor turn, as `speaker: text`
    pub fn prev2(&self) -> Option<String> {
        speaker_turn(self.prev2_speaker.as_deref(), self.prev2_verbatim.as_deref())
    }
}

fn speaker_turn(speaker: Option<&str>, verbatim: Option<&str>) -> Option<String> {
    let text = verbatim.map(str::trim).filter(|t| !t.is_empty())?;
    match speaker.map(str::trim).filter(|s| !s.is_empty()) {
        Some(speaker) => Some(format!("{}: {}", speaker.to_lowercase(), text)),
        None => Some(text.to_string()),
    }
}

/// Which pairs to read
#[derive(Debug, Clone, Default)]
pub struct PairFilter {
    pub call_id: Option<String>,
    pub limit: Option<usize>,
}

impl PairFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_call(call_id: &str) -> Self {
        Self {
            call_id: Some(call_id.to_string()),
            limit: None,
        }
    }
}

/// Corpus collaborator
///
/// Writes are keyed by `pair_id` and idempotent: writing the same
/// projection twice leaves the row unchanged.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Pairs matching `filter`, ordered by `pair_id`
    async fn fetch_pairs(&self, filter: &PairFilter) -> Result<Vec<CorpusPair>>;

    /// Write projected columns for one pair
    ///
    /// # Errors
    /// `InvalidInput` when a column is not a known projection column,
    /// `NotFound` when the pair does not exist.
    async fn update_projection(&self, pair_id: i64, projection: &Projection) -> Result<()>;

    /// Set `computation_status` only
    async fn mark_status(&self, pair_id: i64, status: ComputationStatus) -> Result<()>;
}

/// Columns a projection may write
pub const PROJECTION_COLUMNS: &[&str] = &[
    "x_predicted_tag",
    "x_confidence",
    "x_algorithm_key",
    "x_algorithm_version",
    "x_computed_at",
    "y_predicted_tag",
    "y_confidence",
    "y_algorithm_key",
    "y_algorithm_version",
    "y_computed_at",
    "m1_verb_density",
    "m1_verb_count",
    "m1_total_words",
    "m1_action_verbs",
    "m2_global_alignment",
    "m2_lexical_alignment",
    "m2_semantic_alignment",
    "m2_scores",
    "m2_details",
    "m3_cognitive_score",
    "m3_hesitation_count",
    "m3_pause_count",
    "m3_markers",
    "computation_status",
];

pub fn is_projection_column(column: &str) -> bool {
    PROJECTION_COLUMNS.contains(&column)
}

/// Reject projections naming unknown columns
pub fn check_projection(projection: &Projection) -> Result<()> {
    let unknown: Vec<&str> = projection
        .iter()
        .map(|(column, _)| column.as_str())
        .filter(|column| !is_projection_column(column))
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(algolab_common::Error::InvalidInput(format!(
            "Unknown projection column(s): {}",
            unknown.join(", ")
        )))
    }
}

/// Project corpus pairs into samples: advisor, client and pair, per pair
pub fn project_samples(pairs: &[CorpusPair]) -> Vec<Sample> {
    let mut samples = Vec::with_capacity(pairs.len() * 3);

    for pair in pairs {
        let base = |kind: SampleKind, turn_id: Option<i64>| SampleMetadata {
            pair_id: Some(pair.pair_id),
            call_id: Some(pair.call_id.clone()),
            turn_id,
            prev1: pair.prev1(),
            prev2: pair.prev2(),
            next1: pair.next1_verbatim.clone(),
            ..SampleMetadata::new(kind)
        };

        samples.push(Sample {
            verbatim: pair.advisor_verbatim.clone(),
            expected: pair.strategy_tag.clone(),
            metadata: base(SampleKind::Advisor, pair.advisor_turn_id),
        });

        samples.push(Sample {
            verbatim: pair.client_verbatim.clone(),
            expected: pair.reaction_tag.clone(),
            metadata: SampleMetadata {
                // The advisor turn is the client's immediate context
                prev1: Some(format!("conseiller: {}", pair.advisor_verbatim.trim())),
                prev2: pair.prev1(),
                ..base(SampleKind::Client, pair.client_turn_id)
            },
        });

        samples.push(Sample {
            verbatim: pair.advisor_verbatim.clone(),
            expected: pair.strategy_tag.clone(),
            metadata: SampleMetadata {
                t0: Some(pair.advisor_verbatim.clone()),
                t1: Some(pair.client_verbatim.clone()),
                ..base(SampleKind::Pair, pair.advisor_turn_id)
            },
        });
    }

    samples
}

/// Whether a sample feeds algorithms of `target`
///
/// Corpus rows only count as gold when their tag is a recognized label for
/// the turn they score and the scored text is not blank.
pub fn sample_matches(sample: &Sample, target: Target) -> bool {
    let meta = &sample.metadata;
    let has_text = |text: Option<&str>| text.is_some_and(|t| !t.trim().is_empty());

    match target {
        Target::X | Target::M1 => {
            meta.kind == SampleKind::Advisor
                && has_text(Some(sample.verbatim.as_str()))
                && is_advisor_gold(&sample.expected)
        }
        Target::Y | Target::M3 => {
            meta.kind == SampleKind::Client
                && has_text(Some(sample.verbatim.as_str()))
                && is_client_gold(&sample.expected)
        }
        Target::M2 => {
            meta.kind == SampleKind::Pair
                && has_text(meta.t0.as_deref())
                && has_text(meta.t1.as_deref())
                && is_advisor_gold(&sample.expected)
        }
    }
}

/// Samples usable by `target`
pub fn samples_for_target(samples: &[Sample], target: Target) -> Vec<Sample> {
    samples
        .iter()
        .filter(|s| sample_matches(s, target))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::UNRECOGNIZED_LABEL;

    fn pair() -> CorpusPair {
        CorpusPair {
            prev1_verbatim: Some("je voudrais annuler".to_string()),
            prev1_speaker: Some("CLIENT".to_string()),
            next1_verbatim: Some("merci".to_string()),
            ..CorpusPair::new(
                3,
                "call-1",
                "ENGAGEMENT",
                "CLIENT_POSITIF",
                "je vais annuler votre contrat",
                "d'accord",
            )
        }
    }

    #[test]
    fn test_three_samples_per_pair() {
        let samples = project_samples(&[pair()]);
        assert_eq!(samples.len(), 3);

        let advisor = &samples[0];
        assert_eq!(advisor.metadata.kind, SampleKind::Advisor);
        assert_eq!(advisor.expected, "ENGAGEMENT");
        assert_eq!(advisor.metadata.prev1.as_deref(), Some("client: je voudrais annuler"));

        let client = &samples[1];
        assert_eq!(client.expected, "CLIENT_POSITIF");
        assert_eq!(
            client.metadata.prev1.as_deref(),
            Some("conseiller: je vais annuler votre contrat")
        );

        let pair_sample = &samples[2];
        assert_eq!(pair_sample.metadata.t1.as_deref(), Some("d'accord"));
        assert_eq!(pair_sample.metadata.pair_id, Some(3));
    }

    #[test]
    fn test_target_filtering() {
        let mut blank = pair();
        blank.pair_id = 4;
        blank.client_verbatim = "  ".to_string();
        let samples = project_samples(&[pair(), blank]);

        assert_eq!(samples_for_target(&samples, Target::X).len(), 2);
        // Blank client turn disqualifies both the client and the pair sample
        assert_eq!(samples_for_target(&samples, Target::M3).len(), 1);
        assert_eq!(samples_for_target(&samples, Target::M2).len(), 1);
    }

    #[test]
    fn test_untagged_and_blank_rows_are_not_gold() {
        let mut untagged = pair();
        untagged.pair_id = 5;
        untagged.strategy_tag = String::new();
        untagged.reaction_tag = "pas un tag".to_string();

        let mut blank_advisor = pair();
        blank_advisor.pair_id = 6;
        blank_advisor.advisor_verbatim = "   ".to_string();

        let mut unrecognized = pair();
        unrecognized.pair_id = 7;
        unrecognized.strategy_tag = UNRECOGNIZED_LABEL.to_string();

        let samples = project_samples(&[pair(), untagged, blank_advisor, unrecognized]);
        let ids = |target| -> Vec<Option<i64>> {
            samples_for_target(&samples, target)
                .iter()
                .map(|s| s.metadata.pair_id)
                .collect()
        };

        assert_eq!(ids(Target::X), vec![Some(3)]);
        assert_eq!(ids(Target::M1), vec![Some(3)]);
        assert_eq!(ids(Target::M2), vec![Some(3)]);
        assert_eq!(ids(Target::Y), vec![Some(3), Some(6), Some(7)]);
    }

    #[test]
    fn test_missing_context_stays_none() {
        let bare = CorpusPair::new(1, "c", "", "", "a", "b");
        assert_eq!(bare.prev1(), None);
        let unnamed = CorpusPair {
            prev2_verbatim: Some(" bonjour ".to_string()),
            ..bare
        };
        assert_eq!(unnamed.prev2().as_deref(), Some("bonjour"));
    }

    #[test]
    fn test_unknown_projection_column_rejected() {
        let ok = Projection::new().with("x_predicted_tag", "ENGAGEMENT");
        assert!(check_projection(&ok).is_ok());

        let bad = ok.with("strategy_tag", "OUVERTURE");
        let err = check_projection(&bad).unwrap_err();
        assert!(err.to_string().contains("strategy_tag"));
    }
}
