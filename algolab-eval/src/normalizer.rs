//! Result Normalizer
//!
//! Merges an [`ExecutionResult`] with its originating [`Sample`] into the
//! one record shape the statistics, write-back and ledger consume. Each
//! result family lands in its own metadata slot, so consumers never need
//! to know which concrete algorithm produced the record.

use crate::labels::{
    canonical_advisor_label, canonical_client_label, normalize_label, AdvisorTag,
};
use crate::types::{
    AdvisorDetails, AlignmentDetails, ClientDetails, DensityDetails, ExecutionResult,
    LoadDetails, Projection, ResultDetails, Sample, Target,
};
use serde::{Deserialize, Serialize};

/// Family-specific metadata, one predictable slot per family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub advisor: Option<AdvisorDetails>,
    pub client: Option<ClientDetails>,
    pub density: Option<DensityDetails>,
    pub alignment: Option<AlignmentDetails>,
    pub load: Option<LoadDetails>,
    /// Spans or markers that justify the prediction
    pub evidences: Vec<String>,
    /// Columns to write back to the corpus
    pub projection: Projection,
    pub fallback_reason: Option<String>,
    pub prev1: Option<String>,
    pub prev2: Option<String>,
    pub next1: Option<String>,
    pub call_id: Option<String>,
}

/// Canonical merge of one sample and one result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub pair_id: Option<i64>,
    pub target: Target,
    pub verbatim: String,
    /// Canonicalized gold label
    pub gold: String,
    pub predicted: String,
    pub correct: bool,
    pub confidence: f64,
    pub processing_time_ms: f64,
    pub algorithm_version: String,
    pub metadata: RecordMetadata,
}

impl ValidationRecord {
    /// Numeric value for continuous targets
    pub fn value(&self) -> Option<f64> {
        let m = &self.metadata;
        m.density
            .as_ref()
            .map(|d| d.density)
            .or_else(|| m.alignment.as_ref().map(|d| d.value))
            .or_else(|| m.load.as_ref().map(|d| d.value))
    }

    pub fn is_fallback(&self) -> bool {
        self.metadata.fallback_reason.is_some()
    }
}

/// Gold label as scored for `target`
///
/// Corpus samples reach this only with a recognized tag; the defaulting
/// applies to ad hoc samples such as quick tests.
pub fn canonical_gold(target: Target, raw: &str) -> String {
    match target {
        // M3 reads the client turn, so its gold is the client reaction
        Target::Y | Target::M3 => canonical_client_label(raw),
        Target::X | Target::M1 | Target::M2 => canonical_advisor_label(raw),
    }
}

/// Predicted label as scored for `target`
///
/// Unlike gold labels, unknown predictions keep their own spelling so
/// they surface in the "other" confusion column instead of silently
/// counting as the default class.
pub fn canonical_prediction(target: Target, raw: &str) -> String {
    match target {
        Target::X => AdvisorTag::parse(raw)
            .map(|tag| tag.as_str().to_string())
            .unwrap_or_else(|| normalize_label(raw)),
        Target::Y => match normalize_label(raw).as_str() {
            "POS" | "POSITIF" | "NEG" | "NEGATIF" | "NEU" | "NEUTRE" => canonical_client_label(raw),
            other => other.to_string(),
        },
        Target::M1 | Target::M2 | Target::M3 => raw.trim().to_string(),
    }
}

pub fn normalize(result: &ExecutionResult, sample: &Sample, target: Target) -> ValidationRecord {
    let gold = canonical_gold(target, &sample.expected);
    let predicted = canonical_prediction(target, &result.prediction);
    let correct = !predicted.is_empty() && predicted == gold;

    let mut metadata = RecordMetadata {
        projection: result.projection.clone(),
        fallback_reason: result.fallback_reason.clone(),
        prev1: sample.metadata.prev1.clone(),
        prev2: sample.metadata.prev2.clone(),
        next1: sample
            .metadata
            .next1
            .clone()
            .or_else(|| sample.metadata.t1.clone()),
        call_id: sample.metadata.call_id.clone(),
        ..Default::default()
    };

    match &result.details {
        ResultDetails::Advisor(d) => {
            metadata.evidences = d.evidences.clone();
            metadata.advisor = Some(d.clone());
        }
        ResultDetails::Client(d) => {
            metadata.evidences = d.cues.clone();
            metadata.client = Some(d.clone());
        }
        ResultDetails::Density(d) => {
            metadata.evidences = d.verbs_found.clone();
            metadata.density = Some(d.clone());
        }
        ResultDetails::Alignment(d) => {
            metadata.evidences = d.shared_terms.iter().chain(&d.patterns).cloned().collect();
            metadata.alignment = Some(d.clone());
        }
        ResultDetails::Load(d) => {
            metadata.evidences = d.markers.clone();
            metadata.load = Some(d.clone());
        }
    }

    ValidationRecord {
        pair_id: sample.metadata.pair_id,
        target,
        verbatim: sample.verbatim.clone(),
        gold,
        predicted,
        correct,
        confidence: result.confidence,
        processing_time_ms: result.processing_time_ms,
        algorithm_version: result.algorithm_version.clone(),
        metadata,
    }
}
