//! Core Types and Trait Definitions for algolab-eval
//!
//! Defines the Algorithm Contract shared by every classifier and metric
//! calculator, and the data shapes that flow through the harness:
//! - **Sample**: immutable corpus unit (verbatim + gold + context)
//! - **AlgorithmInput**: the algorithm-specific view of a sample
//! - **ExecutionResult**: one algorithm output for one sample
//! - **ResultDetails**: per-family explanatory payload (tagged union)
//! - **Projection**: the exact corpus columns to write back
//!
//! # Architecture
//! Algorithms never see the corpus directly. The harness projects a
//! `Sample` into an `AlgorithmInput`, calls `Algorithm::run`, and hands
//! the `ExecutionResult` to the normalizer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Target variables
// ============================================================================

/// Target variable an algorithm predicts or scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Target {
    /// Advisor strategy tag (categorical)
    X,
    /// Client reaction tag (categorical)
    Y,
    /// Action-verb density of the advisor turn (continuous)
    M1,
    /// Advisor → client alignment (continuous, banded)
    M2,
    /// Client cognitive-load proxy (continuous)
    M3,
}

impl Target {
    pub const ALL: [Target; 5] = [Target::X, Target::Y, Target::M1, Target::M2, Target::M3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::X => "X",
            Target::Y => "Y",
            Target::M1 => "M1",
            Target::M2 => "M2",
            Target::M3 => "M3",
        }
    }

    /// Column prefix used by the version registry slots (`x_key`, `m2_version`, ...)
    pub fn column_prefix(&self) -> &'static str {
        match self {
            Target::X => "x",
            Target::Y => "y",
            Target::M1 => "m1",
            Target::M2 => "m2",
            Target::M3 => "m3",
        }
    }

    /// Categorical targets are scored with label agreement statistics only
    pub fn is_categorical(&self) -> bool {
        matches!(self, Target::X | Target::Y)
    }

    pub fn default_kind(&self) -> AlgorithmKind {
        if self.is_categorical() {
            AlgorithmKind::Classifier
        } else {
            AlgorithmKind::Metric
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "X" => Ok(Target::X),
            "Y" => Ok(Target::Y),
            "M1" => Ok(Target::M1),
            "M2" => Ok(Target::M2),
            "M3" => Ok(Target::M3),
            other => Err(format!("Unknown target variable: {}", other)),
        }
    }
}

/// Classifier vs. continuous metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    Classifier,
    Metric,
}

// ============================================================================
// Algorithm Descriptor
// ============================================================================

/// Parameter value type in a descriptor's schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Number,
    Boolean,
    Text,
}

/// One tunable parameter exposed by an algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub kind: ParameterKind,
    pub default: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default)]
    pub description: String,
}

impl ParameterSpec {
    pub fn number(default: f64, min: f64, max: f64, description: &str) -> Self {
        Self {
            kind: ParameterKind::Number,
            default: serde_json::json!(default),
            min: Some(min),
            max: Some(max),
            description: description.to_string(),
        }
    }

    pub fn boolean(default: bool, description: &str) -> Self {
        Self {
            kind: ParameterKind::Boolean,
            default: serde_json::json!(default),
            min: None,
            max: None,
            description: description.to_string(),
        }
    }

    pub fn text(default: &str, description: &str) -> Self {
        Self {
            kind: ParameterKind::Text,
            default: serde_json::json!(default),
            min: None,
            max: None,
            description: description.to_string(),
        }
    }
}

/// Self-reported facts about an algorithm
///
/// Always well-formed once it leaves the registry: `key`, `display_name`
/// and `version` are non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmDescriptor {
    pub key: String,
    pub display_name: String,
    pub version: String,
    pub kind: AlgorithmKind,
    pub target: Target,
    pub batch_supported: bool,
    pub requires_context: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,
}

impl AlgorithmDescriptor {
    /// Descriptor is usable without repair
    pub fn is_well_formed(&self) -> bool {
        !self.key.trim().is_empty()
            && !self.display_name.trim().is_empty()
            && !self.version.trim().is_empty()
    }
}

/// Partially-known descriptor fields
///
/// Used both for registration overrides and for whatever legacy metadata
/// an algorithm can still offer when `describe()` fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialDescriptor {
    pub key: Option<String>,
    pub display_name: Option<String>,
    pub version: Option<String>,
    pub kind: Option<AlgorithmKind>,
    pub target: Option<Target>,
    pub batch_supported: Option<bool>,
    pub requires_context: Option<bool>,
    pub description: Option<String>,
    pub parameters: Option<BTreeMap<String, ParameterSpec>>,
}

impl PartialDescriptor {
    pub fn is_empty(&self) -> bool {
        *self == PartialDescriptor::default()
    }
}

impl From<AlgorithmDescriptor> for PartialDescriptor {
    fn from(d: AlgorithmDescriptor) -> Self {
        let non_empty = |s: String| if s.trim().is_empty() { None } else { Some(s) };
        Self {
            key: non_empty(d.key),
            display_name: non_empty(d.display_name),
            version: non_empty(d.version),
            kind: Some(d.kind),
            target: Some(d.target),
            batch_supported: Some(d.batch_supported),
            requires_context: Some(d.requires_context),
            description: non_empty(d.description),
            parameters: if d.parameters.is_empty() { None } else { Some(d.parameters) },
        }
    }
}

// ============================================================================
// Samples and inputs
// ============================================================================

/// Which projection of a corpus pair a sample is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    /// Advisor turn (X, M1)
    Advisor,
    /// Client turn (Y, M3)
    Client,
    /// Advisor turn + following client turn (M2)
    Pair,
}

/// Contextual metadata carried by a sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    pub kind: SampleKind,
    pub pair_id: Option<i64>,
    pub call_id: Option<String>,
    pub turn_id: Option<i64>,
    pub prev1: Option<String>,
    pub prev2: Option<String>,
    pub next1: Option<String>,
    /// Current turn (pair samples)
    pub t0: Option<String>,
    /// Following turn (pair samples)
    pub t1: Option<String>,
}

impl SampleMetadata {
    pub fn new(kind: SampleKind) -> Self {
        Self {
            kind,
            pair_id: None,
            call_id: None,
            turn_id: None,
            prev1: None,
            prev2: None,
            next1: None,
            t0: None,
            t1: None,
        }
    }
}

/// Immutable unit drawn from the corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub verbatim: String,
    /// Gold label (or value, stringified)
    pub expected: String,
    pub metadata: SampleMetadata,
}

impl Sample {
    /// Free-standing sample without corpus identity (smoke tests, proxy calls)
    pub fn adhoc(verbatim: impl Into<String>, expected: impl Into<String>, kind: SampleKind) -> Self {
        Self {
            verbatim: verbatim.into(),
            expected: expected.into(),
            metadata: SampleMetadata::new(kind),
        }
    }
}

/// Algorithm-specific input shape built from a sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum AlgorithmInput {
    /// Single turn
    Text { text: String },
    /// Current turn with up to two preceding turns
    Context {
        t_minus2: Option<String>,
        t_minus1: Option<String>,
        t0: String,
    },
    /// Current turn and the following turn
    Pair { t0: String, t1: String },
}

impl AlgorithmInput {
    pub fn text(text: impl Into<String>) -> Self {
        AlgorithmInput::Text { text: text.into() }
    }

    pub fn pair(t0: impl Into<String>, t1: impl Into<String>) -> Self {
        AlgorithmInput::Pair {
            t0: t0.into(),
            t1: t1.into(),
        }
    }

    /// The turn being classified or scored
    pub fn primary_text(&self) -> &str {
        match self {
            AlgorithmInput::Text { text } => text,
            AlgorithmInput::Context { t0, .. } => t0,
            AlgorithmInput::Pair { t0, .. } => t0,
        }
    }
}

// ============================================================================
// Execution results
// ============================================================================

/// Value of the corpus `computation_status` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputationStatus {
    Pending,
    Complete,
    Error,
}

impl ComputationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputationStatus::Pending => "pending",
            ComputationStatus::Complete => "complete",
            ComputationStatus::Error => "error",
        }
    }
}

impl fmt::Display for ComputationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Corpus columns to persist for one record (column → value)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Projection(BTreeMap<String, serde_json::Value>);

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<serde_json::Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<serde_json::Value>) {
        self.0.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&serde_json::Value> {
        self.0.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Advisor-strategy classifier details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisorDetails {
    /// ENGAGEMENT / OUVERTURE / REFLET / EXPLICATION
    pub family: String,
    pub matched_patterns: Vec<String>,
    pub rationale: Option<String>,
    /// Text spans that triggered the decision
    pub evidences: Vec<String>,
}

/// Client-reaction classifier details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientDetails {
    pub family: String,
    pub cues: Vec<String>,
    /// Per-category raw scores
    pub scores: BTreeMap<String, f64>,
}

/// Action-verb density details (M1)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DensityDetails {
    pub density: f64,
    pub action_verb_count: usize,
    pub total_tokens: usize,
    pub verbs_found: Vec<String>,
}

/// Alignment details (M2)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentDetails {
    pub value: f64,
    pub band: String,
    pub lexical: Option<f64>,
    pub semantic: Option<f64>,
    /// Named sub-dimension scores (multi-dimension calculator)
    pub dimensions: BTreeMap<String, f64>,
    pub shared_terms: Vec<String>,
    /// Pragmatic patterns that fired
    pub patterns: Vec<String>,
}

/// Disfluency / cognitive-load details (M3)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadDetails {
    pub value: f64,
    pub hesitation_count: usize,
    pub pause_count: usize,
    pub ellipsis_count: usize,
    pub word_count: usize,
    pub markers: Vec<String>,
}

/// Family-specific explanatory payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family_kind", rename_all = "snake_case")]
pub enum ResultDetails {
    Advisor(AdvisorDetails),
    Client(ClientDetails),
    Density(DensityDetails),
    Alignment(AlignmentDetails),
    Load(LoadDetails),
}

impl ResultDetails {
    /// Numeric value for continuous families
    pub fn value(&self) -> Option<f64> {
        match self {
            ResultDetails::Advisor(_) | ResultDetails::Client(_) => None,
            ResultDetails::Density(d) => Some(d.density),
            ResultDetails::Alignment(d) => Some(d.value),
            ResultDetails::Load(d) => Some(d.value),
        }
    }
}

/// One algorithm output for one sample; never mutated after the harness receives it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Label string or stringified numeric value
    pub prediction: String,
    /// Confidence in [0, 1] (a proxy, not a probability, for metrics)
    pub confidence: f64,
    pub processing_time_ms: f64,
    pub algorithm_version: String,
    pub details: ResultDetails,
    pub projection: Projection,
    /// Set when the result is a deterministic fallback
    pub fallback_reason: Option<String>,
}

impl ExecutionResult {
    /// Create new result with clamped confidence (0.0-1.0)
    pub fn new(prediction: impl Into<String>, confidence: f64, details: ResultDetails) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            prediction: prediction.into(),
            confidence,
            processing_time_ms: 0.0,
            algorithm_version: String::new(),
            details,
            projection: Projection::new(),
            fallback_reason: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.algorithm_version = version.into();
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_fallback(mut self, reason: impl Into<String>) -> Self {
        self.fallback_reason = Some(reason.into());
        self
    }

    pub fn with_processing_time(mut self, elapsed: std::time::Duration) -> Self {
        self.processing_time_ms = elapsed.as_secs_f64() * 1000.0;
        self
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

// ============================================================================
// Algorithm Contract
// ============================================================================

/// Algorithm execution error
#[derive(Debug, Error)]
pub enum AlgorithmError {
    /// Input shape not supported by this algorithm
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Algorithm configuration unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network failure reaching a remote collaborator
    #[error("Network error: {0}")]
    Network(String),

    /// Remote call exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Remote API returned an error
    #[error("API error: {0}")]
    Api(String),

    /// Output could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Algorithm Contract
///
/// Every classifier and metric calculator implements this trait so the
/// registry and harness can host heterogeneous implementations behind one
/// interface.
///
/// # Example
/// ```rust,ignore
/// use algolab_eval::types::{Algorithm, AlgorithmInput, ExecutionResult};
///
/// pub struct AlwaysExplanation;
///
/// #[async_trait::async_trait]
/// impl Algorithm for AlwaysExplanation {
///     fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError> { ... }
///
///     async fn run(&self, input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError> {
///         Ok(ExecutionResult::new("EXPLICATION", 0.3, details))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Algorithm: Send + Sync {
    /// Self-description; may fail or be partial, the registry repairs it
    fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError>;

    /// Whatever metadata survives when `describe()` is unusable
    fn legacy_metadata(&self) -> PartialDescriptor {
        PartialDescriptor::default()
    }

    /// Configuration sanity check (credentials present, ranges valid)
    fn validate_config(&self) -> bool {
        true
    }

    /// Project a sample into this algorithm's input shape
    ///
    /// Pair samples become `Pair`, everything else `Text`. Context-aware
    /// algorithms override this to read the preceding turns.
    fn build_input(&self, sample: &Sample) -> AlgorithmInput {
        match sample.metadata.kind {
            SampleKind::Pair => AlgorithmInput::Pair {
                t0: sample
                    .metadata
                    .t0
                    .clone()
                    .unwrap_or_else(|| sample.verbatim.clone()),
                t1: sample.metadata.t1.clone().unwrap_or_default(),
            },
            SampleKind::Advisor | SampleKind::Client => AlgorithmInput::text(sample.verbatim.clone()),
        }
    }

    /// Execute on a single input
    ///
    /// # Errors
    /// Returns `AlgorithmError` on failure; the harness converts it into a
    /// fallback result so the batch continues.
    async fn run(&self, input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError>;

    /// Execute on many inputs (default: sequential `run`)
    async fn batch_run(
        &self,
        inputs: &[AlgorithmInput],
    ) -> Vec<Result<ExecutionResult, AlgorithmError>> {
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            results.push(self.run(input).await);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parse_and_display() {
        for target in Target::ALL {
            assert_eq!(target.as_str().parse::<Target>().unwrap(), target);
        }
        assert_eq!(" m2 ".parse::<Target>().unwrap(), Target::M2);
        assert!("Z".parse::<Target>().is_err());
    }

    #[test]
    fn test_target_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Target::M3).unwrap(), "\"M3\"");
        assert_eq!(Target::M1.column_prefix(), "m1");
        assert!(Target::Y.is_categorical());
        assert_eq!(Target::M2.default_kind(), AlgorithmKind::Metric);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let details = ResultDetails::Advisor(AdvisorDetails::default());
        assert_eq!(ExecutionResult::new("X", 1.7, details.clone()).confidence, 1.0);
        assert_eq!(ExecutionResult::new("X", -0.2, details.clone()).confidence, 0.0);
        assert_eq!(ExecutionResult::new("X", f64::NAN, details).confidence, 0.0);
    }

    #[test]
    fn test_details_value_only_for_continuous_families() {
        assert_eq!(ResultDetails::Client(ClientDetails::default()).value(), None);
        let load = LoadDetails {
            value: 0.42,
            ..Default::default()
        };
        assert_eq!(ResultDetails::Load(load).value(), Some(0.42));
    }

    #[test]
    fn test_primary_text() {
        let input = AlgorithmInput::Context {
            t_minus2: None,
            t_minus1: Some("client: bonjour".to_string()),
            t0: "je vais regarder".to_string(),
        };
        assert_eq!(input.primary_text(), "je vais regarder");
        assert_eq!(AlgorithmInput::pair("a", "b").primary_text(), "a");
    }

    struct Echo;

    #[async_trait::async_trait]
    impl Algorithm for Echo {
        fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError> {
            Err(AlgorithmError::Internal("unused".to_string()))
        }

        async fn run(&self, input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError> {
            Ok(ExecutionResult::new(
                input.primary_text(),
                1.0,
                ResultDetails::Advisor(AdvisorDetails::default()),
            ))
        }
    }

    #[test]
    fn test_default_build_input_by_sample_kind() {
        let advisor = Sample::adhoc("je vais regarder", "ENGAGEMENT", SampleKind::Advisor);
        assert_eq!(Echo.build_input(&advisor), AlgorithmInput::text("je vais regarder"));

        let mut pair = Sample::adhoc("je vais regarder", "ENGAGEMENT", SampleKind::Pair);
        pair.metadata.t1 = Some("d'accord".to_string());
        assert_eq!(
            Echo.build_input(&pair),
            AlgorithmInput::pair("je vais regarder", "d'accord")
        );
    }

    #[test]
    fn test_partial_from_descriptor_drops_blank_strings() {
        let descriptor = AlgorithmDescriptor {
            key: "k".to_string(),
            display_name: " ".to_string(),
            version: "1.0.0".to_string(),
            kind: AlgorithmKind::Classifier,
            target: Target::X,
            batch_supported: false,
            requires_context: false,
            description: String::new(),
            parameters: BTreeMap::new(),
        };
        assert!(!descriptor.is_well_formed());
        let partial = PartialDescriptor::from(descriptor);
        assert_eq!(partial.key.as_deref(), Some("k"));
        assert!(partial.display_name.is_none());
        assert!(partial.description.is_none());
    }

    #[test]
    fn test_projection_builder() {
        let projection = Projection::new()
            .with("x_predicted_tag", "ENGAGEMENT")
            .with("x_confidence", 0.72);
        assert_eq!(projection.len(), 2);
        assert_eq!(
            projection.get("x_predicted_tag"),
            Some(&serde_json::json!("ENGAGEMENT"))
        );
    }
}
