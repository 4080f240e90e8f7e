//! Metric calculators
//!
//! - M1: action-verb density of the advisor turn
//! - M2: advisor → client alignment (lexical, semantic, composite, multi-dimension)
//! - M3: pause and hesitation load of the client turn
//!
//! Every calculator returns a defined zero or neutral result on empty input.

pub mod action_verbs;
pub mod cognitive_load;
pub mod composite;
pub mod lexical_alignment;
pub mod multi_dimension;
pub mod semantic_alignment;
pub mod text;

pub use action_verbs::{ActionVerbConfig, ActionVerbCounter};
pub use cognitive_load::PauseLoadCalculator;
pub use composite::{CompositeAlignment, CompositeConfig};
pub use lexical_alignment::LexicalAlignment;
pub use multi_dimension::{DimensionWeights, MultiDimensionAlignment};
pub use semantic_alignment::{SemanticAlignment, SemanticConfig};

use crate::types::{AlgorithmError, AlgorithmInput, ComputationStatus, Projection};

pub const ALIGNMENT_STRONG: &str = "ALIGNEMENT_FORT";
pub const ALIGNMENT_WEAK: &str = "ALIGNEMENT_FAIBLE";
pub const MISALIGNMENT: &str = "DESALIGNEMENT";

/// Score thresholds for the three alignment bands
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentBands {
    /// At or above: `ALIGNEMENT_FORT`
    pub strong: f64,
    /// At or above: `ALIGNEMENT_FAIBLE`
    pub partial: f64,
}

impl AlignmentBands {
    pub const fn new(strong: f64, partial: f64) -> Self {
        Self { strong, partial }
    }

    pub fn classify(&self, score: f64) -> &'static str {
        if score >= self.strong {
            ALIGNMENT_STRONG
        } else if score >= self.partial {
            ALIGNMENT_WEAK
        } else {
            MISALIGNMENT
        }
    }

    pub fn is_valid(&self) -> bool {
        self.partial >= 0.0 && self.strong > self.partial && self.strong <= 1.0
    }
}

/// Advisor and client turns of an M2 input
pub(crate) fn pair_turns(input: &AlgorithmInput) -> Result<(&str, &str), AlgorithmError> {
    match input {
        AlgorithmInput::Pair { t0, t1 } => Ok((t0, t1)),
        _ => Err(AlgorithmError::InvalidInput(
            "alignment calculators need an advisor/client turn pair".to_string(),
        )),
    }
}

/// Summary columns shared by the M2 calculators
pub(crate) fn alignment_projection(
    value: f64,
    lexical: Option<f64>,
    semantic: Option<f64>,
) -> Projection {
    let mut projection = Projection::new().with("m2_global_alignment", value);
    if let Some(lexical) = lexical {
        projection.insert("m2_lexical_alignment", lexical);
    }
    if let Some(semantic) = semantic {
        projection.insert("m2_semantic_alignment", semantic);
    }
    projection.insert("computation_status", ComputationStatus::Complete.as_str());
    projection
}
