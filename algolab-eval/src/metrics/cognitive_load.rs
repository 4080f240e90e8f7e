//! M3: cognitive-load proxy from pauses and hesitations in the client turn

use crate::classifiers::compile_patterns;
use crate::types::{
    Algorithm, AlgorithmDescriptor, AlgorithmError, AlgorithmInput, AlgorithmKind,
    ComputationStatus, ExecutionResult, LoadDetails, Projection, ResultDetails, Target,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::time::Instant;

use super::text::word_count;

pub const KEY: &str = "m3-pauses";
const VERSION: &str = "1.0.0";
const CONFIDENCE: f64 = 0.7;

static MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_patterns(
        "m3-markers",
        &[
            r"(?i)\b(euh+|heu+|hum+|mmm+|hem+|ben|bah|hein)\b",
            r"\.{3}|…",
            r"(?i)\((pause|silence)\)",
        ],
    )
});

/// Marker counts and the resulting score
#[derive(Debug, Clone, PartialEq)]
pub struct LoadAnalysis {
    pub score: f64,
    pub word_count: usize,
    pub hesitations: Vec<String>,
    pub ellipses: Vec<String>,
    pub explicit_pauses: Vec<String>,
}

impl LoadAnalysis {
    pub fn pause_count(&self) -> usize {
        self.ellipses.len() + self.explicit_pauses.len()
    }

    /// `kind:text` for every marker, hesitations first
    pub fn markers(&self) -> Vec<String> {
        let hesitations = self.hesitations.iter().map(|h| format!("hesitation:{}", h));
        let pauses = self
            .ellipses
            .iter()
            .chain(&self.explicit_pauses)
            .map(|p| format!("pause:{}", p));
        hesitations.chain(pauses).collect()
    }
}

fn find_all(idx: usize, text: &str) -> Vec<String> {
    MARKERS
        .get(idx)
        .map(|re| re.find_iter(text).map(|m| m.as_str().to_string()).collect())
        .unwrap_or_default()
}

pub fn analyze(segment: &str) -> LoadAnalysis {
    let text = segment.trim();
    let words = word_count(text);
    let hesitations = find_all(0, text);
    let ellipses = find_all(1, text);
    let explicit_pauses = find_all(2, text);

    let hesitation_rate = if words > 0 {
        hesitations.len() as f64 / words as f64
    } else {
        0.0
    };
    let pause_rate = ((ellipses.len() + explicit_pauses.len()) as f64 / 5.0).min(1.0);
    let length_penalty = ((text.chars().count() as f64 - 140.0) / 400.0).clamp(0.0, 1.0);

    let score = (0.6 * hesitation_rate + 0.3 * pause_rate + 0.1 * length_penalty).clamp(0.0, 1.0);

    LoadAnalysis {
        score,
        word_count: words,
        hesitations,
        ellipses,
        explicit_pauses,
    }
}

#[derive(Default)]
pub struct PauseLoadCalculator;

impl PauseLoadCalculator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Algorithm for PauseLoadCalculator {
    fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError> {
        Ok(AlgorithmDescriptor {
            key: KEY.to_string(),
            display_name: "M3 - Pauses and hesitations".to_string(),
            version: VERSION.to_string(),
            kind: AlgorithmKind::Metric,
            target: Target::M3,
            batch_supported: true,
            requires_context: false,
            description: "Cognitive-load proxy from hesitations, ellipses and explicit pause markers"
                .to_string(),
            parameters: BTreeMap::new(),
        })
    }

    async fn run(&self, input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError> {
        let start = Instant::now();
        let analysis = analyze(input.primary_text());
        let markers = analysis.markers();

        let projection = Projection::new()
            .with("m3_cognitive_score", analysis.score)
            .with("m3_hesitation_count", analysis.hesitations.len())
            .with("m3_pause_count", analysis.pause_count())
            .with("m3_markers", serde_json::json!(markers))
            .with("computation_status", ComputationStatus::Complete.as_str());

        let details = LoadDetails {
            value: analysis.score,
            hesitation_count: analysis.hesitations.len(),
            pause_count: analysis.pause_count(),
            ellipsis_count: analysis.ellipses.len(),
            word_count: analysis.word_count,
            markers,
        };

        Ok(ExecutionResult::new(
            format!("{:.3}", analysis.score),
            CONFIDENCE,
            ResultDetails::Load(details),
        )
        .with_version(VERSION)
        .with_projection(projection)
        .with_processing_time(start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_compile() {
        assert_eq!(MARKERS.len(), 3);
    }

    #[test]
    fn test_hesitations_and_ellipses() {
        let analysis = analyze("euh... je pense que... hum... c'est compliqué");
        assert_eq!(analysis.word_count, 7);
        assert_eq!(analysis.hesitations, vec!["euh", "hum"]);
        assert_eq!(analysis.pause_count(), 3);
        let expected = 0.6 * (2.0 / 7.0) + 0.3 * 0.6;
        assert!((analysis.score - expected).abs() < 1e-9);
        assert_eq!(analysis.markers()[0], "hesitation:euh");
    }

    #[test]
    fn test_explicit_pauses_and_length_penalty() {
        let long = format!("(pause) {} (silence)", "mot ".repeat(100));
        let analysis = analyze(&long);
        assert_eq!(analysis.explicit_pauses.len(), 2);
        assert!(analysis.score > 0.3 * 0.4);
    }

    #[tokio::test]
    async fn test_run_empty_is_zero() {
        let result = PauseLoadCalculator::new().run(&AlgorithmInput::text("")).await.unwrap();
        assert_eq!(result.prediction, "0.000");
        assert_eq!(result.confidence, 0.7);
        assert_eq!(result.projection.get("m3_pause_count"), Some(&serde_json::json!(0)));
    }

    #[tokio::test]
    async fn test_run_three_decimals() {
        let result = PauseLoadCalculator::new()
            .run(&AlgorithmInput::text("euh... je pense que... hum... c'est compliqué"))
            .await
            .unwrap();
        assert_eq!(result.prediction, "0.351");
    }
}
