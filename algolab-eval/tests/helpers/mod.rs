//! Test Helper Utilities
//!
//! Shared fixtures for the algolab-eval integration tests

#![allow(dead_code)]

pub mod db_utils;

pub use db_utils::{create_test_db, seed_corpus, table_columns};

use algolab_eval::classifiers::label_projection;
use algolab_eval::types::{
    AdvisorDetails, Algorithm, AlgorithmDescriptor, AlgorithmError, AlgorithmInput,
    AlgorithmKind, ComputationStatus, ExecutionResult, ResultDetails, Target,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Classifier that always answers `prediction` (or always fails)
pub struct FixedClassifier {
    pub prediction: String,
    pub version: String,
    pub fail: bool,
}

impl FixedClassifier {
    pub fn new(prediction: &str, version: &str) -> Self {
        Self {
            prediction: prediction.to_string(),
            version: version.to_string(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("", "0.1.0")
        }
    }
}

#[async_trait]
impl Algorithm for FixedClassifier {
    fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError> {
        Ok(AlgorithmDescriptor {
            key: "fixed-x".to_string(),
            display_name: "Fixed advisor label".to_string(),
            version: self.version.clone(),
            kind: AlgorithmKind::Classifier,
            target: Target::X,
            batch_supported: false,
            requires_context: false,
            description: String::new(),
            parameters: BTreeMap::new(),
        })
    }

    async fn run(&self, _input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError> {
        if self.fail {
            return Err(AlgorithmError::Api("upstream 503".to_string()));
        }
        Ok(ExecutionResult::new(
            self.prediction.clone(),
            0.9,
            ResultDetails::Advisor(AdvisorDetails::default()),
        )
        .with_projection(label_projection(
            Target::X,
            "fixed-x",
            &self.version,
            &self.prediction,
            0.9,
            ComputationStatus::Complete,
        )))
    }
}
