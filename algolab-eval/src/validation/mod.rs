//! Validation Harness
//!
//! Runs one registered algorithm over a random subset of the gold
//! standard, normalizes every result into a [`ValidationRecord`], computes
//! level-1 metrics and error clusters, and optionally writes the
//! projections back to the corpus.
//!
//! # Flow
//! 1. Fetch corpus pairs and project them into samples
//! 2. Keep the samples relevant to the algorithm's target
//! 3. Draw `sample_size` of them at random
//! 4. For each sample (until cancelled): build input, run, normalize
//! 5. Write back, then compute metrics on whatever was processed
//!
//! Per-sample failures never abort a run: they become fallback results
//! flagged `computation_status = error`.

pub mod errors;
pub mod sampling;
pub mod stats;
pub mod writeback;

pub use errors::{analyze_errors, ErrorAnalysis, ErrorCluster};
pub use stats::{
    cohen_kappa, compute_metrics, ClassMetrics, ConfusionMatrix, ContinuousSummary,
    ValidationMetrics, OTHER_LABEL,
};
pub use writeback::{write_back, WriteBackConfig, WriteBackReport, BATCH_SIZE, MAX_RETRIES};

use crate::corpus::{project_samples, samples_for_target, CorpusStore, PairFilter};
use crate::labels::UNRECOGNIZED_LABEL;
use crate::normalizer::{normalize, ValidationRecord};
use crate::registry::AlgorithmRegistry;
use crate::types::{
    AdvisorDetails, Algorithm, AlgorithmError, AlignmentDetails, ClientDetails, ComputationStatus,
    DensityDetails, ExecutionResult, LoadDetails, Projection, ResultDetails, Sample, SampleKind,
    Target,
};
use algolab_common::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Smoke sentences for [`ValidationHarness::quick_test`]
pub const QUICK_TEST_SENTENCES: [&str; 4] = [
    "je vais vérifier votre dossier",
    "vous devez nous envoyer le document",
    "notre système fonctionne ainsi",
    "d'accord je comprends",
];

/// Client reply paired with each smoke sentence for alignment metrics
const QUICK_TEST_REPLY: &str = "d'accord, merci";

/// Outcome of one harness invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRun {
    pub algorithm_key: String,
    pub algorithm_version: String,
    pub target: Target,
    pub records: Vec<ValidationRecord>,
    pub metrics: ValidationMetrics,
    pub errors: ErrorAnalysis,
    pub write_back: Option<WriteBackReport>,
    /// Stopped before every sample was processed
    pub cancelled: bool,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl ValidationRun {
    /// Run that processed nothing (comparative mode placeholder)
    pub fn empty(algorithm_key: &str, target: Target) -> Self {
        Self {
            algorithm_key: algorithm_key.to_string(),
            algorithm_version: String::new(),
            target,
            records: Vec::new(),
            metrics: ValidationMetrics::default(),
            errors: ErrorAnalysis::default(),
            write_back: None,
            cancelled: false,
            duration_ms: 0,
            started_at: Utc::now(),
        }
    }

    pub fn sample_size(&self) -> usize {
        self.records.len()
    }

    /// Pair ids of incorrect records
    pub fn error_pair_ids(&self) -> Vec<i64> {
        self.records
            .iter()
            .filter(|r| !r.correct)
            .filter_map(|r| r.pair_id)
            .collect()
    }
}

/// Harness behavior switches
#[derive(Debug, Clone)]
pub struct HarnessOptions {
    pub write_back: bool,
    pub write_back_config: WriteBackConfig,
    /// Seed for reproducible sampling; random when `None`
    pub seed: Option<u64>,
    pub filter: PairFilter,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            write_back: true,
            write_back_config: WriteBackConfig::default(),
            seed: None,
            filter: PairFilter::all(),
        }
    }
}

/// Result used when an algorithm fails on a sample
pub fn fallback_result(target: Target, version: &str, err: &AlgorithmError) -> ExecutionResult {
    let (prediction, details) = match target {
        Target::X => (UNRECOGNIZED_LABEL, ResultDetails::Advisor(AdvisorDetails::default())),
        Target::Y => (UNRECOGNIZED_LABEL, ResultDetails::Client(ClientDetails::default())),
        Target::M1 => ("0", ResultDetails::Density(DensityDetails::default())),
        Target::M2 => ("0", ResultDetails::Alignment(AlignmentDetails::default())),
        Target::M3 => ("0", ResultDetails::Load(LoadDetails::default())),
    };

    ExecutionResult::new(prediction, 0.0, details)
        .with_version(version)
        .with_projection(
            Projection::new().with("computation_status", ComputationStatus::Error.as_str()),
        )
        .with_fallback(format!("algorithm_error: {}", err))
}

pub struct ValidationHarness {
    registry: Arc<AlgorithmRegistry>,
    store: Arc<dyn CorpusStore>,
    options: HarnessOptions,
}

impl ValidationHarness {
    pub fn new(registry: Arc<AlgorithmRegistry>, store: Arc<dyn CorpusStore>) -> Self {
        Self::with_options(registry, store, HarnessOptions::default())
    }

    pub fn with_options(
        registry: Arc<AlgorithmRegistry>,
        store: Arc<dyn CorpusStore>,
        options: HarnessOptions,
    ) -> Self {
        Self {
            registry,
            store,
            options,
        }
    }

    pub fn registry(&self) -> &Arc<AlgorithmRegistry> {
        &self.registry
    }

    async fn load_samples(&self) -> Result<Vec<Sample>> {
        let pairs = self.store.fetch_pairs(&self.options.filter).await?;
        Ok(project_samples(&pairs))
    }

    /// Samples available per target in the current corpus
    pub async fn available_sample_counts(&self) -> Result<BTreeMap<Target, usize>> {
        let samples = self.load_samples().await?;
        Ok(Target::ALL
            .iter()
            .map(|target| (*target, samples_for_target(&samples, *target).len()))
            .collect())
    }

    /// Validate `key` on up to `sample_size` gold samples
    ///
    /// # Errors
    /// `NotFound` for an unknown key, `InvalidInput` when the corpus holds
    /// no sample for the algorithm's target, or a corpus read failure.
    pub async fn validate(
        &self,
        key: &str,
        sample_size: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<ValidationRun> {
        let algorithm = self
            .registry
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("Algorithm '{}'", key)))?;
        let descriptor = algorithm.descriptor().clone();
        let target = descriptor.target;

        if !algorithm.validate_config() {
            warn!(algorithm = key, "Configuration invalid, results will be fallbacks");
        }

        let samples = samples_for_target(&self.load_samples().await?, target);
        if samples.is_empty() {
            return Err(Error::InvalidInput(format!(
                "No gold-standard samples for target {}",
                target
            )));
        }

        let selected = match self.options.seed {
            Some(seed) => sampling::seeded_sample(&samples, sample_size, seed),
            None => sampling::random_sample(&samples, sample_size, &mut rand::thread_rng()),
        };

        info!(
            algorithm = key,
            version = %descriptor.version,
            target = %target,
            samples = selected.len(),
            available = samples.len(),
            "Validation started"
        );

        let started_at = Utc::now();
        let start = Instant::now();
        let mut records = Vec::with_capacity(selected.len());
        let mut cancelled = false;

        for sample in &selected {
            if cancel.is_cancelled() {
                cancelled = true;
                warn!(algorithm = key, processed = records.len(), "Validation cancelled");
                break;
            }

            let input = algorithm.build_input(sample);
            let result = match algorithm.run(&input).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        algorithm = key,
                        pair_id = ?sample.metadata.pair_id,
                        error = %e,
                        "Run failed, using fallback"
                    );
                    fallback_result(target, &descriptor.version, &e)
                }
            };
            records.push(normalize(&result, sample, target));
        }

        let write_back = if self.options.write_back {
            Some(write_back(self.store.as_ref(), &records, &self.options.write_back_config).await)
        } else {
            None
        };

        let metrics = compute_metrics(&records);
        let errors = analyze_errors(&records);
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            algorithm = key,
            accuracy = metrics.accuracy,
            kappa = metrics.kappa,
            processed = records.len(),
            cancelled,
            duration_ms,
            "Validation finished"
        );

        Ok(ValidationRun {
            algorithm_key: key.to_string(),
            algorithm_version: descriptor.version,
            target,
            records,
            metrics,
            errors,
            write_back,
            cancelled,
            duration_ms,
            started_at,
        })
    }

    /// Validate several algorithms, one run per key in order
    ///
    /// A failing key yields an empty run so the others still report.
    pub async fn compare(
        &self,
        keys: &[String],
        sample_size: Option<usize>,
        cancel: &CancellationToken,
    ) -> Vec<ValidationRun> {
        let mut runs = Vec::with_capacity(keys.len());
        for key in keys {
            match self.validate(key, sample_size, cancel).await {
                Ok(run) => runs.push(run),
                Err(e) => {
                    error!(algorithm = %key, error = %e, "Comparison run failed");
                    let target = self
                        .registry
                        .descriptor(key)
                        .map_or(Target::X, |d| d.target);
                    runs.push(ValidationRun::empty(key, target));
                }
            }
        }
        runs
    }

    /// Run the algorithm on the four smoke sentences (no corpus involved)
    pub async fn quick_test(&self, key: &str) -> Result<Vec<ExecutionResult>> {
        let algorithm = self
            .registry
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("Algorithm '{}'", key)))?;
        let target = algorithm.descriptor().target;
        let version = algorithm.descriptor().version.clone();

        let mut results = Vec::with_capacity(QUICK_TEST_SENTENCES.len());
        for sentence in QUICK_TEST_SENTENCES {
            let sample = quick_sample(target, sentence);
            let input = algorithm.build_input(&sample);
            let result = match algorithm.run(&input).await {
                Ok(result) => result,
                Err(e) => fallback_result(target, &version, &e),
            };
            results.push(result);
        }
        Ok(results)
    }
}

fn quick_sample(target: Target, sentence: &str) -> Sample {
    match target {
        Target::X | Target::M1 => Sample::adhoc(sentence, "", SampleKind::Advisor),
        Target::Y | Target::M3 => Sample::adhoc(sentence, "", SampleKind::Client),
        Target::M2 => {
            let mut sample = Sample::adhoc(sentence, "", SampleKind::Pair);
            sample.metadata.t0 = Some(sentence.to_string());
            sample.metadata.t1 = Some(QUICK_TEST_REPLY.to_string());
            sample
        }
    }
}
