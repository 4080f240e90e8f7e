//! Algorithm Registry
//!
//! Catalog of algorithms keyed by name. Every algorithm is wrapped at
//! registration in a [`DescribedAlgorithm`], which calls `describe()` once
//! and repairs or synthesizes the descriptor when the plugin misbehaves
//! (error, panic, blank fields). Callers of `list()` and `get()` therefore
//! always see a well-formed descriptor, and one bad plugin never prevents
//! enumeration or use of the others.
//!
//! The registry is an explicit instance, built once at startup (see
//! [`crate::init::build_default_registry`]) and shared read-only as
//! `Arc<AlgorithmRegistry>`.

use crate::types::{
    Algorithm, AlgorithmDescriptor, AlgorithmError, AlgorithmInput, ExecutionResult,
    PartialDescriptor, Sample, Target,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Version assumed when nothing usable is reported
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Adapter guaranteeing a well-formed descriptor
pub struct DescribedAlgorithm {
    inner: Arc<dyn Algorithm>,
    descriptor: AlgorithmDescriptor,
    repaired: bool,
}

impl DescribedAlgorithm {
    /// Wrap an algorithm, repairing its descriptor if needed
    pub fn wrap(key: &str, inner: Arc<dyn Algorithm>, overrides: PartialDescriptor) -> Self {
        let described = catch_unwind(AssertUnwindSafe(|| inner.describe()));

        let (reported, repaired) = match described {
            Ok(Ok(descriptor)) if descriptor.is_well_formed() => {
                (PartialDescriptor::from(descriptor), false)
            }
            Ok(Ok(descriptor)) => {
                warn!(algorithm = key, "describe() returned a partial descriptor, repairing");
                let mut partial = PartialDescriptor::from(descriptor);
                fill_gaps(&mut partial, inner.legacy_metadata());
                (partial, true)
            }
            Ok(Err(e)) => {
                warn!(algorithm = key, error = %e, "describe() failed, synthesizing descriptor");
                (inner.legacy_metadata(), true)
            }
            Err(_) => {
                warn!(algorithm = key, "describe() panicked, synthesizing descriptor");
                (inner.legacy_metadata(), true)
            }
        };

        let descriptor = synthesize(key, reported, overrides);
        debug!(
            algorithm = key,
            target = %descriptor.target,
            version = %descriptor.version,
            repaired,
            "Algorithm described"
        );

        Self {
            inner,
            descriptor,
            repaired,
        }
    }

    pub fn descriptor(&self) -> &AlgorithmDescriptor {
        &self.descriptor
    }

    /// True when the descriptor had to be repaired or synthesized
    pub fn was_repaired(&self) -> bool {
        self.repaired
    }
}

#[async_trait]
impl Algorithm for DescribedAlgorithm {
    fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError> {
        Ok(self.descriptor.clone())
    }

    fn validate_config(&self) -> bool {
        catch_unwind(AssertUnwindSafe(|| self.inner.validate_config())).unwrap_or(false)
    }

    fn build_input(&self, sample: &Sample) -> AlgorithmInput {
        self.inner.build_input(sample)
    }

    async fn run(&self, input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError> {
        let mut result = self.inner.run(input).await?;
        if result.algorithm_version.is_empty() {
            result.algorithm_version = self.descriptor.version.clone();
        }
        Ok(result)
    }

    async fn batch_run(
        &self,
        inputs: &[AlgorithmInput],
    ) -> Vec<Result<ExecutionResult, AlgorithmError>> {
        let version = &self.descriptor.version;
        self.inner
            .batch_run(inputs)
            .await
            .into_iter()
            .map(|r| {
                r.map(|mut result| {
                    if result.algorithm_version.is_empty() {
                        result.algorithm_version = version.clone();
                    }
                    result
                })
            })
            .collect()
    }
}

/// Copy fields from `fallback` into the gaps of `partial`
fn fill_gaps(partial: &mut PartialDescriptor, fallback: PartialDescriptor) {
    partial.key = partial.key.take().or(fallback.key);
    partial.display_name = partial.display_name.take().or(fallback.display_name);
    partial.version = partial.version.take().or(fallback.version);
    partial.kind = partial.kind.or(fallback.kind);
    partial.target = partial.target.or(fallback.target);
    partial.batch_supported = partial.batch_supported.or(fallback.batch_supported);
    partial.requires_context = partial.requires_context.or(fallback.requires_context);
    partial.description = partial.description.take().or(fallback.description);
    partial.parameters = partial.parameters.take().or(fallback.parameters);
}

/// Build a well-formed descriptor from reported fields and overrides
///
/// The registry key always wins over any reported key.
fn synthesize(
    key: &str,
    reported: PartialDescriptor,
    overrides: PartialDescriptor,
) -> AlgorithmDescriptor {
    let mut merged = overrides;
    fill_gaps(&mut merged, reported);

    let display_name = merged
        .display_name
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| key.to_string());
    let description = merged.description.unwrap_or_default();
    let target = merged
        .target
        .unwrap_or_else(|| infer_target(&format!("{} {} {}", key, display_name, description)));

    AlgorithmDescriptor {
        key: key.to_string(),
        display_name,
        version: merged
            .version
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
        kind: merged.kind.unwrap_or_else(|| target.default_kind()),
        target,
        batch_supported: merged.batch_supported.unwrap_or(false),
        requires_context: merged.requires_context.unwrap_or(false),
        description,
        parameters: merged.parameters.unwrap_or_default(),
    }
}

/// Infer the target variable from free text (key, name, description)
///
/// Metric tokens are checked first, then client cues, defaulting to X.
pub fn infer_target(text: &str) -> Target {
    let lowered = text.to_lowercase();
    if lowered.contains("m2") {
        return Target::M2;
    }
    if lowered.contains("m1") {
        return Target::M1;
    }
    if lowered.contains("m3") {
        return Target::M3;
    }

    let has_token = |token: &str| {
        lowered
            .split(|c: char| !c.is_alphanumeric())
            .any(|t| t == token)
    };
    let client_cues = ["client", "dictionary", "charter", "regexy"];
    if has_token("y") || client_cues.iter().any(|cue| lowered.contains(cue)) {
        return Target::Y;
    }

    Target::X
}

/// Explicit registry instance
#[derive(Default)]
pub struct AlgorithmRegistry {
    entries: BTreeMap<String, Arc<DescribedAlgorithm>>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an algorithm under `key`, returning its repaired descriptor
    ///
    /// Re-registering a key replaces the previous entry.
    pub fn register(
        &mut self,
        key: &str,
        algorithm: Arc<dyn Algorithm>,
        overrides: Option<PartialDescriptor>,
    ) -> AlgorithmDescriptor {
        let wrapped = DescribedAlgorithm::wrap(key, algorithm, overrides.unwrap_or_default());
        let descriptor = wrapped.descriptor().clone();

        if self.entries.insert(key.to_string(), Arc::new(wrapped)).is_some() {
            warn!(algorithm = key, "Algorithm re-registered, previous entry replaced");
        }

        descriptor
    }

    /// Look up an algorithm (logged miss)
    pub fn get(&self, key: &str) -> Option<Arc<DescribedAlgorithm>> {
        let entry = self.entries.get(key).cloned();
        if entry.is_none() {
            warn!(algorithm = key, "Algorithm not found in registry");
        }
        entry
    }

    pub fn descriptor(&self, key: &str) -> Option<AlgorithmDescriptor> {
        self.entries.get(key).map(|e| e.descriptor().clone())
    }

    /// Every registered descriptor, sorted by key
    pub fn list(&self) -> Vec<AlgorithmDescriptor> {
        self.entries.values().map(|e| e.descriptor().clone()).collect()
    }

    /// Descriptors of algorithms targeting `target`
    pub fn for_target(&self, target: Target) -> Vec<AlgorithmDescriptor> {
        self.entries
            .values()
            .filter(|e| e.descriptor().target == target)
            .map(|e| e.descriptor().clone())
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn unregister(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(key, validate_config())` for every entry
    pub fn validate_all(&self) -> Vec<(String, bool)> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.validate_config()))
            .collect()
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::types::{AdvisorDetails, AlgorithmKind, ResultDetails};

    /// How the mock answers `describe()`
    pub enum DescribeBehavior {
        WellFormed,
        Partial,
        Fails,
        Panics,
    }

    /// Mock algorithm for registry and harness tests
    pub struct MockAlgorithm {
        pub target: Target,
        pub prediction: String,
        pub describe: DescribeBehavior,
        pub should_fail: bool,
        pub legacy: PartialDescriptor,
    }

    impl MockAlgorithm {
        pub fn new(target: Target, prediction: &str) -> Self {
            Self {
                target,
                prediction: prediction.to_string(),
                describe: DescribeBehavior::WellFormed,
                should_fail: false,
                legacy: PartialDescriptor::default(),
            }
        }

        pub fn failing(target: Target) -> Self {
            Self {
                should_fail: true,
                ..Self::new(target, "")
            }
        }

        pub fn with_describe(mut self, behavior: DescribeBehavior) -> Self {
            self.describe = behavior;
            self
        }

        pub fn with_legacy(mut self, legacy: PartialDescriptor) -> Self {
            self.legacy = legacy;
            self
        }
    }

    #[async_trait]
    impl Algorithm for MockAlgorithm {
        fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError> {
            let full = AlgorithmDescriptor {
                key: "mock".to_string(),
                display_name: "Mock algorithm".to_string(),
                version: "0.9.0".to_string(),
                kind: AlgorithmKind::Classifier,
                target: self.target,
                batch_supported: false,
                requires_context: false,
                description: String::new(),
                parameters: BTreeMap::new(),
            };
            match self.describe {
                DescribeBehavior::WellFormed => Ok(full),
                DescribeBehavior::Partial => Ok(AlgorithmDescriptor {
                    display_name: String::new(),
                    version: String::new(),
                    ..full
                }),
                DescribeBehavior::Fails => Err(AlgorithmError::Internal("no metadata".to_string())),
                DescribeBehavior::Panics => panic!("describe exploded"),
            }
        }

        fn legacy_metadata(&self) -> PartialDescriptor {
            self.legacy.clone()
        }

        async fn run(&self, _input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError> {
            if self.should_fail {
                return Err(AlgorithmError::Internal("Mock failure".to_string()));
            }
            Ok(ExecutionResult::new(
                self.prediction.clone(),
                0.8,
                ResultDetails::Advisor(AdvisorDetails::default()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{DescribeBehavior, MockAlgorithm};
    use super::*;

    #[test]
    fn test_well_formed_descriptor_keeps_fields_but_takes_registry_key() {
        let mut registry = AlgorithmRegistry::new();
        let descriptor = registry.register(
            "regex-x",
            Arc::new(MockAlgorithm::new(Target::X, "ENGAGEMENT")),
            None,
        );
        assert_eq!(descriptor.key, "regex-x");
        assert_eq!(descriptor.display_name, "Mock algorithm");
        assert_eq!(descriptor.version, "0.9.0");
        assert!(!registry.get("regex-x").unwrap().was_repaired());
    }

    #[test]
    fn test_failing_describe_is_synthesized_from_key() {
        let mut registry = AlgorithmRegistry::new();
        let descriptor = registry.register(
            "m2-lexical",
            Arc::new(MockAlgorithm::new(Target::X, "").with_describe(DescribeBehavior::Fails)),
            None,
        );
        assert_eq!(descriptor.target, Target::M2);
        assert_eq!(descriptor.kind, crate::types::AlgorithmKind::Metric);
        assert_eq!(descriptor.version, DEFAULT_VERSION);
        assert_eq!(descriptor.display_name, "m2-lexical");
        assert!(!descriptor.batch_supported);
    }

    #[test]
    fn test_panicking_describe_does_not_break_enumeration() {
        let mut registry = AlgorithmRegistry::new();
        registry.register(
            "dictionary-client",
            Arc::new(MockAlgorithm::new(Target::Y, "").with_describe(DescribeBehavior::Panics)),
            None,
        );
        registry.register("regex-x", Arc::new(MockAlgorithm::new(Target::X, "")), None);

        let list = registry.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].key, "dictionary-client");
        assert_eq!(list[0].target, Target::Y);
        assert!(list.iter().all(|d| d.is_well_formed()));
    }

    #[test]
    fn test_partial_descriptor_preserves_legacy_fields() {
        let legacy = PartialDescriptor {
            display_name: Some("Legacy name".to_string()),
            version: Some("2.1.0".to_string()),
            ..Default::default()
        };
        let mut registry = AlgorithmRegistry::new();
        let descriptor = registry.register(
            "old-plugin",
            Arc::new(
                MockAlgorithm::new(Target::Y, "")
                    .with_describe(DescribeBehavior::Partial)
                    .with_legacy(legacy),
            ),
            None,
        );
        assert_eq!(descriptor.display_name, "Legacy name");
        assert_eq!(descriptor.version, "2.1.0");
        assert_eq!(descriptor.target, Target::Y);
    }

    #[test]
    fn test_overrides_win() {
        let mut registry = AlgorithmRegistry::new();
        let descriptor = registry.register(
            "custom",
            Arc::new(MockAlgorithm::new(Target::X, "")),
            Some(PartialDescriptor {
                version: Some("3.0.0".to_string()),
                requires_context: Some(true),
                ..Default::default()
            }),
        );
        assert_eq!(descriptor.version, "3.0.0");
        assert!(descriptor.requires_context);
    }

    #[test]
    fn test_get_unknown_returns_none() {
        let registry = AlgorithmRegistry::new();
        assert!(registry.get("missing").is_none());
        assert!(registry.descriptor("missing").is_none());
    }

    #[test]
    fn test_unregister_and_clear() {
        let mut registry = AlgorithmRegistry::new();
        registry.register("a", Arc::new(MockAlgorithm::new(Target::X, "")), None);
        registry.register("b", Arc::new(MockAlgorithm::new(Target::X, "")), None);
        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert_eq!(registry.keys(), vec!["b".to_string()]);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_infer_target() {
        assert_eq!(infer_target("M1ActionVerbCounter"), Target::M1);
        assert_eq!(infer_target("pauses-m3"), Target::M3);
        assert_eq!(infer_target("RegexYClassifier"), Target::Y);
        assert_eq!(infer_target("charter y"), Target::Y);
        assert_eq!(infer_target("llm-advisor"), Target::X);
        assert_eq!(infer_target("something"), Target::X);
    }

    #[tokio::test]
    async fn test_wrapper_stamps_version_on_results() {
        let mut registry = AlgorithmRegistry::new();
        registry.register("x", Arc::new(MockAlgorithm::new(Target::X, "OUVERTURE")), None);
        let algo = registry.get("x").unwrap();
        let result = algo.run(&AlgorithmInput::text("bonjour")).await.unwrap();
        assert_eq!(result.algorithm_version, "0.9.0");
        assert_eq!(result.prediction, "OUVERTURE");
    }

    #[test]
    fn test_validate_all_and_for_target() {
        let mut registry = AlgorithmRegistry::new();
        registry.register("x", Arc::new(MockAlgorithm::new(Target::X, "")), None);
        registry.register("y", Arc::new(MockAlgorithm::new(Target::Y, "")), None);
        assert_eq!(registry.validate_all(), vec![("x".to_string(), true), ("y".to_string(), true)]);
        assert_eq!(registry.for_target(Target::Y).len(), 1);
    }
}
