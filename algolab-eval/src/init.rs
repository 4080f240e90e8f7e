//! Startup wiring: transports and the default registry

use crate::classifiers::llm::{
    DirectTransport, LlmClassifierConfig, LlmTransport, ProxyTransport, TransportError,
};
use crate::classifiers::{
    CharterClientClassifier, DictionaryClientClassifier, LlmClassifier, LlmProfile,
    RegexAdvisorClassifier,
};
use crate::metrics::{
    ActionVerbCounter, CompositeAlignment, LexicalAlignment, MultiDimensionAlignment,
    PauseLoadCalculator, SemanticAlignment,
};
use crate::registry::AlgorithmRegistry;
use crate::types::Algorithm;
use algolab_common::config::LlmConfig;
use algolab_common::{Error, Result};
use std::sync::Arc;
use tracing::info;

/// How model classifiers reach the language model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Call the chat-completions API with a local key
    Direct,
    /// Delegate to the classification proxy endpoint
    Proxy,
}

/// Build the transport for `mode`
///
/// The proxy mode ignores `api_key`; the key stays on the proxy host.
pub fn build_transport(
    config: &LlmConfig,
    api_key: Option<String>,
    mode: TransportMode,
) -> Result<Arc<dyn LlmTransport>> {
    let transport: Arc<dyn LlmTransport> = match mode {
        TransportMode::Direct => Arc::new(
            DirectTransport::new(&config.base_url, api_key).map_err(transport_config_error)?,
        ),
        TransportMode::Proxy => {
            Arc::new(ProxyTransport::new(&config.proxy_url).map_err(transport_config_error)?)
        }
    };
    Ok(transport)
}

fn transport_config_error(e: TransportError) -> Error {
    Error::Config(format!("Failed to build LLM transport: {}", e))
}

/// Register every built-in algorithm
///
/// Model classifiers share `transport` and use `model` unless their
/// profile pins one.
pub fn build_default_registry(transport: Arc<dyn LlmTransport>, model: &str) -> AlgorithmRegistry {
    let mut registry = AlgorithmRegistry::new();

    let rule_based: Vec<(&str, Arc<dyn Algorithm>)> = vec![
        (crate::classifiers::advisor_rules::KEY, Arc::new(RegexAdvisorClassifier::new())),
        (crate::classifiers::client_dictionary::KEY, Arc::new(DictionaryClientClassifier::new())),
        (crate::classifiers::client_charter::KEY, Arc::new(CharterClientClassifier::new())),
        (crate::metrics::action_verbs::KEY, Arc::new(ActionVerbCounter::new())),
        (crate::metrics::lexical_alignment::KEY, Arc::new(LexicalAlignment::new())),
        (crate::metrics::semantic_alignment::KEY, Arc::new(SemanticAlignment::new())),
        (crate::metrics::composite::KEY, Arc::new(CompositeAlignment::new())),
        (crate::metrics::multi_dimension::KEY, Arc::new(MultiDimensionAlignment::new())),
        (crate::metrics::cognitive_load::KEY, Arc::new(PauseLoadCalculator::new())),
    ];
    for (key, algorithm) in rule_based {
        registry.register(key, algorithm, None);
    }

    for profile in [LlmProfile::Single, LlmProfile::Contextual] {
        let mut config = LlmClassifierConfig::for_profile(profile);
        if !model.trim().is_empty() {
            config.model = model.to_string();
        }
        registry.register(
            profile.key(),
            Arc::new(LlmClassifier::with_config(profile, config, Arc::clone(&transport))),
            None,
        );
    }

    info!(
        algorithms = registry.len(),
        transport = transport.name(),
        "Algorithm registry built"
    );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::llm::transport::mock::MockTransport;
    use crate::types::Target;

    #[test]
    fn test_default_registry_covers_every_target() {
        let registry = build_default_registry(Arc::new(MockTransport::new("ENGAGEMENT")), "");
        assert_eq!(registry.len(), 11);
        for target in Target::ALL {
            assert!(
                !registry.for_target(target).is_empty(),
                "no algorithm for {}",
                target
            );
        }
        assert!(registry.validate_all().iter().all(|(_, ok)| *ok));
    }

    #[test]
    fn test_direct_transport_without_key() {
        let transport = build_transport(&LlmConfig::default(), None, TransportMode::Direct).unwrap();
        assert_eq!(transport.name(), "direct");
        assert!(!transport.has_credentials());

        let proxy = build_transport(&LlmConfig::default(), None, TransportMode::Proxy).unwrap();
        assert!(proxy.has_credentials());
    }
}
