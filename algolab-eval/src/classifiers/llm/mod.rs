//! Language-model advisor classifiers (X)
//!
//! Two profiles share one implementation:
//! - `Single`: the advisor turn alone
//! - `Contextual`: the advisor turn with the two preceding turns
//!
//! A call never fails outward. Missing credentials, timeouts, error
//! statuses, network errors and unparseable replies all produce a
//! fallback result labelled [`UNRECOGNIZED_LABEL`] with the reason
//! recorded in `fallback_reason`.

pub mod prompt;
pub mod transport;

pub use transport::{
    DirectTransport, LlmReply, LlmRequest, LlmTransport, ProxyRequest, ProxyResponse,
    ProxyTransport, TransportError,
};

use super::label_projection;
use crate::labels::{AdvisorTag, UNRECOGNIZED_LABEL};
use crate::types::{
    AdvisorDetails, Algorithm, AlgorithmDescriptor, AlgorithmError, AlgorithmInput,
    AlgorithmKind, ComputationStatus, ExecutionResult, ParameterSpec, ResultDetails, Sample,
    SampleKind, Target,
};
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const SINGLE_KEY: &str = "llm-x";
pub const CONTEXTUAL_KEY: &str = "llm-context-x";

/// Which prompt family the classifier uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProfile {
    Single,
    Contextual,
}

impl LlmProfile {
    pub fn key(&self) -> &'static str {
        match self {
            LlmProfile::Single => SINGLE_KEY,
            LlmProfile::Contextual => CONTEXTUAL_KEY,
        }
    }

    fn version(&self) -> &'static str {
        match self {
            LlmProfile::Single => "2.3.0",
            LlmProfile::Contextual => "1.0.0",
        }
    }
}

/// Per-classifier settings; the API key is held by the transport
#[derive(Debug, Clone, Serialize)]
pub struct LlmClassifierConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// When false, fallbacks carry confidence 0
    pub enable_fallback: bool,
    /// Request `{"label": ...}` structured output
    pub structured_output: bool,
    /// Confidence of a parsed label
    pub confidence: f64,
    /// Minimum spacing between remote calls
    #[serde(with = "duration_ms")]
    pub inter_call_delay: Duration,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Confidence of a fallback result when fallback is enabled
pub const FALLBACK_CONFIDENCE: f64 = 0.25;

impl LlmClassifierConfig {
    pub fn for_profile(profile: LlmProfile) -> Self {
        match profile {
            LlmProfile::Single => Self {
                model: "gpt-4o-mini".to_string(),
                temperature: 0.0,
                max_tokens: 16,
                timeout: Duration::from_secs(10),
                enable_fallback: true,
                structured_output: true,
                confidence: 0.85,
                inter_call_delay: Duration::from_millis(120),
            },
            LlmProfile::Contextual => Self {
                model: "gpt-4o-mini".to_string(),
                temperature: 0.0,
                max_tokens: 16,
                timeout: Duration::from_secs(15),
                enable_fallback: true,
                structured_output: true,
                confidence: 0.9,
                inter_call_delay: Duration::from_millis(150),
            },
        }
    }
}

type CallLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Masked view of a classifier's configuration
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub profile: LlmProfile,
    pub transport: &'static str,
    pub api_key: &'static str,
    #[serde(flatten)]
    pub config: LlmClassifierConfig,
}

/// Normalized view of the turns the model sees
struct Turns<'a> {
    t_minus2: Option<&'a str>,
    t_minus1: Option<&'a str>,
    t0: &'a str,
}

impl<'a> Turns<'a> {
    fn from_input(input: &'a AlgorithmInput) -> Self {
        match input {
            AlgorithmInput::Context {
                t_minus2,
                t_minus1,
                t0,
            } => Self {
                t_minus2: t_minus2.as_deref(),
                t_minus1: t_minus1.as_deref(),
                t0,
            },
            other => Self {
                t_minus2: None,
                t_minus1: None,
                t0: other.primary_text(),
            },
        }
    }
}

pub struct LlmClassifier {
    profile: LlmProfile,
    config: LlmClassifierConfig,
    transport: Arc<dyn LlmTransport>,
    limiter: Option<CallLimiter>,
}

impl LlmClassifier {
    pub fn new(profile: LlmProfile, transport: Arc<dyn LlmTransport>) -> Self {
        Self::with_config(profile, LlmClassifierConfig::for_profile(profile), transport)
    }

    pub fn with_config(
        profile: LlmProfile,
        config: LlmClassifierConfig,
        transport: Arc<dyn LlmTransport>,
    ) -> Self {
        let limiter = Quota::with_period(config.inter_call_delay).map(RateLimiter::direct);
        Self {
            profile,
            config,
            transport,
            limiter,
        }
    }

    pub fn profile(&self) -> LlmProfile {
        self.profile
    }

    /// Configuration with the credential masked
    pub fn config_summary(&self) -> ConfigSummary {
        ConfigSummary {
            profile: self.profile,
            transport: self.transport.name(),
            api_key: if self.transport.has_credentials() {
                "***CONFIGURED***"
            } else {
                "***NOT_SET***"
            },
            config: self.config.clone(),
        }
    }

    fn fallback(&self, reason: String, start: Instant) -> ExecutionResult {
        warn!(algorithm = self.profile.key(), reason = %reason, "Model classifier fell back");
        let confidence = if self.config.enable_fallback {
            FALLBACK_CONFIDENCE
        } else {
            0.0
        };
        let details = AdvisorDetails {
            family: AdvisorTag::Unrecognized.family().to_string(),
            matched_patterns: Vec::new(),
            rationale: Some(reason.clone()),
            evidences: Vec::new(),
        };

        ExecutionResult::new(UNRECOGNIZED_LABEL, confidence, ResultDetails::Advisor(details))
            .with_version(self.profile.version())
            .with_projection(label_projection(
                Target::X,
                self.profile.key(),
                self.profile.version(),
                UNRECOGNIZED_LABEL,
                confidence,
                ComputationStatus::Error,
            ))
            .with_fallback(reason)
            .with_processing_time(start.elapsed())
    }

    fn request(&self, turns: &Turns<'_>, input: &AlgorithmInput) -> LlmRequest {
        let messages = match self.profile {
            LlmProfile::Single => prompt::single_turn_messages(turns.t0),
            LlmProfile::Contextual => {
                prompt::contextual_messages(turns.t_minus2, turns.t_minus1, turns.t0)
            }
        };

        LlmRequest {
            algorithm_key: self.profile.key().to_string(),
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            messages,
            structured_labels: self.config.structured_output.then(prompt::label_set),
            timeout: self.config.timeout,
            input: input.clone(),
        }
    }

    fn apply_overrides(&self, tag: AdvisorTag, turns: &Turns<'_>) -> AdvisorTag {
        match self.profile {
            LlmProfile::Single => prompt::single_turn_override(tag, turns.t0),
            LlmProfile::Contextual => prompt::contextual_override(tag, turns.t_minus1, turns.t0),
        }
    }
}

#[async_trait]
impl Algorithm for LlmClassifier {
    fn describe(&self) -> Result<AlgorithmDescriptor, AlgorithmError> {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "model".to_string(),
            ParameterSpec::text(&self.config.model, "Chat model identifier"),
        );
        parameters.insert(
            "temperature".to_string(),
            ParameterSpec::number(self.config.temperature, 0.0, 1.0, "Sampling temperature"),
        );
        parameters.insert(
            "max_tokens".to_string(),
            ParameterSpec::number(self.config.max_tokens as f64, 4.0, 64.0, "Reply token budget"),
        );
        parameters.insert(
            "enable_fallback".to_string(),
            ParameterSpec::boolean(self.config.enable_fallback, "Non-zero confidence on fallback"),
        );

        let (display_name, description) = match self.profile {
            LlmProfile::Single => (
                "Model - X (advisor)",
                "Language-model classification of advisor turns with structured JSON output",
            ),
            LlmProfile::Contextual => (
                "Model - X (3 turns)",
                "Language-model classification of advisor turns using the two preceding turns",
            ),
        };

        Ok(AlgorithmDescriptor {
            key: self.profile.key().to_string(),
            display_name: display_name.to_string(),
            version: self.profile.version().to_string(),
            kind: AlgorithmKind::Classifier,
            target: Target::X,
            batch_supported: true,
            requires_context: self.profile == LlmProfile::Contextual,
            description: description.to_string(),
            parameters,
        })
    }

    fn validate_config(&self) -> bool {
        if !self.transport.has_credentials() {
            warn!(algorithm = self.profile.key(), "No API key available");
            return false;
        }
        (0.0..=1.0).contains(&self.config.temperature)
            && self.config.max_tokens > 0
            && !self.config.timeout.is_zero()
    }

    fn build_input(&self, sample: &Sample) -> AlgorithmInput {
        match (self.profile, sample.metadata.kind) {
            (LlmProfile::Contextual, SampleKind::Advisor) => AlgorithmInput::Context {
                t_minus2: sample.metadata.prev2.clone(),
                t_minus1: sample.metadata.prev1.clone(),
                t0: sample.verbatim.clone(),
            },
            _ => AlgorithmInput::text(sample.verbatim.clone()),
        }
    }

    async fn run(&self, input: &AlgorithmInput) -> Result<ExecutionResult, AlgorithmError> {
        let start = Instant::now();
        let turns = Turns::from_input(input);

        if turns.t0.trim().is_empty() {
            return Ok(self.fallback("empty_input".to_string(), start));
        }
        if !self.transport.has_credentials() {
            return Ok(self.fallback(TransportError::MissingCredentials.fallback_reason(), start));
        }

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let request = self.request(&turns, input);
        let reply = match self.transport.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => return Ok(self.fallback(e.fallback_reason(), start)),
        };

        let content = match reply {
            LlmReply::Classified(result) => {
                return Ok((*result).with_processing_time(start.elapsed()));
            }
            LlmReply::Completion { content } => content,
        };

        let parsed = match prompt::parse_label(&content) {
            Some(tag) if tag != AdvisorTag::Unrecognized => tag,
            _ => {
                debug!(algorithm = self.profile.key(), "Unparseable model reply");
                return Ok(self.fallback(
                    TransportError::InvalidPayload(content).fallback_reason(),
                    start,
                ));
            }
        };
        let tag = self.apply_overrides(parsed, &turns);
        let label = tag.as_str();

        let details = AdvisorDetails {
            family: tag.family().to_string(),
            matched_patterns: if tag != parsed {
                vec![format!("override:{}->{}", parsed.as_str(), label)]
            } else {
                Vec::new()
            },
            rationale: Some(content),
            evidences: Vec::new(),
        };

        Ok(
            ExecutionResult::new(label, self.config.confidence, ResultDetails::Advisor(details))
                .with_version(self.profile.version())
                .with_projection(label_projection(
                    Target::X,
                    self.profile.key(),
                    self.profile.version(),
                    label,
                    self.config.confidence,
                    ComputationStatus::Complete,
                ))
                .with_processing_time(start.elapsed()),
        )
    }
}
