//! Credential resolution for algolab-eval
//!
//! The language-model API key resolves with Database → ENV → TOML
//! priority. The key value itself is never logged, only its source.

use algolab_common::config::TomlConfig;
use algolab_common::db::get_llm_api_key;
use algolab_common::Result;
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

/// Environment variable holding the language-model API key
pub const LLM_API_KEY_ENV_VAR: &str = "ALGOLAB_LLM_API_KEY";

/// Where a resolved key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Database,
    Environment,
    Toml,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Database => "database",
            KeySource::Environment => "environment",
            KeySource::Toml => "TOML",
        }
    }
}

/// Resolve the language-model API key
///
/// **Priority:** Database → ENV → TOML
///
/// Returns `None` when no source holds a valid key; model classifiers then
/// fall back with a missing-credentials reason.
pub async fn resolve_llm_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<(String, KeySource)>> {
    let candidates = [
        (get_llm_api_key(db).await?, KeySource::Database),
        (std::env::var(LLM_API_KEY_ENV_VAR).ok(), KeySource::Environment),
        (toml_config.llm.api_key.clone(), KeySource::Toml),
    ];

    let valid: Vec<(String, KeySource)> = candidates
        .into_iter()
        .filter_map(|(key, source)| key.filter(|k| is_valid_key(k)).map(|k| (k, source)))
        .collect();

    if valid.len() > 1 {
        let sources: Vec<&str> = valid.iter().map(|(_, s)| s.as_str()).collect();
        warn!(
            "LLM API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    match valid.into_iter().next() {
        Some((key, source)) => {
            info!("LLM API key loaded from {}", source.as_str());
            Ok(Some((key, source)))
        }
        None => {
            warn!(
                "LLM API key not configured (settings table, {} or [llm].api_key)",
                LLM_API_KEY_ENV_VAR
            );
            Ok(None)
        }
    }
}

/// Non-empty, non-whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
