//! TOML bootstrap configuration and database path resolution
//!
//! The TOML file only carries bootstrap concerns: where the database
//! lives, logging, how to reach the language model, and harness tuning.
//! Everything else is stored in the database `settings` table.
//!
//! # Database path priority
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`ALGOLAB_DATABASE`)
//! 3. TOML config file (`database_path`)
//! 4. OS-dependent default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable overriding the database location
pub const DATABASE_ENV_VAR: &str = "ALGOLAB_DATABASE";

/// Bootstrap configuration loaded from `algolab.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to the SQLite database (corpus + ledger)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Remote language-model access
    #[serde(default)]
    pub llm: LlmConfig,

    /// Validation harness tuning
    #[serde(default)]
    pub harness: HarnessConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Remote language-model settings
///
/// `api_key` is the lowest-priority credential source (Database → ENV → TOML).
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Chat-completions base URL (OpenAI-compatible)
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model used when a classifier does not pin one
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key (optional)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Proxy endpoint used by the proxied transport
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
            proxy_url: default_proxy_url(),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("proxy_url", &self.proxy_url)
            .finish()
    }
}

/// Validation harness tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Write projections back to the corpus after a run
    #[serde(default = "default_true")]
    pub write_back: bool,

    /// Retries per record before the record is flagged `error`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial write-back backoff, doubled per retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Records written per write-back chunk
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            write_back: true,
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_proxy_url() -> String {
    "http://127.0.0.1:5780/api/algolab/classifiers".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_batch_size() -> usize {
    100
}

/// Default location of `algolab.toml` (`~/.config/algolab/algolab.toml` on Linux)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("algolab").join("algolab.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Load the TOML bootstrap config
///
/// A missing file is not an error: built-in defaults are returned.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        tracing::debug!("Config file {} not found, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    tracing::info!("Loaded TOML configuration from {}", path.display());
    Ok(config)
}

/// Write the TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Resolve the database path (CLI → ENV → TOML → OS default)
pub fn resolve_database_path(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &toml_config.database_path {
        return path.clone();
    }

    // Priority 4: OS-dependent default
    get_default_database_path()
}

/// OS-dependent default database path
pub fn get_default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("algolab").join("algolab.db"))
        .unwrap_or_else(|| PathBuf::from("./algolab_data/algolab.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.harness.max_retries, 2);
        assert_eq!(config.harness.batch_size, 100);
        assert!(config.harness.write_back);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_toml_config(&temp_dir.path().join("absent.toml")).unwrap();
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("algolab.toml");
        std::fs::write(
            &path,
            "database_path = \"/tmp/corpus.db\"\n[llm]\nmodel = \"gpt-4o\"\n",
        )
        .unwrap();

        let config = load_toml_config(&path).unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/corpus.db")));
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
        assert_eq!(config.harness.retry_backoff_ms, 200);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("algolab.toml");
        std::fs::write(&path, "database_path = [").unwrap();

        let err = load_toml_config(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_write_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("algolab.toml");
        let mut config = TomlConfig::default();
        config.llm.api_key = Some("sk-test".to_string());

        write_toml_config(&config, &path).unwrap();
        let loaded = load_toml_config(&path).unwrap();
        assert_eq!(loaded.llm.api_key.as_deref(), Some("sk-test"));
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_debug_masks_api_key() {
        let mut config = LlmConfig::default();
        config.api_key = Some("sk-secret-value".to_string());
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-secret-value"));
        assert!(rendered.contains("***"));
    }

    #[test]
    #[serial]
    fn test_database_path_priority() {
        let toml_config = TomlConfig {
            database_path: Some(PathBuf::from("/from/toml.db")),
            ..Default::default()
        };

        std::env::remove_var(DATABASE_ENV_VAR);
        assert_eq!(
            resolve_database_path(Some(Path::new("/from/cli.db")), &toml_config),
            PathBuf::from("/from/cli.db")
        );
        assert_eq!(
            resolve_database_path(None, &toml_config),
            PathBuf::from("/from/toml.db")
        );

        std::env::set_var(DATABASE_ENV_VAR, "/from/env.db");
        assert_eq!(
            resolve_database_path(None, &toml_config),
            PathBuf::from("/from/env.db")
        );
        std::env::remove_var(DATABASE_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_database_path_falls_back_to_default() {
        std::env::remove_var(DATABASE_ENV_VAR);
        let path = resolve_database_path(None, &TomlConfig::default());
        assert!(path.ends_with("algolab.db"));
    }
}
