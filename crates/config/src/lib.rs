//! Configuration loading and validation for TurnGraph.
//!
//! Loads configuration from `~/.turngraph/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use turngraph_core::ModelConfig;

/// The root configuration structure.
///
/// Maps directly to `~/.turngraph/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Instructions sent with every model call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Extra instructions appended after the primary ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_instructions: Option<String>,

    /// Model client configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Engine settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Isolation settings
    #[serde(default)]
    pub isolation: IsolationSettings,
}

/// Engine behaviour for each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum node executions per run
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: u32,

    /// Return the final message list from a run
    #[serde(default = "default_true")]
    pub return_content: bool,

    /// Carry the streaming content buffer over between runs
    #[serde(default)]
    pub keep_content: bool,

    /// Token budget for pruning the outbound conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_tokens: Option<usize>,
}

fn default_recursion_limit() -> u32 {
    10
}
fn default_true() -> bool {
    true
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            recursion_limit: default_recursion_limit(),
            return_content: true,
            keep_content: false,
            max_context_tokens: None,
        }
    }
}

/// Where a run executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerType {
    /// A dedicated OS thread with its own async runtime
    #[default]
    Thread,
    /// A child process speaking the worker protocol over stdio
    Process,
}

/// Isolation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IsolationSettings {
    /// Relocate runs out of the caller's task
    #[serde(default)]
    pub enabled: bool,

    /// Thread or process
    #[serde(default)]
    pub worker_type: WorkerType,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("instructions", &self.instructions)
            .field("additional_instructions", &self.additional_instructions)
            .field("model", &self.model)
            .field("agent", &self.agent)
            .field("isolation", &self.isolation)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.turngraph/config.toml).
    ///
    /// Also checks environment variables:
    /// - `TURNGRAPH_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `TURNGRAPH_PROVIDER`
    /// - `TURNGRAPH_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using the given lookup.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("TURNGRAPH_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("TURNGRAPH_PROVIDER") {
            self.model.provider = provider;
        }

        if let Some(model) = lookup("TURNGRAPH_MODEL") {
            self.model.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".turngraph")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.model.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "model.temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if self.agent.recursion_limit == 0 {
            return Err(ConfigError::ValidationError(
                "agent.recursion_limit must be at least 1".into(),
            ));
        }

        if self.agent.max_context_tokens == Some(0) {
            return Err(ConfigError::ValidationError(
                "agent.max_context_tokens must be positive when set".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            instructions: None,
            additional_instructions: None,
            model: ModelConfig::default(),
            agent: AgentSettings::default(),
            isolation: IsolationSettings::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
