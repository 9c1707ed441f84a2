//! Configuration loading, validation, and management for Tandem.
//!
//! Loads configuration from `~/.tandem/config.toml` with environment
//! variable overrides. Validates all settings at load time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.tandem/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model backend
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Loop and streaming limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Context truncation reserves
    #[serde(default)]
    pub truncation: TruncationConfig,

    /// Known context-window sizes, matched by substring against model
    /// identifiers
    #[serde(default = "default_model_limits")]
    pub model_limits: Vec<ModelLimit>,

    /// Context window assumed for models not in `model_limits`
    #[serde(default = "default_context_limit")]
    pub default_context_limit: usize,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "anthropic".into()
}
fn default_model() -> String {
    "claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_context_limit() -> usize {
    8192
}

fn default_model_limits() -> Vec<ModelLimit> {
    vec![
        ModelLimit::new("claude-3-5", 200_000),
        ModelLimit::new("claude-sonnet-4", 200_000),
        ModelLimit::new("claude-opus-4", 200_000),
        ModelLimit::new("gpt-4o", 128_000),
        ModelLimit::new("gpt-4-turbo", 128_000),
        ModelLimit::new("gpt-4", 8_192),
        ModelLimit::new("gpt-3.5-turbo", 16_385),
        ModelLimit::new("llama3", 8_192),
    ]
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("limits", &self.limits)
            .field("truncation", &self.truncation)
            .field("model_limits", &self.model_limits)
            .field("default_context_limit", &self.default_context_limit)
            .field("providers", &self.providers)
            .finish()
    }
}

/// A known context-window size for models whose identifier contains
/// `pattern`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelLimit {
    pub pattern: String,
    pub context_tokens: usize,
}

impl ModelLimit {
    pub fn new(pattern: impl Into<String>, context_tokens: usize) -> Self {
        Self {
            pattern: pattern.into(),
            context_tokens,
        }
    }
}

/// Loop iteration and streaming limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum model-call iterations per user request
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Token ceiling applied to a single tool result before it enters
    /// the conversation
    #[serde(default = "default_tool_result_token_ceiling")]
    pub tool_result_token_ceiling: usize,

    /// Seconds of stream inactivity before a request is abandoned
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_tool_result_token_ceiling() -> usize {
    4000
}
fn default_stream_idle_timeout_secs() -> u64 {
    30
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_result_token_ceiling: default_tool_result_token_ceiling(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
        }
    }
}

impl LimitsConfig {
    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}

/// Token reserves subtracted from the model's context window before
/// history is fitted into what remains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncationConfig {
    /// Room left for the model's reply
    #[serde(default = "default_reserve_for_response")]
    pub reserve_for_response: usize,

    /// Room assumed for the system prompt
    #[serde(default = "default_reserve_for_system_prompt")]
    pub reserve_for_system_prompt: usize,

    /// Room assumed for advertised tool definitions; not charged when a
    /// request carries no tools
    #[serde(default = "default_reserve_for_tool_definitions")]
    pub reserve_for_tool_definitions: usize,

    /// Slack against estimator error
    #[serde(default = "default_safety_buffer_tokens")]
    pub safety_buffer_tokens: usize,

    /// Lower bound on the protected tail of recent turns
    #[serde(default = "default_minimum_turns_to_keep")]
    pub minimum_turns_to_keep: usize,
}

fn default_reserve_for_response() -> usize {
    1024
}
fn default_reserve_for_system_prompt() -> usize {
    512
}
fn default_reserve_for_tool_definitions() -> usize {
    512
}
fn default_safety_buffer_tokens() -> usize {
    256
}
fn default_minimum_turns_to_keep() -> usize {
    4
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            reserve_for_response: default_reserve_for_response(),
            reserve_for_system_prompt: default_reserve_for_system_prompt(),
            reserve_for_tool_definitions: default_reserve_for_tool_definitions(),
            safety_buffer_tokens: default_safety_buffer_tokens(),
            minimum_turns_to_keep: default_minimum_turns_to_keep(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl ChatConfig {
    /// Load configuration from the default path (~/.tandem/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `TANDEM_API_KEY` (highest priority)
    /// - `ANTHROPIC_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        if config.api_key.is_none() {
            config.api_key = std::env::var("TANDEM_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("TANDEM_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("TANDEM_MODEL") {
            config.default_model = model;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tandem")
    }

    /// The context window to assume for a model identifier.
    ///
    /// Longest matching substring pattern wins; among equal-length
    /// matches the first table entry wins. Unknown models fall back to
    /// `default_context_limit`.
    pub fn context_limit_for(&self, model: &str) -> usize {
        // max_by_key keeps the last of equal keys, so iterate reversed
        // to make the earlier table entry win ties.
        self.model_limits
            .iter()
            .rev()
            .filter(|limit| model.contains(&limit.pattern))
            .max_by_key(|limit| limit.pattern.len())
            .map(|limit| limit.context_tokens)
            .unwrap_or(self.default_context_limit)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.limits.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_iterations must be at least 1".into(),
            ));
        }

        if self.default_context_limit == 0 {
            return Err(ConfigError::ValidationError(
                "default_context_limit must be positive".into(),
            ));
        }

        for limit in &self.model_limits {
            if limit.pattern.is_empty() {
                return Err(ConfigError::ValidationError(
                    "model_limits patterns must be non-empty".into(),
                ));
            }
            if limit.context_tokens == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "model_limits entry '{}' must have a positive context_tokens",
                    limit.pattern
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for first-run setup).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            limits: LimitsConfig::default(),
            truncation: TruncationConfig::default(),
            model_limits: default_model_limits(),
            default_context_limit: default_context_limit(),
            providers: HashMap::new(),
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
