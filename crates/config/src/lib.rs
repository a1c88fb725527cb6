//! Configuration loading, validation, and management for DefiBot.
//!
//! Loads configuration from `~/.defibot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.defibot/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub apis: ApisConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

/// LLM endpoint settings. Any OpenAI-compatible gateway works.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Overrides the provider's well-known base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model for the detailed turn and UI generation
    #[serde(default = "default_model")]
    pub model: String,

    /// Cheaper model for the quick acknowledgement
    #[serde(default = "default_quick_model")]
    pub quick_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_quick_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    2048
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_url: None,
            api_key: None,
            model: default_model(),
            quick_model: default_quick_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("quick_model", &self.quick_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Orchestration knobs for the quick/detailed response flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Cap on LLM calls within one tool-calling turn
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Messages of visible history replayed per request
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_quick_max_tokens")]
    pub quick_max_tokens: u32,

    /// Replaces the built-in DeFi assistant system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,

    #[serde(default = "default_true")]
    pub generate_ui: bool,
}

fn default_max_steps() -> u32 {
    10
}
fn default_history_limit() -> usize {
    20
}
fn default_quick_max_tokens() -> u32 {
    120
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            history_limit: default_history_limit(),
            quick_max_tokens: default_quick_max_tokens(),
            system_prompt_override: None,
            generate_ui: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a tool result stays fresh
    #[serde(default = "default_tool_ttl_secs")]
    pub tool_ttl_secs: u64,

    /// How often the gateway sweeps expired tool results
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Maximum generated components kept (LRU)
    #[serde(default = "default_component_capacity")]
    pub component_capacity: usize,

    /// Hard limit on one UI generation call
    #[serde(default = "default_ui_timeout_secs")]
    pub ui_timeout_secs: u64,
}

fn default_tool_ttl_secs() -> u64 {
    300
}
fn default_cleanup_interval_secs() -> u64 {
    60
}
fn default_component_capacity() -> usize {
    256
}
fn default_ui_timeout_secs() -> u64 {
    15
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tool_ttl_secs: default_tool_ttl_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            component_capacity: default_component_capacity(),
            ui_timeout_secs: default_ui_timeout_secs(),
        }
    }
}

/// Upstream REST services the built-in tools talk to.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApisConfig {
    /// Token and address analytics API
    #[serde(default = "default_analytics_url")]
    pub analytics_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics_api_key: Option<String>,

    /// Full-text search service
    #[serde(default = "default_search_url")]
    pub search_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_api_key: Option<String>,

    #[serde(default = "default_search_collection")]
    pub search_collection: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_analytics_url() -> String {
    "https://api.mc2.fi/v1".into()
}
fn default_search_url() -> String {
    "http://localhost:8108".into()
}
fn default_search_collection() -> String {
    "protocols".into()
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ApisConfig {
    fn default() -> Self {
        Self {
            analytics_url: default_analytics_url(),
            analytics_api_key: None,
            search_url: default_search_url(),
            search_api_key: None,
            search_collection: default_search_collection(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ApisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApisConfig")
            .field("analytics_url", &self.analytics_url)
            .field("analytics_api_key", &redact(&self.analytics_api_key))
            .field("search_url", &self.search_url)
            .field("search_api_key", &redact(&self.search_api_key))
            .field("search_collection", &self.search_collection)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Base URLs of external tool servers to discover tools from
    #[serde(default)]
    pub external_sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Origins allowed by CORS; empty allows any
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_port() -> u16 {
    8787
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: vec![],
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.defibot/config.toml),
    /// then apply environment overrides:
    /// - `DEFIBOT_API_KEY`, then `OPENAI_API_KEY`
    /// - `DEFIBOT_API_URL`, `DEFIBOT_MODEL`
    /// - `ANALYTICS_API_URL`, `ANALYTICS_API_KEY`
    /// - `SEARCH_API_URL`, `SEARCH_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
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

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = lookup("DEFIBOT_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(url) = lookup("DEFIBOT_API_URL") {
            self.llm.api_url = Some(url);
        }
        if let Some(model) = lookup("DEFIBOT_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = lookup("ANALYTICS_API_URL") {
            self.apis.analytics_url = url;
        }
        if let Some(key) = lookup("ANALYTICS_API_KEY") {
            self.apis.analytics_api_key = Some(key);
        }
        if let Some(url) = lookup("SEARCH_API_URL") {
            self.apis.search_url = url;
        }
        if let Some(key) = lookup("SEARCH_API_KEY") {
            self.apis.search_api_key = Some(key);
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs_home().join(".defibot")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_steps must be at least 1".into(),
            ));
        }
        if self.cache.component_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "cache.component_capacity must be at least 1".into(),
            ));
        }
        if self.cache.tool_ttl_secs == 0 || self.cache.cleanup_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache.tool_ttl_secs and cache.cleanup_interval_secs must be > 0".into(),
            ));
        }
        for url in std::iter::once(&self.apis.analytics_url)
            .chain(std::iter::once(&self.apis.search_url))
            .chain(self.tools.external_sources.iter())
        {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "'{url}' must start with http:// or https://"
                )));
            }
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.is_some()
    }

    /// Default config as TOML (for `onboard`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

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

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
