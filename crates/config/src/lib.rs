//! Configuration loading, validation, and management for deskhive.
//!
//! Loads configuration from `~/.deskhive/config.toml` with environment
//! variable overrides. Validates all settings at startup — including that
//! every `[workers.roles.*]` section names a known worker role.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use deskhive_core::worker::{RoleProfile, WorkerRole};

/// The root configuration structure.
///
/// Maps directly to `~/.deskhive/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API credential for the remote worker API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the remote worker API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Model used by roles without an explicit override
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Worker lifecycle configuration
    #[serde(default)]
    pub workers: WorkersConfig,

    /// Crash/restart policy
    #[serde(default)]
    pub restart: RestartConfig,

    /// Context token budget
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Remote client tuning
    #[serde(default)]
    pub client: ClientConfig,
}

fn default_api_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_model() -> String {
    "claude-sonnet-4-5".into()
}

/// Redact a secret string for Debug output.
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
            .field("api_base_url", &self.api_base_url)
            .field("default_model", &self.default_model)
            .field("workers", &self.workers)
            .field("restart", &self.restart)
            .field("budget", &self.budget)
            .field("client", &self.client)
            .finish()
    }
}

/// Worker lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Sliding conversation window size per worker
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Maximum accepted message length in characters
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,

    /// Per-role overrides, keyed by role (e.g. `[workers.roles.main]`)
    #[serde(default)]
    pub roles: HashMap<String, RoleOverride>,
}

fn default_history_window() -> usize {
    10
}
fn default_max_message_len() -> usize {
    65_536
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            max_message_len: default_max_message_len(),
            roles: HashMap::new(),
        }
    }
}

/// Optional per-role overrides of the built-in role defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Crash/restart policy for the worker supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    /// Crashes tolerated inside the cooldown window before a worker is
    /// marked permanently failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First restart delay; doubles per repeated crash
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling on the restart delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// A crash later than this after the last (re)start counts as fresh
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_cooldown_secs() -> u64 {
    60
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// Context token budget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Token ceiling across all layers
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,

    /// total/max ratio at which the warning level turns `warning`
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,

    /// total/max ratio at which the warning level turns `critical`
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,

    /// Target fraction of the ceiling `auto_prune` trims toward
    #[serde(default = "default_prune_target")]
    pub prune_target: f64,
}

fn default_max_tokens() -> u64 {
    200_000
}
fn default_warning_threshold() -> f64 {
    0.85
}
fn default_critical_threshold() -> f64 {
    0.95
}
fn default_prune_target() -> f64 {
    0.7
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            warning_threshold: default_warning_threshold(),
            critical_threshold: default_critical_threshold(),
            prune_target: default_prune_target(),
        }
    }
}

/// Remote client tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Per-request timeout applied by the HTTP client itself. The supervisor
    /// layer deliberately has no second timeout on top of this.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.deskhive/config.toml).
    ///
    /// Also checks environment variables for the credential:
    /// - `DESKHIVE_API_KEY` (highest priority)
    /// - `ANTHROPIC_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = Self::config_dir();
        let config_path = config_dir.join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        if config.api_key.is_none() {
            config.api_key = std::env::var("DESKHIVE_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());
        }

        // Allow env var to override the default model
        if let Ok(model) = std::env::var("DESKHIVE_MODEL") {
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
        dirs_home().join(".deskhive")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for key in self.workers.roles.keys() {
            if WorkerRole::from_str(key).is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "unknown worker role '{key}' in [workers.roles] (known: main, \
                     context-manager, summarizer, planner)"
                )));
            }
        }

        if self.workers.history_window == 0 {
            return Err(ConfigError::ValidationError(
                "workers.history_window must be at least 1".into(),
            ));
        }

        if self.workers.max_message_len == 0 {
            return Err(ConfigError::ValidationError(
                "workers.max_message_len must be at least 1".into(),
            ));
        }

        if self.restart.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "restart.max_attempts must be at least 1".into(),
            ));
        }

        if self.restart.max_delay_ms < self.restart.base_delay_ms {
            return Err(ConfigError::ValidationError(
                "restart.max_delay_ms must not be below restart.base_delay_ms".into(),
            ));
        }

        if self.budget.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "budget.max_tokens must be greater than 0".into(),
            ));
        }

        for (name, value) in [
            ("budget.warning_threshold", self.budget.warning_threshold),
            ("budget.critical_threshold", self.budget.critical_threshold),
            ("budget.prune_target", self.budget.prune_target),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be within (0.0, 1.0]"
                )));
            }
        }

        if self.budget.warning_threshold >= self.budget.critical_threshold {
            return Err(ConfigError::ValidationError(
                "budget.warning_threshold must be below budget.critical_threshold".into(),
            ));
        }

        if self.client.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "client.request_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API credential is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Resolve the configuration record for one role: built-in defaults
    /// overlaid with any `[workers.roles.<key>]` section.
    pub fn role_profile(&self, role: WorkerRole) -> RoleProfile {
        let over = self.workers.roles.get(role.as_str());
        RoleProfile {
            display_name: over
                .and_then(|o| o.display_name.clone())
                .unwrap_or_else(|| role.display_name().to_string()),
            seed_prompt: over
                .and_then(|o| o.seed_prompt.clone())
                .unwrap_or_else(|| role.default_seed_prompt().to_string()),
            model_id: over
                .and_then(|o| o.model.clone())
                .unwrap_or_else(|| self.default_model.clone()),
        }
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: default_api_base_url(),
            default_model: default_model(),
            workers: WorkersConfig::default(),
            restart: RestartConfig::default(),
            budget: BudgetConfig::default(),
            client: ClientConfig::default(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_model, "claude-sonnet-4-5");
        assert_eq!(config.restart.max_attempts, 3);
        assert_eq!(config.budget.max_tokens, 200_000);
        assert_eq!(config.workers.history_window, 10);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.restart.base_delay_ms, config.restart.base_delay_ms);
        assert_eq!(parsed.budget.critical_threshold, config.budget.critical_threshold);
    }

    #[test]
    fn unknown_role_key_rejected() {
        let mut config = AppConfig::default();
        config
            .workers
            .roles
            .insert("janitor".into(), RoleOverride::default());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("janitor"));
    }

    #[test]
    fn threshold_ordering_enforced() {
        let mut config = AppConfig::default();
        config.budget.warning_threshold = 0.96;
        config.budget.critical_threshold = 0.95;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let mut config = AppConfig::default();
        config.budget.prune_target = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn delay_ceiling_must_cover_base() {
        let mut config = AppConfig::default();
        config.restart.base_delay_ms = 60_000;
        config.restart.max_delay_ms = 30_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.default_model, "claude-sonnet-4-5");
    }

    #[test]
    fn load_from_file_with_role_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
default_model = "claude-haiku-4"

[workers]
history_window = 6

[workers.roles.summarizer]
seed_prompt = "Summarize in one sentence."
model = "claude-haiku-4"

[restart]
max_attempts = 5
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.workers.history_window, 6);
        assert_eq!(config.restart.max_attempts, 5);

        let profile = config.role_profile(WorkerRole::Summarizer);
        assert_eq!(profile.seed_prompt, "Summarize in one sentence.");
        assert_eq!(profile.model_id, "claude-haiku-4");
        // display name falls back to the built-in default
        assert_eq!(profile.display_name, "Summarizer");

        let main = config.role_profile(WorkerRole::Main);
        assert_eq!(main.model_id, "claude-haiku-4");
        assert_eq!(main.seed_prompt, WorkerRole::Main.default_seed_prompt());
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "workers = \"not a table\"").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-ant-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-ant-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("claude-sonnet-4-5"));
        assert!(toml_str.contains("200000"));
    }
}
