//! Configuration loading, validation, and management for botrelay.
//!
//! Loads configuration from `~/.botrelay/config.toml` with environment
//! variable overrides. Provider credentials are never stored here by
//! default: each robot names the environment variable its key lives in.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Catalog names the runtime knows how to build.
pub const KNOWN_CATALOGS: &[&str] = &["clock", "forms", "slack"];

/// The root configuration structure.
///
/// Maps directly to `~/.botrelay/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Stored messages fetched as history per turn
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Safety cap on tool rounds within one reply
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,

    /// Temperature used when a robot doesn't set one
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Max tokens used when a robot doesn't set one
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    #[serde(default)]
    pub multipart: MultipartConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    /// Robot definitions keyed by registry name
    #[serde(default = "default_robots")]
    pub robots: BTreeMap<String, RobotConfig>,
}

fn default_history_limit() -> usize {
    20
}
fn default_max_tool_rounds() -> u32 {
    25
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartConfig {
    /// Delay before each delayed part, in milliseconds
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,
}

fn default_stagger_ms() -> u64 {
    750
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            stagger_ms: default_stagger_ms(),
        }
    }
}

/// Targets of the content-based routing rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_slack_robot")]
    pub slack_robot: String,

    #[serde(default = "default_form_robot")]
    pub form_robot: String,

    #[serde(default = "default_default_robot")]
    pub default_robot: String,

    /// Brand substrings that mark Slack context (case-insensitive)
    #[serde(default = "default_slack_keywords")]
    pub slack_keywords: Vec<String>,
}

fn default_slack_robot() -> String {
    "slack".into()
}
fn default_form_robot() -> String {
    "forms".into()
}
fn default_default_robot() -> String {
    "parrot".into()
}
fn default_slack_keywords() -> Vec<String> {
    vec!["slack".into()]
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            slack_robot: default_slack_robot(),
            form_robot: default_form_robot(),
            default_robot: default_default_robot(),
            slack_keywords: default_slack_keywords(),
        }
    }
}

/// One robot: a provider, a model, a system role and a tool assembly.
#[derive(Clone, Serialize, Deserialize)]
pub struct RobotConfig {
    /// "anthropic", "openai", "parrot", or any OpenAI-compatible name
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Inline API key. Prefer `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default)]
    pub system_prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Catalogs merged in this order; the first declaring a name wins
    #[serde(default)]
    pub catalogs: Vec<String>,

    /// Allow-list applied to the last catalog in `catalogs`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_filter: Vec<String>,

    /// Prompt for the delayed part of a multi-part reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_prompt: Option<String>,
}

impl RobotConfig {
    pub fn is_parrot(&self) -> bool {
        self.provider == "parrot"
    }

    /// The environment variable the credential is read from.
    pub fn credential_env(&self) -> Option<String> {
        if let Some(env) = &self.api_key_env {
            return Some(env.clone());
        }
        match self.provider.as_str() {
            "parrot" => None,
            "anthropic" => Some("ANTHROPIC_API_KEY".into()),
            "openai" => Some("OPENAI_API_KEY".into()),
            other => Some(format!("{}_API_KEY", other.to_uppercase().replace('-', "_"))),
        }
    }

    /// Resolve the credential: inline key first, then the environment.
    pub fn resolve_api_key(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| self.credential_env().and_then(|env| lookup(&env)))
            .filter(|k| !k.trim().is_empty())
    }

    pub fn model_or_default(&self) -> String {
        if let Some(model) = &self.model {
            return model.clone();
        }
        match self.provider.as_str() {
            "anthropic" => "claude-sonnet-4-20250514".into(),
            "parrot" => "parrot".into(),
            _ => "gpt-4o-mini".into(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for RobotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("api_key_env", &self.api_key_env)
            .field("api_url", &self.api_url)
            .field("system_prompt", &self.system_prompt)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("catalogs", &self.catalogs)
            .field("tool_filter", &self.tool_filter)
            .field("follow_up_prompt", &self.follow_up_prompt)
            .finish()
    }
}

fn default_robots() -> BTreeMap<String, RobotConfig> {
    let mut robots = BTreeMap::new();
    robots.insert(
        "slack".into(),
        RobotConfig {
            provider: "anthropic".into(),
            model: None,
            api_key: None,
            api_key_env: None,
            api_url: None,
            system_prompt: "You are a helpful assistant living inside a Slack workspace. \
                Answer concisely and use the Slack tools when the user asks you to \
                post or look something up."
                .into(),
            temperature: None,
            max_tokens: None,
            catalogs: vec!["slack".into(), "clock".into()],
            tool_filter: vec![],
            follow_up_prompt: Some(
                "Suggest one short, concrete next step the user could take.".into(),
            ),
        },
    );
    robots.insert(
        "forms".into(),
        RobotConfig {
            provider: "openai".into(),
            model: None,
            api_key: None,
            api_key_env: None,
            api_url: None,
            system_prompt: "You help customers understand and complete forms. Look forms up \
                by id with the form tools before answering questions about them."
                .into(),
            temperature: None,
            max_tokens: None,
            catalogs: vec!["forms".into(), "clock".into()],
            tool_filter: vec!["current_time".into()],
            follow_up_prompt: None,
        },
    );
    robots.insert(
        "parrot".into(),
        RobotConfig {
            provider: "parrot".into(),
            model: None,
            api_key: None,
            api_key_env: None,
            api_url: None,
            system_prompt: String::new(),
            temperature: None,
            max_tokens: None,
            catalogs: vec![],
            tool_filter: vec![],
            follow_up_prompt: None,
        },
    );
    robots
}

impl AppConfig {
    /// Load configuration from the default path (~/.botrelay/config.toml).
    ///
    /// Environment overrides:
    /// - `BOTRELAY_HISTORY_LIMIT`
    /// - `BOTRELAY_MAX_TOOL_ROUNDS`
    /// - `BOTRELAY_DEFAULT_ROBOT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
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

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = lookup("BOTRELAY_HISTORY_LIMIT") {
            self.history_limit = parse_env("BOTRELAY_HISTORY_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("BOTRELAY_MAX_TOOL_ROUNDS") {
            self.max_tool_rounds = parse_env("BOTRELAY_MAX_TOOL_ROUNDS", &raw)?;
        }
        if let Some(robot) = lookup("BOTRELAY_DEFAULT_ROBOT") {
            self.routing.default_robot = robot;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".botrelay")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "max_tool_rounds must be at least 1".into(),
            ));
        }

        for target in [
            &self.routing.slack_robot,
            &self.routing.form_robot,
            &self.routing.default_robot,
        ] {
            if !self.robots.contains_key(target) {
                return Err(ConfigError::ValidationError(format!(
                    "routing target '{target}' is not a configured robot"
                )));
            }
        }

        for (name, robot) in &self.robots {
            if let Some(t) = robot.temperature
                && !(0.0..=2.0).contains(&t)
            {
                return Err(ConfigError::ValidationError(format!(
                    "robots.{name}.temperature must be between 0.0 and 2.0"
                )));
            }
            if let Some(unknown) = robot
                .catalogs
                .iter()
                .find(|c| !KNOWN_CATALOGS.contains(&c.as_str()))
            {
                return Err(ConfigError::ValidationError(format!(
                    "robots.{name} uses unknown catalog '{unknown}'"
                )));
            }
            if !robot.tool_filter.is_empty() && robot.catalogs.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "robots.{name}.tool_filter needs at least one catalog"
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            max_tool_rounds: default_max_tool_rounds(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            multipart: MultipartConfig::default(),
            routing: RoutingConfig::default(),
            robots: default_robots(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: raw.to_string(),
    })
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

    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnv { key: String, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
