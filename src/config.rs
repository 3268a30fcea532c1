//! Configuration management for Turnstile.
//!
//! Values are layered: built-in defaults, then an optional config file
//! (format from its extension), then `TURNSTILE__*` environment variables,
//! e.g. `TURNSTILE__LIMITER__FAILURE_MODE=open`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{
    FailureMode, PolicyConfig, PolicyRegistry, DEFAULT_IDLE_WINDOWS, DEFAULT_MAX_KEYS, MAX_SWEEP_INTERVAL,
};

/// Default environment variable prefix.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for Turnstile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Limiter and store configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Named policies to register at startup
    #[serde(default = "default_policies")]
    pub policies: Vec<PolicyConfig>,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            limiter: LimiterConfig::default(),
            policies: default_policies(),
        }
    }
}

fn default_policies() -> Vec<PolicyConfig> {
    vec![PolicyConfig::new("search", 60, 60)]
}

/// Limiter and window store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Behaviour when the window store fails
    #[serde(default)]
    pub failure_mode: FailureMode,

    /// Maximum number of tracked (policy, identifier) keys
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,

    /// Background sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Idle grace before eviction, in window lengths
    #[serde(default = "default_idle_windows")]
    pub idle_windows: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            failure_mode: FailureMode::default(),
            max_keys: default_max_keys(),
            sweep_interval_secs: default_sweep_interval(),
            idle_windows: default_idle_windows(),
        }
    }
}

fn default_max_keys() -> usize {
    DEFAULT_MAX_KEYS
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_idle_windows() -> u32 {
    DEFAULT_IDLE_WINDOWS
}

impl TurnstileConfig {
    /// Load configuration from an optional file and `TURNSTILE__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration using a custom environment variable prefix.
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        Self::load_from(path, environment(env_prefix))
    }

    fn load_from(path: Option<&Path>, env: ::config::Environment) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        builder = builder.add_source(env);

        let config: TurnstileConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.max_keys == 0 {
            return Err(TurnstileError::Config("limiter.max_keys must be positive".to_string()));
        }
        if self.limiter.sweep_interval_secs == 0 {
            return Err(TurnstileError::Config(
                "limiter.sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.limiter.sweep_interval_secs > MAX_SWEEP_INTERVAL.as_secs() {
            return Err(TurnstileError::Config(format!(
                "limiter.sweep_interval_secs must be at most {}",
                MAX_SWEEP_INTERVAL.as_secs()
            )));
        }
        if self.limiter.idle_windows == 0 {
            return Err(TurnstileError::Config("limiter.idle_windows must be positive".to_string()));
        }
        Ok(())
    }

    /// Build the policy registry described by this configuration.
    pub fn build_registry(&self) -> Result<PolicyRegistry> {
        PolicyRegistry::from_configs(&self.policies)
    }
}

fn environment(prefix: &str) -> ::config::Environment {
    ::config::Environment::with_prefix(prefix)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
