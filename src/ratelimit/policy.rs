//! Named limiter policies and their configuration form.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, TurnstileError};

/// Calendar unit a policy window can be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of this time unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// An immutable rate limit policy: at most `max_requests` per `window`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterPolicy {
    name: String,
    window: Duration,
    max_requests: u64,
}

impl LimiterPolicy {
    /// Create a policy, rejecting empty names and zero windows or quotas.
    pub fn new(name: impl Into<String>, window: Duration, max_requests: u64) -> Result<Self> {
        let name = name.into();

        let invalid = |reason: &str| TurnstileError::InvalidPolicy {
            name: name.clone(),
            reason: reason.to_string(),
        };

        if name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if window.is_zero() {
            return Err(invalid("window must be positive"));
        }
        if max_requests == 0 {
            return Err(invalid("max_requests must be positive"));
        }

        Ok(Self {
            name,
            window,
            max_requests,
        })
    }

    /// Create a policy allowing `max_requests` per calendar `unit`.
    pub fn per_unit(name: impl Into<String>, max_requests: u64, unit: TimeUnit) -> Result<Self> {
        Self::new(name, unit.duration(), max_requests)
    }

    /// The policy's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length of one counting window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Requests admitted per window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }
}

/// Configuration for a single named policy.
///
/// The window is given either as `window_seconds` or as a `unit`; exactly one
/// of the two must be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Unique policy name referenced by guards
    pub name: String,
    /// Requests allowed per window
    pub max_requests: u64,
    /// Window length in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<u64>,
    /// Window length as a calendar unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<TimeUnit>,
}

impl PolicyConfig {
    /// Policy of `max_requests` per `window_seconds`.
    pub fn new(name: impl Into<String>, window_seconds: u64, max_requests: u64) -> Self {
        Self {
            name: name.into(),
            max_requests,
            window_seconds: Some(window_seconds),
            unit: None,
        }
    }

    fn window(&self) -> Result<Duration> {
        match (self.window_seconds, self.unit) {
            (Some(secs), None) => Ok(Duration::from_secs(secs)),
            (None, Some(unit)) => Ok(unit.duration()),
            (Some(_), Some(_)) => Err(TurnstileError::InvalidPolicy {
                name: self.name.clone(),
                reason: "set either window_seconds or unit, not both".to_string(),
            }),
            (None, None) => Err(TurnstileError::InvalidPolicy {
                name: self.name.clone(),
                reason: "one of window_seconds or unit is required".to_string(),
            }),
        }
    }
}

impl TryFrom<&PolicyConfig> for LimiterPolicy {
    type Error = TurnstileError;

    fn try_from(config: &PolicyConfig) -> Result<Self> {
        LimiterPolicy::new(config.name.clone(), config.window()?, config.max_requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_unit_duration() {
        assert_eq!(TimeUnit::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeUnit::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeUnit::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Day.duration(), Duration::from_secs(86400));
    }

    #[test]
    fn test_policy_creation() {
        let policy = LimiterPolicy::new("search", Duration::from_secs(60), 5).unwrap();
        assert_eq!(policy.name(), "search");
        assert_eq!(policy.window(), Duration::from_secs(60));
        assert_eq!(policy.max_requests(), 5);
    }

    #[test]
    fn test_policy_rejects_zero_window() {
        let err = LimiterPolicy::new("search", Duration::ZERO, 5).unwrap_err();
        assert!(matches!(err, TurnstileError::InvalidPolicy { ref name, .. } if name == "search"));
    }

    #[test]
    fn test_policy_rejects_zero_quota() {
        let err = LimiterPolicy::new("search", Duration::from_secs(60), 0).unwrap_err();
        assert!(matches!(err, TurnstileError::InvalidPolicy { .. }));
    }

    #[test]
    fn test_policy_rejects_blank_name() {
        assert!(LimiterPolicy::new("  ", Duration::from_secs(1), 1).is_err());
    }

    #[test]
    fn test_policy_from_unit_config() {
        let yaml = r#"
name: export
max_requests: 10
unit: hour
"#;
        let config: PolicyConfig = serde_yaml::from_str(yaml).unwrap();
        let policy = LimiterPolicy::try_from(&config).unwrap();
        assert_eq!(policy.window(), Duration::from_secs(3600));
        assert_eq!(policy.max_requests(), 10);
    }

    #[test]
    fn test_policy_config_requires_exactly_one_window() {
        let mut config = PolicyConfig::new("search", 60, 5);
        config.unit = Some(TimeUnit::Minute);
        assert!(LimiterPolicy::try_from(&config).is_err());

        config.window_seconds = None;
        config.unit = None;
        assert!(LimiterPolicy::try_from(&config).is_err());
    }
}
