//! Named policy catalogue.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::policy::{LimiterPolicy, PolicyConfig};
use crate::error::{Result, TurnstileError};

/// Catalogue of named policies, built once at startup.
///
/// Registration takes `&mut self`; once the registry is shared behind an
/// `Arc` it can only be read, so policies cannot change while serving.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<String, Arc<LimiterPolicy>>,
}

impl PolicyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from policy configuration, stopping at the first error.
    pub fn from_configs(configs: &[PolicyConfig]) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            registry.register(LimiterPolicy::try_from(config)?)?;
        }
        Ok(registry)
    }

    /// Add a policy. Fails if a policy with the same name exists.
    pub fn register(&mut self, policy: LimiterPolicy) -> Result<()> {
        if self.policies.contains_key(policy.name()) {
            return Err(TurnstileError::DuplicatePolicy(policy.name().to_string()));
        }

        info!(
            policy = policy.name(),
            window = ?policy.window(),
            max_requests = policy.max_requests(),
            "Registered rate limit policy"
        );

        self.policies
            .insert(policy.name().to_string(), Arc::new(policy));
        Ok(())
    }

    /// Look up a policy by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<LimiterPolicy>> {
        self.policies
            .get(name)
            .cloned()
            .ok_or_else(|| TurnstileError::UnknownPolicy(name.to_string()))
    }

    /// Names of all registered policies.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Get the number of registered policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether no policies are registered.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy(name: &str) -> LimiterPolicy {
        LimiterPolicy::new(name, Duration::from_secs(60), 5).unwrap()
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = PolicyRegistry::new();
        registry.register(policy("search")).unwrap();

        let resolved = registry.resolve("search").unwrap();
        assert_eq!(resolved.max_requests(), 5);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_policy_rejected() {
        let mut registry = PolicyRegistry::new();
        registry.register(policy("search")).unwrap();

        let err = registry.register(policy("search")).unwrap_err();
        assert!(matches!(err, TurnstileError::DuplicatePolicy(ref name) if name == "search"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let registry = PolicyRegistry::new();

        let err = registry.resolve("export").unwrap_err();
        assert!(matches!(err, TurnstileError::UnknownPolicy(ref name) if name == "export"));
    }

    #[test]
    fn test_from_configs() {
        let configs = vec![PolicyConfig::new("search", 60, 5), PolicyConfig::new("export", 3600, 10)];
        let registry = PolicyRegistry::from_configs(&configs).unwrap();

        let mut names: Vec<&str> = registry.names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["export", "search"]);
    }

    #[test]
    fn test_from_configs_rejects_duplicates_and_invalid() {
        let duplicate = vec![PolicyConfig::new("search", 60, 5), PolicyConfig::new("search", 30, 1)];
        assert!(matches!(
            PolicyRegistry::from_configs(&duplicate),
            Err(TurnstileError::DuplicatePolicy(_))
        ));

        let invalid = vec![PolicyConfig::new("search", 0, 5)];
        assert!(matches!(
            PolicyRegistry::from_configs(&invalid),
            Err(TurnstileError::InvalidPolicy { .. })
        ));
    }
}
