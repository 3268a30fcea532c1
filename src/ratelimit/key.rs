//! Window key generation and handling.

/// A key that uniquely identifies one client's window under one policy.
///
/// Identifiers are scoped by policy name, so the same client is counted
/// independently under every policy it passes through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    /// The policy this window is counted against
    pub policy: String,
    /// The client identifier produced by an extractor
    pub identifier: String,
}

impl WindowKey {
    /// Create a new window key from a policy name and an identifier.
    pub fn new(policy: &str, identifier: &str) -> Self {
        Self {
            policy: policy.to_string(),
            identifier: identifier.to_string(),
        }
    }
}

impl std::fmt::Display for WindowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.policy, self.identifier)
    }
}
