//! Configuration for the session manager.

use std::time::Duration;

use crate::policy::{PersistenceStrategy, UnsupportedValuePolicy};

/// Default idle lifetime of a session, also used as the store TTL.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Configuration for the session manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// When sessions are written back at the end of a request.
    pub persistence_strategy: PersistenceStrategy,

    /// Session idle lifetime. Applied as the TTL on every persist.
    pub session_timeout: Duration,

    /// Attribute names matching this regex (whole name) are never stored.
    pub skip_attributes: Option<String>,

    /// Request paths matching this regex (whole path) skip session handling.
    pub skip_urls: Option<String>,

    /// Upper bound on id allocation attempts. `None` retries until an unused
    /// id is found.
    pub max_id_attempts: Option<u32>,

    /// Handling of dynamic attribute values outside the supported union.
    pub unsupported_values: UnsupportedValuePolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            persistence_strategy: PersistenceStrategy::default(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            skip_attributes: None,
            skip_urls: None,
            max_id_attempts: None,
            unsupported_values: UnsupportedValuePolicy::default(),
        }
    }
}

impl ManagerConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the persistence strategy.
    pub fn with_strategy(mut self, strategy: PersistenceStrategy) -> Self {
        self.persistence_strategy = strategy;
        self
    }

    /// Set the session timeout.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Skip attributes whose names match `pattern`.
    pub fn with_skip_attributes(mut self, pattern: impl Into<String>) -> Self {
        self.skip_attributes = Some(pattern.into());
        self
    }

    /// Skip session handling for request paths matching `pattern`.
    pub fn with_skip_urls(mut self, pattern: impl Into<String>) -> Self {
        self.skip_urls = Some(pattern.into());
        self
    }

    /// Bound the number of id allocation attempts.
    pub fn with_max_id_attempts(mut self, attempts: u32) -> Self {
        self.max_id_attempts = Some(attempts);
        self
    }

    /// Set how unsupported dynamic values are handled.
    pub fn with_unsupported_values(mut self, policy: UnsupportedValuePolicy) -> Self {
        self.unsupported_values = policy;
        self
    }

    /// Session timeout in whole seconds, as used for store TTLs and
    /// `max_inactive_interval`.
    pub fn timeout_secs(&self) -> u64 {
        self.session_timeout.as_secs()
    }
}
