//! Configuration types.

use std::time::Duration;

use rsm_session::{ManagerConfig, PersistenceStrategy, UnsupportedValuePolicy};
use rsm_storage::RedisConfig;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Root configuration.
///
/// ```toml
/// [session]
/// persistence_strategy = "on_change"
/// timeout_secs = 1800
///
/// [storage]
/// url = "redis://127.0.0.1:6379/0"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsmConfig {
    /// Session manager settings.
    pub session: Option<SessionSection>,

    /// Backing store settings.
    pub storage: Option<StorageSection>,
}

impl RsmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: RsmConfig) {
        if other.session.is_some() {
            self.session = other.session;
        }
        if other.storage.is_some() {
            self.storage = other.storage;
        }
    }

    /// The `[session]` section, or its defaults.
    pub fn session(&self) -> SessionSection {
        self.session.clone().unwrap_or_default()
    }

    /// The `[storage]` section, or its defaults.
    pub fn storage(&self) -> StorageSection {
        self.storage.clone().unwrap_or_default()
    }
}

/// `[session]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// `always` or `on_change`, case-insensitive.
    pub persistence_strategy: String,
    /// Idle lifetime in seconds; the TTL applied on every persist.
    pub timeout_secs: u64,
    /// Attribute names matching this regex are never stored.
    pub skip_attributes: Option<String>,
    /// Request paths matching this regex bypass session handling.
    pub skip_urls: Option<String>,
    /// Id allocation attempts before giving up. 0 means unbounded.
    pub max_id_attempts: u32,
    /// Handling of attribute values that cannot be stored.
    pub unsupported_values: UnsupportedValuePolicy,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            persistence_strategy: PersistenceStrategy::default().to_string(),
            timeout_secs: rsm_session::DEFAULT_SESSION_TIMEOUT.as_secs(),
            skip_attributes: None,
            skip_urls: None,
            max_id_attempts: 0,
            unsupported_values: UnsupportedValuePolicy::default(),
        }
    }
}

impl SessionSection {
    /// Build the session manager configuration.
    pub fn to_manager_config(&self) -> Result<ManagerConfig> {
        let strategy = self
            .persistence_strategy
            .parse::<PersistenceStrategy>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "session.persistence_strategy",
                message: e.to_string(),
            })?;

        if self.timeout_secs > i32::MAX as u64 {
            return Err(ConfigError::InvalidValue {
                field: "session.timeout_secs",
                message: format!("{} exceeds {}", self.timeout_secs, i32::MAX),
            });
        }

        let mut config = ManagerConfig::new()
            .with_strategy(strategy)
            .with_session_timeout(Duration::from_secs(self.timeout_secs))
            .with_unsupported_values(self.unsupported_values);

        if let Some(pattern) = &self.skip_attributes {
            config = config.with_skip_attributes(pattern.clone());
        }
        if let Some(pattern) = &self.skip_urls {
            config = config.with_skip_urls(pattern.clone());
        }
        if self.max_id_attempts > 0 {
            config = config.with_max_id_attempts(self.max_id_attempts);
        }
        Ok(config)
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Redis connection URL.
    pub url: String,
    /// Connection and response timeout in milliseconds. 0 selects the default.
    pub timeout_ms: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            timeout_ms: rsm_storage::DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl StorageSection {
    /// Build the Redis client configuration.
    pub fn to_redis_config(&self) -> RedisConfig {
        RedisConfig::new(self.url.clone()).with_timeout(Duration::from_millis(self.timeout_ms))
    }
}
