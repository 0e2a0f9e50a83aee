//! Write-back policy: when a session must be persisted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// When sessions are written back at the end of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceStrategy {
    /// Persist only on change (dirty flag set, attribute hash changed, ...).
    OnChange,
    /// Persist on every request.
    #[default]
    Always,
}

impl PersistenceStrategy {
    /// Whether every request forces a save.
    pub fn saves_always(self) -> bool {
        self == PersistenceStrategy::Always
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PersistenceStrategy::OnChange => "on_change",
            PersistenceStrategy::Always => "always",
        }
    }
}

impl fmt::Display for PersistenceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersistenceStrategy {
    type Err = SessionError;

    /// Case-insensitive; accepts `on_change`, `ON_CHANGE`, `on-change` and `always`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "on_change" => Ok(PersistenceStrategy::OnChange),
            "always" => Ok(PersistenceStrategy::Always),
            _ => Err(SessionError::InvalidStrategy(s.to_string())),
        }
    }
}

/// What to do with an attribute value outside the supported union.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedValuePolicy {
    /// Fail the write with the encode error.
    #[default]
    Reject,
    /// Store `Nil` instead and log a warning.
    SubstituteNil,
}

/// Decide whether a session must be written.
///
/// A write happens when it is forced, the session is dirty, it was never
/// confirmed persisted, or its attribute hash moved since the last persist.
pub fn should_persist(
    force_save: bool,
    dirty: bool,
    last_hash: i64,
    current_hash: i64,
    ever_persisted: bool,
) -> bool {
    force_save || dirty || !ever_persisted || last_hash != current_hash
}

/// Whether a write is already certain before hashing the attributes.
pub(crate) fn persist_without_hash(force_save: bool, dirty: bool, ever_persisted: bool) -> bool {
    force_save || dirty || !ever_persisted
}
