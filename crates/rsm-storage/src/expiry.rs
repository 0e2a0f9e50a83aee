//! Deadline tracking for key expiration.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Tracks expiry deadlines for keys.
///
/// Keys without a deadline never expire. Uses tokio's clock so tests can
/// pause and advance time.
#[derive(Debug, Default)]
pub struct ExpiryTracker {
    /// Expiry deadline for each key that has one.
    deadlines: HashMap<String, Instant>,
}

impl ExpiryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the TTL for a key. `None` removes any deadline.
    pub fn set(&mut self, key: &str, ttl: Option<Duration>) {
        match ttl {
            Some(ttl) => {
                self.deadlines.insert(key.to_string(), Instant::now() + ttl);
            }
            None => {
                self.deadlines.remove(key);
            }
        }
    }

    /// Check if a key's deadline has passed.
    pub fn is_expired(&self, key: &str) -> bool {
        self.deadlines
            .get(key)
            .is_some_and(|deadline| Instant::now() >= *deadline)
    }

    /// Time left before a key expires, if it has a deadline.
    pub fn remaining(&self, key: &str) -> Option<Duration> {
        self.deadlines
            .get(key)
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Stop tracking a key.
    pub fn remove(&mut self, key: &str) {
        self.deadlines.remove(key);
    }

    /// Get all expired keys.
    pub fn get_expired(&self) -> Vec<String> {
        let now = Instant::now();
        self.deadlines
            .iter()
            .filter(|(_, deadline)| now >= **deadline)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Remove all expired entries and return their keys.
    pub fn drain_expired(&mut self) -> Vec<String> {
        let expired = self.get_expired();
        for key in &expired {
            self.deadlines.remove(key);
        }
        expired
    }

    /// Number of keys with a deadline.
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }
}
