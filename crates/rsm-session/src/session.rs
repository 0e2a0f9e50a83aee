//! The live session object handed to request handlers.

use std::any::Any;
use std::sync::Arc;

use regex::Regex;
use rsm_codec::{AttributeValue, Attributes, EncodeError, PersistedSession};
use tracing::{trace, warn};

use crate::dirty::{DirtyTracker, is_changed};
use crate::policy::UnsupportedValuePolicy;

/// Authenticated identity attached to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Attribute rules shared by every session of one manager.
#[derive(Debug, Default)]
pub(crate) struct AttributeRules {
    pub(crate) skip: Option<Regex>,
    pub(crate) unsupported: UnsupportedValuePolicy,
}

impl AttributeRules {
    fn skips(&self, name: &str) -> bool {
        self.skip.as_ref().is_some_and(|re| re.is_match(name))
    }
}

/// Current time in milliseconds since the epoch.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A session's state plus its dirty flag.
///
/// Attribute writes that change state mark the session dirty; writes of an
/// equal value do not. Removing an attribute always marks it dirty.
#[derive(Debug, Clone)]
pub struct Session {
    record: PersistedSession,
    tracker: DirtyTracker,
    rules: Arc<AttributeRules>,
}

impl Session {
    /// A brand-new session: valid, `is_new`, created now.
    pub(crate) fn create(id: String, max_inactive_interval: i32, rules: Arc<AttributeRules>) -> Self {
        let now = now_millis();
        let record = PersistedSession {
            creation_time: now,
            last_accessed_time: now,
            max_inactive_interval,
            is_new: true,
            is_valid: true,
            this_accessed_time: now,
            id,
            principal_name: None,
            principal_roles: None,
            attributes: Attributes::new(),
        };

        Self {
            record,
            tracker: DirtyTracker::new(),
            rules,
        }
    }

    /// Rebuild a session from its persisted form. Starts clean.
    pub(crate) fn restore(record: PersistedSession, rules: Arc<AttributeRules>) -> Self {
        Self {
            record,
            tracker: DirtyTracker::new(),
            rules,
        }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.record.id = id;
    }

    pub fn creation_time(&self) -> i64 {
        self.record.creation_time
    }

    pub fn last_accessed_time(&self) -> i64 {
        self.record.last_accessed_time
    }

    pub fn this_accessed_time(&self) -> i64 {
        self.record.this_accessed_time
    }

    pub fn max_inactive_interval(&self) -> i32 {
        self.record.max_inactive_interval
    }

    pub(crate) fn set_max_inactive_interval(&mut self, secs: i32) {
        self.record.max_inactive_interval = secs;
    }

    pub fn is_new(&self) -> bool {
        self.record.is_new
    }

    pub(crate) fn set_new(&mut self, is_new: bool) {
        self.record.is_new = is_new;
    }

    pub fn is_valid(&self) -> bool {
        self.record.is_valid
    }

    pub(crate) fn set_valid(&mut self, valid: bool) {
        self.record.is_valid = valid;
    }

    /// Mark the session invalid. The manager deletes it at the end of the request.
    pub fn invalidate(&mut self) {
        trace!(session_id = %self.record.id, "Session invalidated");
        self.record.is_valid = false;
    }

    /// Record the start of a request.
    pub fn access(&mut self) {
        self.record.this_accessed_time = now_millis();
    }

    /// Record the end of a request.
    pub fn end_access(&mut self) {
        self.record.is_new = false;
        self.record.last_accessed_time = self.record.this_accessed_time;
        self.record.this_accessed_time = now_millis();
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.record.attributes.get(name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.record.attributes.keys().map(String::as_str)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.record.attributes
    }

    /// Set an attribute. Setting `Nil` removes it.
    ///
    /// Returns `false` when the name matches the skip pattern and the write
    /// was ignored.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) -> bool {
        if self.rules.skips(name) {
            trace!(session_id = %self.record.id, key = %name, "Ignoring set_attribute");
            return false;
        }

        let value = value.into();
        let prev = if value.is_nil() {
            self.record.attributes.remove(name)
        } else {
            self.record.attributes.insert(name.to_string(), value.clone())
        };

        let next = (!value.is_nil()).then_some(&value);
        if is_changed(prev.as_ref(), next) {
            self.tracker.mark_dirty();
        }
        true
    }

    /// Set an attribute from a dynamically typed value.
    ///
    /// Values outside the supported union are rejected or replaced by `Nil`
    /// according to the manager's [`UnsupportedValuePolicy`].
    pub fn set_dynamic_attribute(&mut self, name: &str, value: &dyn Any) -> Result<bool, EncodeError> {
        let value = match AttributeValue::from_any(value) {
            Ok(value) => value,
            Err(e) => match self.rules.unsupported {
                UnsupportedValuePolicy::Reject => return Err(e),
                UnsupportedValuePolicy::SubstituteNil => {
                    warn!(
                        session_id = %self.record.id,
                        key = %name,
                        error = %e,
                        "Attribute value cannot be stored, substituting nil"
                    );
                    AttributeValue::Nil
                }
            },
        };
        Ok(self.set_attribute(name, value))
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attribute(&mut self, name: &str) -> Option<AttributeValue> {
        self.tracker.mark_dirty();
        self.record.attributes.remove(name)
    }

    pub fn principal(&self) -> Option<Principal> {
        self.record.principal_name.as_ref().map(|name| Principal {
            name: name.clone(),
            roles: self.record.principal_roles.clone().unwrap_or_default(),
        })
    }

    /// Attach or clear the authenticated principal. Always marks the session dirty.
    pub fn set_principal(&mut self, principal: Option<Principal>) {
        self.tracker.mark_dirty();
        match principal {
            Some(p) => {
                self.record.principal_name = Some(p.name);
                self.record.principal_roles = Some(p.roles);
            }
            None => {
                self.record.principal_name = None;
                self.record.principal_roles = None;
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.tracker.is_dirty()
    }

    /// Force the next save to write.
    pub fn mark_dirty(&mut self) {
        self.tracker.mark_dirty();
    }

    pub(crate) fn reset_dirty_tracking(&mut self) {
        self.tracker.reset();
    }

    /// The persisted form, without skipped or nil attributes.
    pub fn to_record(&self) -> PersistedSession {
        let mut record = self.record.clone();
        record
            .attributes
            .retain(|name, value| !value.is_nil() && !self.rules.skips(name));
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::create("s1".to_string(), 1800, Arc::new(AttributeRules::default()))
    }

    fn session_skipping(pattern: &str) -> Session {
        let rules = AttributeRules {
            skip: Some(Regex::new(&format!("^(?:{pattern})$")).unwrap()),
            unsupported: UnsupportedValuePolicy::Reject,
        };
        Session::create("s1".to_string(), 1800, Arc::new(rules))
    }

    #[test]
    fn test_new_session_is_clean() {
        let s = session();
        assert!(s.is_new());
        assert!(s.is_valid());
        assert!(!s.is_dirty());
        assert_eq!(s.max_inactive_interval(), 1800);
    }

    #[test]
    fn test_same_value_does_not_dirty() {
        let mut s = session();
        s.set_attribute("k", "v");
        s.reset_dirty_tracking();

        s.set_attribute("k", "v");
        assert!(!s.is_dirty());

        s.set_attribute("k", "w");
        assert!(s.is_dirty());
    }

    #[test]
    fn test_equal_map_content_does_not_dirty() {
        use std::collections::HashMap;

        let content: Vec<(String, i64)> = (0..16).map(|i| (format!("pref-{i}"), i)).collect();
        let mut s = session();
        s.set_attribute("prefs", content.iter().cloned().collect::<HashMap<_, _>>());
        let before = rsm_codec::attributes_hash(&s.to_record().attributes).unwrap();
        s.reset_dirty_tracking();

        s.set_attribute("prefs", content.into_iter().rev().collect::<HashMap<_, _>>());
        assert!(!s.is_dirty());
        let after = rsm_codec::attributes_hash(&s.to_record().attributes).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_nil_removes_attribute() {
        let mut s = session();
        s.set_attribute("k", 1);
        s.reset_dirty_tracking();

        s.set_attribute("k", AttributeValue::Nil);
        assert!(s.attribute("k").is_none());
        assert!(s.is_dirty());
    }

    #[test]
    fn test_nil_on_absent_key_is_noop() {
        let mut s = session();
        s.set_attribute("k", AttributeValue::Nil);
        assert!(!s.is_dirty());
    }

    #[test]
    fn test_remove_always_dirties() {
        let mut s = session();
        assert_eq!(s.remove_attribute("missing"), None);
        assert!(s.is_dirty());
    }

    #[test]
    fn test_skip_pattern_ignores_writes() {
        let mut s = session_skipping("tmp\\..*");

        assert!(!s.set_attribute("tmp.token", "x"));
        assert!(s.attribute("tmp.token").is_none());
        assert!(!s.is_dirty());

        assert!(s.set_attribute("user", "alice"));
        assert!(s.is_dirty());
    }

    #[test]
    fn test_skip_pattern_matches_whole_name() {
        let mut s = session_skipping("tmp");
        assert!(s.set_attribute("tmpfile", "x"));
    }

    #[test]
    fn test_principal_round_trip() {
        let mut s = session();
        s.set_principal(Some(Principal::new("alice").with_roles(["admin", "user"])));

        assert!(s.is_dirty());
        let p = s.principal().unwrap();
        assert_eq!(p.name, "alice");
        assert!(p.has_role("admin"));

        let record = s.to_record();
        assert_eq!(record.principal_name.as_deref(), Some("alice"));
        assert_eq!(record.principal_roles.unwrap().len(), 2);
    }

    #[test]
    fn test_dynamic_attribute_rejected() {
        struct Opaque;
        let mut s = session();
        assert!(s.set_dynamic_attribute("k", &Opaque).is_err());
        assert!(s.attribute("k").is_none());
    }

    #[test]
    fn test_dynamic_attribute_substituted() {
        struct Opaque;
        let rules = AttributeRules {
            skip: None,
            unsupported: UnsupportedValuePolicy::SubstituteNil,
        };
        let mut s = Session::create("s1".to_string(), 60, Arc::new(rules));
        s.set_attribute("k", 5);

        assert!(s.set_dynamic_attribute("k", &Opaque).unwrap());
        assert!(s.attribute("k").is_none());
    }

    #[test]
    fn test_end_access_rolls_timestamps() {
        let mut s = session();
        let started = s.this_accessed_time();
        s.end_access();

        assert!(!s.is_new());
        assert_eq!(s.last_accessed_time(), started);
        assert!(s.this_accessed_time() >= started);
    }
}
