//! Dirty tracking for in-memory session state.

use rsm_codec::AttributeValue;

/// Whether in-memory state diverges from what was last persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DirtyState {
    #[default]
    Clean,
    Dirty,
}

/// Per-session dirty flag.
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    state: DirtyState,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark clean, after a successful persist or a fresh load.
    pub fn reset(&mut self) {
        self.state = DirtyState::Clean;
    }

    pub fn mark_dirty(&mut self) {
        self.state = DirtyState::Dirty;
    }

    pub fn is_dirty(&self) -> bool {
        self.state == DirtyState::Dirty
    }

    pub fn state(&self) -> DirtyState {
        self.state
    }
}

/// Decide whether replacing `prev` with `next` is a state change.
///
/// An absent value and an explicit `Nil` both count as nil. Two nils are not
/// a change; nil against a value is. Values of different kinds always differ,
/// so `Int(1)` replaced by `Float(1.0)` is a change.
pub fn is_changed(prev: Option<&AttributeValue>, next: Option<&AttributeValue>) -> bool {
    let prev = prev.filter(|v| !v.is_nil());
    let next = next.filter(|v| !v.is_nil());

    match (prev, next) {
        (None, None) => false,
        (Some(prev), Some(next)) => prev != next,
        _ => true,
    }
}
