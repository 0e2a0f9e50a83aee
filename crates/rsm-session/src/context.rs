//! Request-scoped session state.

use rsm_codec::SessionMetadata;

use crate::session::Session;

/// State carried through one request.
///
/// A collaborator creates one per request and passes it to every
/// [`SessionManager`](crate::SessionManager) call made for that request.
#[derive(Debug, Default)]
pub struct RequestContext {
    pub(crate) session: Option<Session>,
    pub(crate) session_id: Option<String>,
    pub(crate) metadata: Option<SessionMetadata>,
    pub(crate) persisted: bool,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Attribute hash recorded at the last load or persist.
    pub fn metadata(&self) -> Option<&SessionMetadata> {
        self.metadata.as_ref()
    }

    /// Whether the current session is known to exist in the store.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub(crate) fn attach(
        &mut self,
        session: Session,
        metadata: Option<SessionMetadata>,
        persisted: bool,
    ) -> &mut Session {
        self.session_id = Some(session.id().to_string());
        self.metadata = metadata;
        self.persisted = persisted;
        self.session.insert(session)
    }

    /// Drop everything; the next lookup starts from the store.
    pub fn clear(&mut self) {
        self.session = None;
        self.session_id = None;
        self.metadata = None;
        self.persisted = false;
    }
}
