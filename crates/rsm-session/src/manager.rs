//! Session lifecycle against a storage client.

use std::sync::Arc;

use regex::Regex;
use rsm_codec::{PersistedSession, SessionMetadata, attributes_hash, deserialize, serialize};
use rsm_storage::{StorageClient, StorageError};
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::config::ManagerConfig;
use crate::context::RequestContext;
use crate::error::{Result, SessionError};
use crate::policy::{persist_without_hash, should_persist};
use crate::session::{AttributeRules, Session};

/// Value stored under a freshly claimed id until the first real write.
pub const PLACEHOLDER: &[u8] = b"null";

/// Compile `pattern` so that it must match the whole input.
fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| SessionError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn generate_id() -> String {
    Uuid::new_v4().simple().to_string().to_ascii_uppercase()
}

/// Creates, loads, saves and removes sessions.
///
/// The manager holds no per-request state; everything request-scoped lives in
/// the [`RequestContext`] passed to each call. Cloning is cheap and clones
/// share the storage client.
pub struct SessionManager<S: StorageClient + ?Sized> {
    storage: Arc<S>,
    config: ManagerConfig,
    rules: Arc<AttributeRules>,
    skip_urls: Option<Arc<Regex>>,
}

impl<S: StorageClient + ?Sized> Clone for SessionManager<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            config: self.config.clone(),
            rules: Arc::clone(&self.rules),
            skip_urls: self.skip_urls.clone(),
        }
    }
}

impl<S: StorageClient + ?Sized> SessionManager<S> {
    /// Create a manager, compiling the configured skip patterns.
    pub fn new(config: ManagerConfig, storage: Arc<S>) -> Result<Self> {
        let skip = config.skip_attributes.as_deref().map(compile_pattern).transpose()?;
        let skip_urls = config
            .skip_urls
            .as_deref()
            .map(compile_pattern)
            .transpose()?
            .map(Arc::new);

        debug!(
            strategy = %config.persistence_strategy,
            timeout_secs = config.timeout_secs(),
            "Session manager ready"
        );

        Ok(Self {
            storage,
            rules: Arc::new(AttributeRules {
                skip,
                unsupported: config.unsupported_values,
            }),
            skip_urls,
            config,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Whether every request ends with a forced save.
    pub fn saves_always(&self) -> bool {
        self.config.persistence_strategy.saves_always()
    }

    /// Whether session handling should be skipped for this request path.
    pub fn should_skip_url(&self, path: &str) -> bool {
        self.skip_urls.as_ref().is_some_and(|re| re.is_match(path))
    }

    fn max_inactive_interval(&self) -> i32 {
        i32::try_from(self.config.timeout_secs()).unwrap_or(i32::MAX)
    }

    /// Claim an unused id in the store.
    ///
    /// `requested` is tried first; after that random ids are generated until a
    /// claim succeeds. The claim holds [`PLACEHOLDER`] and expires with the
    /// session timeout if it is never overwritten.
    pub async fn allocate_id(&self, requested: Option<&str>) -> Result<String> {
        let ttl = self.config.timeout_secs();
        let limit = self.config.max_id_attempts.filter(|max| *max > 0);
        let mut candidate = requested.map_or_else(generate_id, str::to_string);
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            if self
                .storage
                .set_if_absent_with_ttl(&candidate, ttl, PLACEHOLDER)
                .await?
            {
                trace!(session_id = %candidate, attempts, "Claimed session id");
                return Ok(candidate);
            }

            debug!(session_id = %candidate, attempts, "Session id already taken");
            if limit.is_some_and(|max| attempts >= max) {
                return Err(SessionError::IdAllocationExhausted { attempts });
            }
            candidate = generate_id();
        }
    }

    /// Create a new session and persist it immediately.
    ///
    /// On failure the context is cleared and the error returned.
    pub async fn create_session<'a>(
        &self,
        ctx: &'a mut RequestContext,
        requested_id: Option<&str>,
    ) -> Result<&'a mut Session> {
        let id = match self.allocate_id(requested_id).await {
            Ok(id) => id,
            Err(e) => {
                ctx.clear();
                return Err(e);
            }
        };

        let mut session = Session::create(id, self.max_inactive_interval(), Arc::clone(&self.rules));
        let mut metadata = None;
        let mut persisted = false;

        if let Err(e) = self
            .persist(&mut session, &mut metadata, &mut persisted, true)
            .await
        {
            ctx.clear();
            return Err(e);
        }

        debug!(session_id = %session.id(), "Session created");
        Ok(ctx.attach(session, metadata, persisted))
    }

    /// Fetch and decode a stored session without touching any context.
    ///
    /// Returns `None` when the key is absent. A key holding only the claim
    /// placeholder is a [`StorageError::PlaceholderCollision`].
    pub async fn load(&self, id: &str) -> Result<Option<(PersistedSession, SessionMetadata)>> {
        let Some(data) = self.storage.get(id).await? else {
            return Ok(None);
        };

        if data == PLACEHOLDER {
            return Err(StorageError::PlaceholderCollision { key: id.to_string() }.into());
        }

        Ok(Some(deserialize(&data)?))
    }

    /// Look up the session for `id`, attaching it to the context.
    ///
    /// A `None` id clears the context. The context's own session is returned
    /// without a store round trip when the ids match.
    pub async fn find_session<'a>(
        &self,
        ctx: &'a mut RequestContext,
        id: Option<&str>,
    ) -> Result<Option<&'a mut Session>> {
        let Some(id) = id else {
            ctx.clear();
            return Ok(None);
        };

        if ctx.session_id.as_deref() == Some(id) {
            return Ok(ctx.session.as_mut());
        }

        let Some((record, metadata)) = self.load(id).await? else {
            trace!(session_id = %id, "Session not found");
            ctx.clear();
            return Ok(None);
        };

        let mut session = Session::restore(record, Arc::clone(&self.rules));
        session.set_id(id.to_string());
        session.set_new(false);
        session.set_max_inactive_interval(self.max_inactive_interval());
        session.access();
        session.set_valid(true);
        session.reset_dirty_tracking();

        debug!(session_id = %id, attr_hash = metadata.attr_hash, "Session loaded");
        Ok(Some(ctx.attach(session, Some(metadata), true)))
    }

    /// Like [`find_session`](Self::find_session) but any failure degrades to
    /// "no session" with a warning.
    pub async fn resolve_session<'a>(
        &self,
        ctx: &'a mut RequestContext,
        id: Option<&str>,
    ) -> Option<&'a mut Session> {
        match self.find_session(ctx, id).await.map(|s| s.is_some()) {
            Ok(true) => ctx.session.as_mut(),
            Ok(false) => None,
            Err(e) => {
                warn!(session_id = ?id, error = %e, "Failed to load session, treating as absent");
                ctx.clear();
                None
            }
        }
    }

    /// Write the context's session if the persistence policy requires it.
    ///
    /// Returns whether a write happened. A context without a session is a
    /// no-op.
    pub async fn save(&self, ctx: &mut RequestContext, force: bool) -> Result<bool> {
        let RequestContext {
            session,
            metadata,
            persisted,
            ..
        } = ctx;

        match session {
            Some(session) => self.persist(session, metadata, persisted, force).await,
            None => Ok(false),
        }
    }

    async fn persist(
        &self,
        session: &mut Session,
        metadata: &mut Option<SessionMetadata>,
        persisted: &mut bool,
        force: bool,
    ) -> Result<bool> {
        let ttl = self.config.timeout_secs();
        let dirty = session.is_dirty();
        let ever_persisted = *persisted && metadata.is_some();
        let record = session.to_record();

        let mut current_hash = None;
        let write = if persist_without_hash(force, dirty, ever_persisted) {
            true
        } else {
            let hash = attributes_hash(&record.attributes)?;
            current_hash = Some(hash);
            let last_hash = metadata.map_or(hash, |m| m.attr_hash);
            should_persist(force, dirty, last_hash, hash, ever_persisted)
        };

        if !write {
            trace!(session_id = %session.id(), "Session unchanged, refreshing TTL only");
            self.storage.expire(session.id(), ttl).await?;
            return Ok(false);
        }

        let hash = match current_hash {
            Some(hash) => hash,
            None => attributes_hash(&record.attributes)?,
        };
        let updated = SessionMetadata::new(hash);
        let blob = serialize(&record, &updated)?;
        self.storage.set(session.id(), ttl, &blob).await?;

        session.reset_dirty_tracking();
        *metadata = Some(updated);
        *persisted = true;

        debug!(
            session_id = %session.id(),
            bytes = blob.len(),
            force,
            dirty,
            "Session persisted"
        );
        Ok(true)
    }

    /// Delete the context's session from the store and clear the context.
    ///
    /// Returns whether a stored key was removed.
    pub async fn remove(&self, ctx: &mut RequestContext) -> Result<bool> {
        let id = ctx
            .session
            .as_ref()
            .map(|s| s.id().to_string())
            .or_else(|| ctx.session_id.clone());
        ctx.clear();

        match id {
            Some(id) => self.remove_id(&id).await,
            None => Ok(false),
        }
    }

    /// Delete a stored session by id.
    pub async fn remove_id(&self, id: &str) -> Result<bool> {
        let removed = self.storage.delete(id).await?;
        debug!(session_id = %id, removed, "Session removed");
        Ok(removed)
    }

    /// Finish a request: save a valid session, delete an invalidated one.
    ///
    /// Errors are logged, never returned. The context is always cleared.
    pub async fn after_request(&self, ctx: &mut RequestContext) {
        let valid = match ctx.session.as_mut() {
            Some(session) if session.is_valid() => {
                session.end_access();
                true
            }
            Some(_) => false,
            None => {
                ctx.clear();
                return;
            }
        };

        let id = ctx.session_id.clone().unwrap_or_default();
        let result = if valid {
            self.save(ctx, self.saves_always()).await.map(drop)
        } else {
            self.remove(ctx).await.map(drop)
        };

        if let Err(e) = result {
            error!(session_id = %id, valid, error = %e, "Failed to finish session request");
        }
        ctx.clear();
    }

    /// Move the context's session to a fresh id.
    ///
    /// The new id is claimed and written before the old key is deleted, so a
    /// failure never leaves the session without a stored copy. Returns the new
    /// id, or `None` when the context has no session.
    pub async fn rotate_id(&self, ctx: &mut RequestContext) -> Result<Option<String>> {
        let Some(old_id) = ctx.session.as_ref().map(|s| s.id().to_string()) else {
            return Ok(None);
        };

        let new_id = self.allocate_id(None).await?;
        if let Some(session) = ctx.session.as_mut() {
            session.set_id(new_id.clone());
        }
        ctx.session_id = Some(new_id.clone());
        ctx.persisted = false;
        self.save(ctx, true).await?;

        self.storage.delete(&old_id).await?;
        debug!(old_id = %old_id, new_id = %new_id, "Session id rotated");
        Ok(Some(new_id))
    }

    /// Close the storage client.
    pub async fn close(&self) {
        self.storage.close().await;
    }
}
