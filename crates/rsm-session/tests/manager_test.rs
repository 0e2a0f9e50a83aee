//! Session lifecycle tests against the in-memory store and failing stores.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rsm_codec::{AttributeValue, PersistedSession, SessionMetadata, serialize};
use rsm_session::{
    ManagerConfig, PLACEHOLDER, PersistenceStrategy, Principal, RequestContext, SessionError,
    SessionManager,
};
use rsm_storage::{MemoryStorageClient, StorageClient, StorageError};

/// Memory store that counts unconditional writes.
#[derive(Default)]
struct CountingStorage {
    inner: MemoryStorageClient,
    writes: AtomicUsize,
}

impl CountingStorage {
    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageClient for CountingStorage {
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        ttl_secs: u64,
        payload: &[u8],
    ) -> rsm_storage::Result<bool> {
        self.inner.set_if_absent_with_ttl(key, ttl_secs, payload).await
    }

    async fn set_if_absent(&self, key: &str, payload: &[u8]) -> rsm_storage::Result<bool> {
        self.inner.set_if_absent(key, payload).await
    }

    async fn set(&self, key: &str, ttl_secs: u64, payload: &[u8]) -> rsm_storage::Result<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, ttl_secs, payload).await
    }

    async fn get(&self, key: &str) -> rsm_storage::Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> rsm_storage::Result<bool> {
        self.inner.expire(key, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> rsm_storage::Result<bool> {
        self.inner.delete(key).await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

/// Store whose every operation fails, or whose claims always lose.
struct BrokenStorage {
    claims_taken: bool,
}

fn transport(operation: &'static str) -> StorageError {
    StorageError::Transport {
        operation,
        message: "connection refused".to_string(),
    }
}

#[async_trait]
impl StorageClient for BrokenStorage {
    async fn set_if_absent_with_ttl(&self, _: &str, _: u64, _: &[u8]) -> rsm_storage::Result<bool> {
        if self.claims_taken {
            Ok(false)
        } else {
            Err(transport("set_if_absent"))
        }
    }

    async fn set_if_absent(&self, key: &str, payload: &[u8]) -> rsm_storage::Result<bool> {
        self.set_if_absent_with_ttl(key, 0, payload).await
    }

    async fn set(&self, _: &str, _: u64, _: &[u8]) -> rsm_storage::Result<bool> {
        Err(transport("set"))
    }

    async fn get(&self, _: &str) -> rsm_storage::Result<Option<Vec<u8>>> {
        Err(transport("get"))
    }

    async fn expire(&self, _: &str, _: u64) -> rsm_storage::Result<bool> {
        Err(transport("expire"))
    }

    async fn delete(&self, _: &str) -> rsm_storage::Result<bool> {
        Err(transport("delete"))
    }

    async fn close(&self) {}
}

fn manager(strategy: PersistenceStrategy) -> (SessionManager<CountingStorage>, Arc<CountingStorage>) {
    let storage = Arc::new(CountingStorage::default());
    let config = ManagerConfig::default().with_strategy(strategy);
    let manager = SessionManager::new(config, Arc::clone(&storage)).unwrap();
    (manager, storage)
}

/// Create a session holding one attribute and end the request.
async fn seeded(manager: &SessionManager<CountingStorage>) -> String {
    let mut ctx = RequestContext::new();
    let session = manager.create_session(&mut ctx, None).await.unwrap();
    session.set_attribute("user", "alice");
    let id = session.id().to_string();
    manager.after_request(&mut ctx).await;
    id
}

#[tokio::test]
async fn test_create_persists_immediately() {
    let (manager, storage) = manager(PersistenceStrategy::OnChange);
    let mut ctx = RequestContext::new();

    let session = manager.create_session(&mut ctx, None).await.unwrap();
    assert!(session.is_new());
    assert!(!session.is_dirty());
    let id = session.id().to_string();

    assert_eq!(storage.writes(), 1);
    assert!(ctx.is_persisted());
    assert_eq!(ctx.session_id(), Some(id.as_str()));

    let (record, _) = manager.load(&id).await.unwrap().unwrap();
    assert_eq!(record.id, id);
    assert!(record.is_new);
    assert_eq!(record.max_inactive_interval, 1800);
}

#[tokio::test]
async fn test_requested_id_is_honoured_when_free() {
    let (manager, _) = manager(PersistenceStrategy::Always);
    let mut ctx = RequestContext::new();

    let session = manager.create_session(&mut ctx, Some("wanted")).await.unwrap();
    assert_eq!(session.id(), "wanted");

    let mut other = RequestContext::new();
    let session = manager.create_session(&mut other, Some("wanted")).await.unwrap();
    assert_ne!(session.id(), "wanted");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_get_distinct_ids() {
    let (manager, _) = manager(PersistenceStrategy::Always);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move {
                let mut ctx = RequestContext::new();
                let session = manager.create_session(&mut ctx, Some("same")).await.unwrap();
                session.id().to_string()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap());
    }
    assert_eq!(ids.len(), 16);
    assert!(ids.contains("same"));
}

#[tokio::test]
async fn test_find_restores_session_state() {
    let (manager, _) = manager(PersistenceStrategy::OnChange);
    let id = seeded(&manager).await;

    let mut ctx = RequestContext::new();
    let session = manager.find_session(&mut ctx, Some(id.as_str())).await.unwrap().unwrap();

    assert_eq!(session.id(), id);
    assert!(!session.is_new());
    assert!(session.is_valid());
    assert!(!session.is_dirty());
    assert_eq!(session.attribute("user").and_then(AttributeValue::as_str), Some("alice"));
    assert!(ctx.is_persisted());
    assert!(ctx.metadata().is_some());
}

#[tokio::test]
async fn test_find_reuses_context_session() {
    let (manager, storage) = manager(PersistenceStrategy::OnChange);
    let id = seeded(&manager).await;

    let mut ctx = RequestContext::new();
    let session = manager.find_session(&mut ctx, Some(id.as_str())).await.unwrap().unwrap();
    session.set_attribute("unsaved", 1);

    // Deleting the key proves the second lookup never reaches the store.
    storage.delete(&id).await.unwrap();
    let session = manager.find_session(&mut ctx, Some(id.as_str())).await.unwrap().unwrap();
    assert!(session.attribute("unsaved").is_some());
}

#[tokio::test]
async fn test_find_missing_and_none() {
    let (manager, _) = manager(PersistenceStrategy::OnChange);
    let id = seeded(&manager).await;

    let mut ctx = RequestContext::new();
    assert!(manager.find_session(&mut ctx, Some("nope")).await.unwrap().is_none());
    assert!(!ctx.is_persisted());

    manager.find_session(&mut ctx, Some(id.as_str())).await.unwrap();
    assert!(manager.find_session(&mut ctx, None).await.unwrap().is_none());
    assert!(ctx.session().is_none());
    assert!(ctx.session_id().is_none());
}

#[tokio::test]
async fn test_placeholder_is_a_collision() {
    let (manager, _) = manager(PersistenceStrategy::OnChange);
    let id = manager.allocate_id(None).await.unwrap();

    let mut ctx = RequestContext::new();
    let err = manager.find_session(&mut ctx, Some(id.as_str())).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Storage(StorageError::PlaceholderCollision { .. })
    ));

    assert!(manager.resolve_session(&mut ctx, Some(id.as_str())).await.is_none());
    assert!(ctx.session_id().is_none());
}

#[tokio::test]
async fn test_claimed_id_holds_placeholder() {
    let (manager, storage) = manager(PersistenceStrategy::OnChange);
    let id = manager.allocate_id(Some("claimed")).await.unwrap();

    assert_eq!(id, "claimed");
    assert_eq!(storage.get("claimed").await.unwrap(), Some(PLACEHOLDER.to_vec()));
}

#[tokio::test]
async fn test_corrupt_blob_is_a_decode_error() {
    let (manager, storage) = manager(PersistenceStrategy::OnChange);
    storage.set("bad", 0, &[0xd3, 0x00]).await.unwrap();

    let mut ctx = RequestContext::new();
    let err = manager.find_session(&mut ctx, Some("bad")).await.unwrap_err();
    assert!(matches!(err, SessionError::Decode(_)));
}

#[tokio::test]
async fn test_on_change_skips_clean_sessions() {
    let (manager, storage) = manager(PersistenceStrategy::OnChange);
    let id = seeded(&manager).await;
    let before = storage.writes();

    let mut ctx = RequestContext::new();
    let session = manager.find_session(&mut ctx, Some(id.as_str())).await.unwrap().unwrap();
    session.set_attribute("user", "alice");
    assert!(!manager.save(&mut ctx, false).await.unwrap());
    assert_eq!(storage.writes(), before);

    let session = ctx.session_mut().unwrap();
    session.set_attribute("user", "bob");
    assert!(manager.save(&mut ctx, false).await.unwrap());
    assert_eq!(storage.writes(), before + 1);
    assert!(!ctx.session().unwrap().is_dirty());

    manager.after_request(&mut ctx).await;
    assert_eq!(storage.writes(), before + 1);
}

#[tokio::test]
async fn test_always_writes_every_request() {
    let (manager, storage) = manager(PersistenceStrategy::Always);
    let id = seeded(&manager).await;
    let before = storage.writes();

    let mut ctx = RequestContext::new();
    manager.find_session(&mut ctx, Some(id.as_str())).await.unwrap();
    manager.after_request(&mut ctx).await;

    assert_eq!(storage.writes(), before + 1);
    assert!(ctx.session().is_none());
}

#[tokio::test]
async fn test_stale_hash_triggers_write() {
    let (manager, storage) = manager(PersistenceStrategy::OnChange);

    let mut record = PersistedSession::new("stale");
    record
        .attributes
        .insert("k".to_string(), AttributeValue::from("v"));
    let blob = serialize(&record, &SessionMetadata::new(0)).unwrap();
    storage.set("stale", 0, &blob).await.unwrap();
    let before = storage.writes();

    let mut ctx = RequestContext::new();
    manager.find_session(&mut ctx, Some("stale")).await.unwrap().unwrap();
    assert!(manager.save(&mut ctx, false).await.unwrap());
    assert_eq!(storage.writes(), before + 1);

    // The recorded hash is now current, so the next save is skipped.
    assert!(!manager.save(&mut ctx, false).await.unwrap());
}

#[tokio::test]
async fn test_principal_change_is_persisted() {
    let (manager, _) = manager(PersistenceStrategy::OnChange);
    let id = seeded(&manager).await;

    let mut ctx = RequestContext::new();
    let session = manager.find_session(&mut ctx, Some(id.as_str())).await.unwrap().unwrap();
    session.set_principal(Some(Principal::new("alice").with_roles(["ROLE-1"])));
    manager.after_request(&mut ctx).await;

    let (record, _) = manager.load(&id).await.unwrap().unwrap();
    assert_eq!(record.principal_name.as_deref(), Some("alice"));
    assert_eq!(record.principal_roles, Some(vec!["ROLE-1".to_string()]));
}

#[tokio::test]
async fn test_invalidated_session_is_deleted() {
    let (manager, storage) = manager(PersistenceStrategy::Always);
    let id = seeded(&manager).await;

    let mut ctx = RequestContext::new();
    let session = manager.find_session(&mut ctx, Some(id.as_str())).await.unwrap().unwrap();
    session.invalidate();
    manager.after_request(&mut ctx).await;

    assert_eq!(storage.get(&id).await.unwrap(), None);
    assert!(ctx.metadata().is_none());
}

#[tokio::test]
async fn test_remove_clears_context() {
    let (manager, _) = manager(PersistenceStrategy::Always);
    let id = seeded(&manager).await;

    let mut ctx = RequestContext::new();
    manager.find_session(&mut ctx, Some(id.as_str())).await.unwrap();
    assert!(manager.remove(&mut ctx).await.unwrap());
    assert!(ctx.session().is_none());
    assert!(!manager.remove_id(&id).await.unwrap());
}

#[tokio::test]
async fn test_rotate_id_moves_state() {
    let (manager, storage) = manager(PersistenceStrategy::OnChange);
    let old_id = seeded(&manager).await;

    let mut ctx = RequestContext::new();
    manager.find_session(&mut ctx, Some(old_id.as_str())).await.unwrap();
    let new_id = manager.rotate_id(&mut ctx).await.unwrap().unwrap();

    assert_ne!(new_id, old_id);
    assert_eq!(ctx.session_id(), Some(new_id.as_str()));
    assert_eq!(storage.get(&old_id).await.unwrap(), None);

    let (record, _) = manager.load(&new_id).await.unwrap().unwrap();
    assert_eq!(record.id, new_id);
    assert_eq!(
        record.attributes.get("user").and_then(AttributeValue::as_str),
        Some("alice")
    );
}

#[tokio::test]
async fn test_rotate_without_session() {
    let (manager, _) = manager(PersistenceStrategy::OnChange);
    let mut ctx = RequestContext::new();
    assert_eq!(manager.rotate_id(&mut ctx).await.unwrap(), None);
}

#[tokio::test]
async fn test_skipped_attributes_never_stored() {
    let storage = Arc::new(MemoryStorageClient::new());
    let config = ManagerConfig::default().with_skip_attributes("tmp\\..*");
    let manager = SessionManager::new(config, storage).unwrap();

    let mut ctx = RequestContext::new();
    let session = manager.create_session(&mut ctx, None).await.unwrap();
    assert!(!session.set_attribute("tmp.nonce", 42));
    session.set_attribute("kept", 1);
    let id = session.id().to_string();
    manager.after_request(&mut ctx).await;

    let (record, _) = manager.load(&id).await.unwrap().unwrap();
    assert!(record.attributes.contains_key("kept"));
    assert!(!record.attributes.contains_key("tmp.nonce"));
}

#[tokio::test]
async fn test_skip_urls() {
    let storage = Arc::new(MemoryStorageClient::new());
    let config = ManagerConfig::default().with_skip_urls(".*\\.(css|js|png)");
    let manager = SessionManager::new(config, storage).unwrap();

    assert!(manager.should_skip_url("/static/app.js"));
    assert!(!manager.should_skip_url("/account"));
}

#[test]
fn test_bad_pattern_rejected() {
    let storage = Arc::new(MemoryStorageClient::new());
    let config = ManagerConfig::default().with_skip_attributes("[");
    assert!(matches!(
        SessionManager::new(config, storage),
        Err(SessionError::InvalidPattern { .. })
    ));
}

#[tokio::test]
async fn test_transport_errors_propagate() {
    let manager = SessionManager::new(
        ManagerConfig::default(),
        Arc::new(BrokenStorage { claims_taken: false }),
    )
    .unwrap();

    let mut ctx = RequestContext::new();
    let err = manager.find_session(&mut ctx, Some("any")).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Storage(StorageError::Transport { operation: "get", .. })
    ));

    assert!(manager.create_session(&mut ctx, None).await.is_err());
    assert!(ctx.session().is_none());
}

#[tokio::test]
async fn test_bounded_id_allocation() {
    let config = ManagerConfig::default().with_max_id_attempts(3);
    let manager = SessionManager::new(config, Arc::new(BrokenStorage { claims_taken: true })).unwrap();

    let err = manager.allocate_id(None).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::IdAllocationExhausted { attempts: 3 }
    ));
}

#[tokio::test]
async fn test_dyn_storage_client() {
    let storage: Arc<dyn StorageClient> = Arc::new(MemoryStorageClient::new());
    let manager = SessionManager::new(ManagerConfig::default(), storage).unwrap();

    let mut ctx = RequestContext::new();
    let id = manager
        .create_session(&mut ctx, None)
        .await
        .unwrap()
        .id()
        .to_string();
    manager.after_request(&mut ctx).await;
    assert!(manager.load(&id).await.unwrap().is_some());

    manager.close().await;
    assert!(manager.load(&id).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_skipped_save_refreshes_ttl() {
    let storage = Arc::new(CountingStorage::default());
    let config = ManagerConfig::default()
        .with_strategy(PersistenceStrategy::OnChange)
        .with_session_timeout(Duration::from_secs(10));
    let manager = SessionManager::new(config, Arc::clone(&storage)).unwrap();
    let id = seeded(&manager).await;

    tokio::time::advance(Duration::from_secs(8)).await;
    let mut ctx = RequestContext::new();
    manager.find_session(&mut ctx, Some(id.as_str())).await.unwrap().unwrap();
    assert!(!manager.save(&mut ctx, false).await.unwrap());

    tokio::time::advance(Duration::from_secs(8)).await;
    assert!(storage.get(&id).await.unwrap().is_some());

    tokio::time::advance(Duration::from_secs(3)).await;
    assert!(storage.get(&id).await.unwrap().is_none());
}
