//! Write-back session persistence.
//!
//! This crate decides, for every request, whether a session must be written
//! to the backing store:
//! - dirty tracking of attribute mutations
//! - a persistence strategy (`always` or `on_change`) plus attribute hashing
//! - id allocation through atomic create-if-absent claims
//! - a request-scoped [`RequestContext`] instead of ambient per-thread state
//!
//! # Example
//!
//! ```rust,ignore
//! use rsm_session::{ManagerConfig, PersistenceStrategy, RequestContext, SessionManager};
//! use rsm_storage::MemoryStorageClient;
//!
//! let config = ManagerConfig::default().with_strategy(PersistenceStrategy::OnChange);
//! let manager = SessionManager::new(config, Arc::new(MemoryStorageClient::new()))?;
//!
//! let mut ctx = RequestContext::new();
//! let session = manager.create_session(&mut ctx, None).await?;
//! session.set_attribute("user", "alice");
//! manager.after_request(&mut ctx).await;
//! ```

mod config;
mod context;
mod dirty;
mod error;
mod manager;
mod policy;
mod session;

pub use config::{DEFAULT_SESSION_TIMEOUT, ManagerConfig};
pub use context::RequestContext;
pub use dirty::{DirtyState, DirtyTracker, is_changed};
pub use error::{Result, SessionError};
pub use manager::{PLACEHOLDER, SessionManager};
pub use policy::{PersistenceStrategy, UnsupportedValuePolicy, should_persist};
pub use session::{Principal, Session};
