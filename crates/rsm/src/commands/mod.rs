//! CLI command handlers.

pub mod config;
pub mod delete;
pub mod hash;
pub mod inspect;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use rsm_config::LoadedConfig;
use rsm_session::SessionManager;
use rsm_storage::RedisStorageClient;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration and the files it came from.
    pub config: LoadedConfig,
    /// Resolved user config directory.
    pub config_dir: Option<PathBuf>,
    /// Storage URL override from the command line.
    pub url: Option<String>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Connect to the configured store and build a session manager over it.
    pub async fn manager(&self) -> Result<SessionManager<RedisStorageClient>> {
        let mut storage = self.config.config.storage();
        if let Some(url) = &self.url {
            storage.url = url.clone();
        }

        let client = RedisStorageClient::connect(&storage.to_redis_config())
            .await
            .with_context(|| format!("failed to connect to {}", storage.url))?;

        let manager_config = self.config.config.session().to_manager_config()?;
        Ok(SessionManager::new(manager_config, Arc::new(client))?)
    }
}
