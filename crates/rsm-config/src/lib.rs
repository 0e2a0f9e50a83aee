//! Configuration for rsm.
//!
//! Provides TOML-based configuration with:
//! - `[session]`: persistence strategy, timeout, skip patterns
//! - `[storage]`: backing store URL and timeout
//! - Config file layering (user config dir + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, config_dir, config_path, load_config, load_config_file,
    load_config_with_options,
};
pub use error::{ConfigError, Result};
pub use types::{RsmConfig, SessionSection, StorageSection};
