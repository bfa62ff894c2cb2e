//! Shared types, error model, and configuration for callsync.
//!
//! This crate is the foundation depended on by all other callsync crates.
//! It provides:
//! - [`CallsyncError`]: the unified error type
//! - Domain types ([`RunId`], [`RunSummary`], [`DeliveryRecord`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ConversationsConfig, CrmConfig, HttpConfig, MAX_BATCH_SIZE, RunConfig, RunDefaults,
    config_dir, config_file_path, init_config, load_config, load_config_from, require_env,
    secs_to_duration, validate_base_url,
};
pub use error::{CallsyncError, Result};
pub use types::{DeliveryRecord, RunId, RunSummary, normalize_email, scalar_string};
