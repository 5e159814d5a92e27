//! Shared types, error model, and configuration for Snapvault.
//!
//! This crate is the foundation depended on by all other Snapvault crates.
//! It provides:
//! - [`SnapvaultError`] — the unified error type
//! - Content addressing ([`ObjectKey`], [`DocId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod key;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EncoderConfig, FetchConfig, IndexConfig, SearchIndexConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{Result, SnapvaultError};
pub use key::{DocId, ObjectKey};
