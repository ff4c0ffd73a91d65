//! Shared types, error model, and configuration for kbinstall.
//!
//! This crate is the foundation depended on by the other kbinstall crates.
//! It provides:
//! - [`KbError`]: the unified error type
//! - Domain types ([`Catalog`], [`DocumentEntry`], [`InstallRequest`], [`InstallResult`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, InstallConfig, config_dir, config_file_path, init_config,
    init_config_at, load_config, load_config_from, validate_config,
};
pub use error::{KbError, Result};
pub use types::{
    CACHE_DIR_NAME, CATALOG_FILE_NAME, Catalog, DocumentEntry, InstallMode, InstallOutcome,
    InstallRequest, InstallResult, LEGACY_CATALOG_FILE_NAME, PairError, Upsert,
};
