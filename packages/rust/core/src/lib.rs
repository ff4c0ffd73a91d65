//! Install and merge engine for kbinstall.
//!
//! This crate resolves install targets, validates and persists catalogs, and
//! merges source KBs into destination KBs (e.g., [`MergeEngine::install`]).

pub mod catalog;
pub mod engine;
pub mod files;
pub mod lock;
pub mod report;
pub mod resolver;
pub mod staging;
pub mod verify;

pub use catalog::{CatalogStore, SourceCatalog, normalize_document_path};
pub use engine::{InstallProgress, MergeEngine, SilentProgress};
pub use report::{InstallReport, InstallReporter, ReportEntry, ReportStatus};
pub use resolver::{PathResolver, ResolvedPair};
pub use staging::StagingArea;
pub use verify::{VerificationReport, verify_kb};
