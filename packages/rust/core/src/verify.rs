//! Referential integrity check for an installed KB.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument, warn};

use kbinstall_shared::{KbError, Result};

use crate::catalog::CatalogStore;
use crate::files;

/// Result of [`verify_kb`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub kb_root: PathBuf,
    pub document_count: usize,
    /// Catalog paths with no file under `cache/`.
    pub missing: Vec<String>,
    /// Files under `cache/` that no catalog entry references.
    pub orphaned: Vec<String>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.orphaned.is_empty()
    }
}

/// Compare a KB's catalog against the files in its cache.
///
/// A directory with no `catalog.json` is [`KbError::SourceInvalid`].
#[instrument(skip_all, fields(kb = %kb.display()))]
pub fn verify_kb(store: &CatalogStore, kb: &Path) -> Result<VerificationReport> {
    let catalog = store
        .load(kb)?
        .ok_or_else(|| KbError::source_invalid(kb, "no catalog.json found"))?;

    let mut on_disk = files::list_cache_files(kb)?;
    let mut missing = Vec::new();

    for path in catalog.paths() {
        if !on_disk.remove(path) {
            missing.push(path.to_string());
        }
    }
    let orphaned: Vec<String> = on_disk.into_iter().collect();

    let report = VerificationReport {
        kb_root: kb.to_path_buf(),
        document_count: catalog.len(),
        missing,
        orphaned,
    };

    if report.is_clean() {
        info!(documents = report.document_count, "knowledge base is consistent");
    } else {
        warn!(
            missing = report.missing.len(),
            orphaned = report.orphaned.len(),
            "knowledge base has inconsistencies"
        );
    }

    Ok(report)
}
