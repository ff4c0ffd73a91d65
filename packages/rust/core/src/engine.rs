//! Install/merge engine.
//!
//! For each resolved (source, target) pair: validate the source KB, take the
//! target lock, then either create a fresh KB at the target or merge the
//! source into the catalog already there. Pairs run in request order and fail
//! independently; only resolver errors abort the request.

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use kbinstall_shared::{
    Catalog, InstallConfig, InstallMode, InstallOutcome, InstallRequest, InstallResult, KbError,
    Result, Upsert,
};

use crate::catalog::{CatalogStore, SourceCatalog};
use crate::files::{self, CopyOutcome};
use crate::lock::TargetLock;
use crate::resolver::{PathResolver, ResolvedPair};

/// Progress callback for reporting install status.
pub trait InstallProgress: Send + Sync {
    /// Called before a pair is processed. `index` is 1-based.
    fn pair_started(&self, index: usize, total: usize, source: &Path, target: &Path);
    /// Called after each document file is placed in the target cache.
    fn document_copied(&self, path: &str, current: usize, total: usize);
    /// Called once a pair has a result, successful or not.
    fn pair_finished(&self, result: &InstallResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl InstallProgress for SilentProgress {
    fn pair_started(&self, _index: usize, _total: usize, _source: &Path, _target: &Path) {}
    fn document_copied(&self, _path: &str, _current: usize, _total: usize) {}
    fn pair_finished(&self, _result: &InstallResult) {}
}

/// Counters accumulated while applying one source.
#[derive(Debug, Default)]
struct PairStats {
    added: usize,
    replaced: usize,
    unchanged: usize,
}

/// Orchestrates installs.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    store: CatalogStore,
    skip_identical_files: bool,
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::from_config(&InstallConfig::default())
    }
}

impl MergeEngine {
    pub fn from_config(config: &InstallConfig) -> Self {
        Self {
            store: CatalogStore::new(config.accept_legacy_catalogs),
            skip_identical_files: config.skip_identical_files,
        }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Run one install request.
    ///
    /// Returns `Err` only for request-level failures (no target could be
    /// resolved). Per-pair failures are recorded in the returned results,
    /// one per source, in request order.
    #[instrument(skip_all, fields(mode = %request.mode, force = request.force, sources = request.sources.len()))]
    pub fn install(
        &self,
        request: &InstallRequest,
        progress: &dyn InstallProgress,
    ) -> Result<Vec<InstallResult>> {
        let pairs = PathResolver::resolve(&request.sources, &request.dest_root, request.mode)?;
        let total = pairs.len();
        let mut results = Vec::with_capacity(total);

        info!(dest_root = %request.dest_root.display(), pairs = total, "starting install");

        for (i, pair) in pairs.iter().enumerate() {
            progress.pair_started(i + 1, total, &pair.source, &pair.target);

            let result = match self.install_pair(pair, request.mode, request.force, progress) {
                Ok(result) => result,
                Err(err) => {
                    warn!(
                        source = %pair.source.display(),
                        target = %pair.target.display(),
                        code = err.code(),
                        error = %err,
                        "pair not installed"
                    );
                    InstallResult::rejected(pair.source.clone(), pair.target.clone(), &err)
                }
            };

            progress.pair_finished(&result);
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.outcome.is_success()).count();
        info!(succeeded, failed = total - succeeded, "install complete");

        Ok(results)
    }

    #[instrument(skip_all, fields(source = %pair.source.display(), target = %pair.target.display()))]
    fn install_pair(
        &self,
        pair: &ResolvedPair,
        mode: InstallMode,
        force: bool,
        progress: &dyn InstallProgress,
    ) -> Result<InstallResult> {
        // --- Validate source ---
        let source = self.store.load_source(&pair.source)?;
        check_source_files(&pair.source, &source)?;

        // --- Inspect target under lock ---
        let _lock = TargetLock::acquire(&pair.target)?;
        let existing = self.store.load(&pair.target)?;

        let forced = match mode {
            InstallMode::Merge => false,
            InstallMode::Single | InstallMode::IsolatedSubdirectories => {
                if files::has_content(&pair.target)? {
                    if !force {
                        return Err(KbError::TargetExists {
                            path: pair.target.clone(),
                        });
                    }
                    true
                } else {
                    false
                }
            }
        };

        // --- Create or merge ---
        let (outcome, catalog, stats) = match existing {
            None => {
                let stats = self.create(&pair.source, &pair.target, &source.catalog, progress)?;
                let outcome = if forced {
                    InstallOutcome::Overwritten
                } else {
                    InstallOutcome::Created
                };
                (outcome, source.catalog, stats)
            }
            Some(existing) => {
                let (merged, stats) =
                    self.merge(&pair.source, &pair.target, existing, &source.catalog, progress)?;
                let outcome = if forced {
                    InstallOutcome::Overwritten
                } else {
                    InstallOutcome::Merged
                };
                (outcome, merged, stats)
            }
        };

        info!(
            ?outcome,
            documents = catalog.len(),
            added = stats.added,
            replaced = stats.replaced,
            unchanged = stats.unchanged,
            "pair installed"
        );

        Ok(InstallResult {
            source: pair.source.clone(),
            target: pair.target.clone(),
            outcome,
            document_count: catalog.len(),
            documents_added: stats.added,
            documents_replaced: stats.replaced,
            documents_unchanged: stats.unchanged,
            error: None,
        })
    }

    /// Fresh KB: copy every referenced document, then write the source catalog.
    /// Creates the KB root itself when it does not exist yet.
    fn create(
        &self,
        source: &Path,
        target: &Path,
        catalog: &Catalog,
        progress: &dyn InstallProgress,
    ) -> Result<PairStats> {
        let cache = files::cache_dir(target);
        std::fs::create_dir_all(&cache).map_err(|e| KbError::io(&cache, e))?;

        let total = catalog.len();
        for (i, entry) in catalog.documents.iter().enumerate() {
            self.copy_entry(source, target, &entry.path)?;
            progress.document_copied(&entry.path, i + 1, total);
        }

        self.store.save(target, catalog)?;

        Ok(PairStats {
            added: total,
            ..PairStats::default()
        })
    }

    /// Union the source into an existing catalog. Source wins per path;
    /// target entries the source does not mention are kept.
    fn merge(
        &self,
        source: &Path,
        target: &Path,
        existing: Catalog,
        incoming: &Catalog,
        progress: &dyn InstallProgress,
    ) -> Result<(Catalog, PairStats)> {
        let mut merged = existing.clone();
        let mut stats = PairStats::default();
        let total = incoming.len();

        for (i, entry) in incoming.documents.iter().enumerate() {
            let copy = self.copy_entry(source, target, &entry.path)?;
            progress.document_copied(&entry.path, i + 1, total);

            match merged.upsert(entry) {
                Upsert::Inserted => stats.added += 1,
                Upsert::Replaced { changed } => {
                    if changed || copy == CopyOutcome::Written {
                        debug!(path = %entry.path, "existing document replaced");
                        stats.replaced += 1;
                    } else {
                        stats.unchanged += 1;
                    }
                }
            }
        }

        if merged != existing {
            self.store.save(target, &merged)?;
        } else {
            debug!("catalog unchanged, not rewriting");
        }

        Ok((merged, stats))
    }

    fn copy_entry(&self, source: &Path, target: &Path, rel: &str) -> Result<CopyOutcome> {
        let from = files::document_path(source, rel);
        let to = files::document_path(target, rel);
        files::copy_document(&from, &to, self.skip_identical_files)
    }
}

/// Every catalog entry must have a backing file in the source cache.
fn check_source_files(source_root: &Path, source: &SourceCatalog) -> Result<()> {
    let missing: Vec<&str> = source
        .catalog
        .paths()
        .filter(|p| !files::document_path(source_root, p).is_file())
        .collect();

    if !missing.is_empty() {
        const SHOWN: usize = 5;
        let mut listed = missing
            .iter()
            .take(SHOWN)
            .copied()
            .collect::<Vec<_>>()
            .join(", ");
        if missing.len() > SHOWN {
            listed.push_str(&format!(" and {} more", missing.len() - SHOWN));
        }
        return Err(KbError::source_invalid(
            source_root,
            format!(
                "{} catalog entr{} without a file in cache/: {listed}",
                missing.len(),
                if missing.len() == 1 { "y" } else { "ies" }
            ),
        ));
    }

    let referenced: std::collections::HashSet<&str> = source.catalog.paths().collect();
    let unreferenced = files::list_cache_files(source_root)?
        .into_iter()
        .filter(|f| !referenced.contains(f.as_str()))
        .count();
    if unreferenced > 0 {
        debug!(unreferenced, "source cache files not in catalog will not be installed");
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
