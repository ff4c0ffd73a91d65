//! Catalog persistence: load, validate, and atomically save `catalog.json`.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use kbinstall_shared::{
    CATALOG_FILE_NAME, Catalog, DocumentEntry, KbError, LEGACY_CATALOG_FILE_NAME, Result, Upsert,
};

use crate::files;
use crate::lock::TargetLock;

/// Which top-level shape a catalog file is held to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    /// `catalog.json`: exactly one `documents` field.
    Canonical,
    /// `discovery.json`: `documents` plus an optional producer `metadata` block.
    Legacy,
}

/// A source KB's catalog together with the file it was read from.
#[derive(Debug, Clone)]
pub struct SourceCatalog {
    pub catalog: Catalog,
    pub file: PathBuf,
}

/// Reads and writes KB catalogs.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    accept_legacy_catalogs: bool,
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new(true)
    }
}

impl CatalogStore {
    pub fn new(accept_legacy_catalogs: bool) -> Self {
        Self {
            accept_legacy_catalogs,
        }
    }

    /// `<kb>/catalog.json`.
    pub fn catalog_path(kb: &Path) -> PathBuf {
        kb.join(CATALOG_FILE_NAME)
    }

    /// Load the catalog of an installed KB.
    ///
    /// `Ok(None)` means there is no KB at `kb` yet; a catalog that exists but
    /// is malformed is [`KbError::CatalogCorrupt`].
    pub fn load(&self, kb: &Path) -> Result<Option<Catalog>> {
        read_catalog_file(&Self::catalog_path(kb), Flavor::Canonical)
    }

    /// Validate a parsed catalog document. `origin` is only used in errors.
    pub fn validate(raw: &Value, origin: &Path) -> Result<Catalog> {
        validate_with(raw, origin, Flavor::Canonical)
    }

    /// Locate and load a source KB's catalog.
    ///
    /// Candidates, first hit wins: `catalog.json`, `discovery.json`,
    /// `cache/catalog.json`, `cache/discovery.json`.
    #[instrument(skip_all, fields(source = %source.display()))]
    pub fn load_source(&self, source: &Path) -> Result<SourceCatalog> {
        if !source.is_dir() {
            return Err(KbError::source_invalid(source, "not a directory"));
        }

        let cache = files::cache_dir(source);
        let candidates = [
            (source.join(CATALOG_FILE_NAME), Flavor::Canonical),
            (source.join(LEGACY_CATALOG_FILE_NAME), Flavor::Legacy),
            (cache.join(CATALOG_FILE_NAME), Flavor::Canonical),
            (cache.join(LEGACY_CATALOG_FILE_NAME), Flavor::Legacy),
        ];

        for (path, flavor) in candidates {
            if flavor == Flavor::Legacy && !self.accept_legacy_catalogs {
                continue;
            }
            if let Some(catalog) = read_catalog_file(&path, flavor)? {
                debug!(file = %path.display(), documents = catalog.len(), "found source catalog");
                return Ok(SourceCatalog {
                    catalog,
                    file: path,
                });
            }
        }

        Err(KbError::source_invalid(
            source,
            "no catalog.json or discovery.json found",
        ))
    }

    /// Write `catalog` to `<kb>/catalog.json` atomically (temp file, fsync, rename).
    #[instrument(skip_all, fields(kb = %kb.display(), documents = catalog.len()))]
    pub fn save(&self, kb: &Path, catalog: &Catalog) -> Result<()> {
        std::fs::create_dir_all(kb).map_err(|e| KbError::io(kb, e))?;

        let target = Self::catalog_path(kb);
        let temp = kb.join(format!(".{CATALOG_FILE_NAME}.{}.tmp", uuid::Uuid::now_v7()));

        let mut json = serde_json::to_string_pretty(catalog).map_err(|e| {
            KbError::catalog_corrupt(&target, format!("JSON serialization failed: {e}"))
        })?;
        json.push('\n');

        write_synced(&temp, json.as_bytes())?;

        if let Err(e) = std::fs::rename(&temp, &target) {
            let _ = std::fs::remove_file(&temp);
            return Err(KbError::io(&target, e));
        }

        debug!(path = %target.display(), "catalog saved");
        Ok(())
    }

    /// Create an empty KB skeleton: `cache/` and a catalog with no documents.
    #[instrument(skip_all, fields(kb = %kb.display()))]
    pub fn init(&self, kb: &Path) -> Result<()> {
        if Self::catalog_path(kb).exists() {
            return Err(KbError::TargetExists {
                path: kb.to_path_buf(),
            });
        }

        let cache = files::cache_dir(kb);
        std::fs::create_dir_all(&cache).map_err(|e| KbError::io(&cache, e))?;
        self.save(kb, &Catalog::new())?;

        info!("initialized empty knowledge base");
        Ok(())
    }

    /// Register one entry in a KB catalog, replacing any entry with the same path.
    #[instrument(skip_all, fields(kb = %kb.display(), path = %entry.path))]
    pub fn register(&self, kb: &Path, entry: &DocumentEntry) -> Result<Upsert> {
        let normalized = normalize_document_path(&entry.path).ok_or_else(|| {
            KbError::catalog_corrupt(
                Self::catalog_path(kb),
                format!("invalid document path '{}'", entry.path),
            )
        })?;

        let mut entry = entry.clone();
        entry.path = normalized;

        if !files::document_path(kb, &entry.path).is_file() {
            warn!(path = %entry.path, "registering a document with no file in cache/");
        }

        let _lock = TargetLock::acquire(kb)?;
        let mut catalog = self.load(kb)?.unwrap_or_default();
        let outcome = catalog.upsert(&entry);
        self.save(kb, &catalog)?;

        debug!(?outcome, "document registered");
        Ok(outcome)
    }
}

/// Normalize a catalog `path` to a clean `/`-separated path relative to `cache/`.
///
/// Returns `None` for empty, absolute, or parent-escaping paths. A leading
/// `cache/` segment is kept: it names a real `cache/cache/` folder.
pub fn normalize_document_path(raw: &str) -> Option<String> {
    normalize_with(raw, Flavor::Canonical)
}

/// `discovery.json` paths are KB-root-relative, so their leading `cache/` is dropped.
fn normalize_with(raw: &str, flavor: Flavor) -> Option<String> {
    let unified = raw.trim().replace('\\', "/");

    let bytes = unified.as_bytes();
    let has_drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    if unified.starts_with('/') || has_drive {
        return None;
    }

    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            p => parts.push(p),
        }
    }

    if flavor == Flavor::Legacy && parts.len() > 1 && parts[0] == kbinstall_shared::CACHE_DIR_NAME {
        parts.remove(0);
    }

    if parts.is_empty() {
        return None;
    }

    Some(parts.join("/"))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_catalog_file(path: &Path, flavor: Flavor) -> Result<Option<Catalog>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(KbError::io(path, e)),
    };

    let raw: Value = serde_json::from_str(&content)
        .map_err(|e| KbError::catalog_corrupt(path, format!("invalid JSON: {e}")))?;

    validate_with(&raw, path, flavor).map(Some)
}

fn validate_with(raw: &Value, origin: &Path, flavor: Flavor) -> Result<Catalog> {
    let obj = raw
        .as_object()
        .ok_or_else(|| KbError::catalog_corrupt(origin, "top level must be a JSON object"))?;

    for key in obj.keys() {
        let allowed = key == "documents" || (flavor == Flavor::Legacy && key == "metadata");
        if !allowed {
            return Err(KbError::catalog_corrupt(
                origin,
                format!("unexpected top-level field '{key}'"),
            ));
        }
    }

    let docs = obj
        .get("documents")
        .ok_or_else(|| KbError::catalog_corrupt(origin, "missing 'documents' list"))?
        .as_array()
        .ok_or_else(|| KbError::catalog_corrupt(origin, "'documents' must be a list"))?;

    let mut seen = HashSet::with_capacity(docs.len());
    let mut documents = Vec::with_capacity(docs.len());

    for (i, item) in docs.iter().enumerate() {
        if !item.is_object() {
            return Err(KbError::catalog_corrupt(
                origin,
                format!("document #{i} is not an object"),
            ));
        }

        let raw_path = item.get("path").and_then(Value::as_str).ok_or_else(|| {
            KbError::catalog_corrupt(origin, format!("document #{i} has no 'path'"))
        })?;

        let path = normalize_with(raw_path, flavor).ok_or_else(|| {
            KbError::catalog_corrupt(origin, format!("document #{i} has invalid path '{raw_path}'"))
        })?;

        let mut entry: DocumentEntry = serde_json::from_value(item.clone()).map_err(|e| {
            KbError::catalog_corrupt(origin, format!("document #{i} ('{raw_path}'): {e}"))
        })?;

        if !seen.insert(path.clone()) {
            return Err(KbError::catalog_corrupt(
                origin,
                format!("duplicate document path '{path}'"),
            ));
        }

        entry.path = path;
        documents.push(entry);
    }

    Ok(Catalog { documents })
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = std::fs::File::create(path).map_err(|e| KbError::io(path, e))?;
    file.write_all(bytes).map_err(|e| KbError::io(path, e))?;
    file.sync_all().map_err(|e| KbError::io(path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
