//! Document cache file operations.
//!
//! Catalog `path` fields are `/`-separated and relative to `<kb>/cache/`.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use kbinstall_shared::{CACHE_DIR_NAME, KbError, Result};

/// What [`copy_document`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The destination was (re)written.
    Written,
    /// The destination already held the same bytes and was left alone.
    Identical,
}

/// `<kb>/cache`.
pub fn cache_dir(kb: &Path) -> PathBuf {
    kb.join(CACHE_DIR_NAME)
}

/// Absolute location of a catalog path inside a KB.
pub fn document_path(kb: &Path, rel: &str) -> PathBuf {
    rel.split('/')
        .fold(cache_dir(kb), |acc, part| acc.join(part))
}

/// Copy one document into place via temp file + rename.
pub fn copy_document(from: &Path, to: &Path, skip_identical: bool) -> Result<CopyOutcome> {
    if skip_identical && to.is_file() && same_contents(from, to)? {
        debug!(path = %to.display(), "document unchanged, skipping copy");
        return Ok(CopyOutcome::Identical);
    }

    let parent = to
        .parent()
        .ok_or_else(|| KbError::io(to, std::io::Error::other("document path has no parent")))?;
    std::fs::create_dir_all(parent).map_err(|e| KbError::io(parent, e))?;

    let name = to
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{name}.{}.tmp", uuid::Uuid::now_v7()));

    std::fs::copy(from, &temp).map_err(|e| KbError::io(from, e))?;
    if let Err(e) = std::fs::rename(&temp, to) {
        let _ = std::fs::remove_file(&temp);
        return Err(KbError::io(to, e));
    }

    debug!(from = %from.display(), to = %to.display(), "copied document");
    Ok(CopyOutcome::Written)
}

/// SHA-256 of a file's contents, hex encoded.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| KbError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = file.read(&mut buf).map_err(|e| KbError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn same_contents(a: &Path, b: &Path) -> Result<bool> {
    let len_a = std::fs::metadata(a).map_err(|e| KbError::io(a, e))?.len();
    let len_b = std::fs::metadata(b).map_err(|e| KbError::io(b, e))?.len();
    if len_a != len_b {
        return Ok(false);
    }
    Ok(file_digest(a)? == file_digest(b)?)
}

/// Every regular file under `<kb>/cache`, as `/`-separated relative paths.
/// A missing cache directory yields an empty set.
pub fn list_cache_files(kb: &Path) -> Result<BTreeSet<String>> {
    let cache = cache_dir(kb);
    let mut files = BTreeSet::new();

    if !cache.is_dir() {
        return Ok(files);
    }

    for entry in WalkDir::new(&cache).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| cache.clone());
            KbError::io(path, std::io::Error::other(e.to_string()))
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        if let Ok(rel) = entry.path().strip_prefix(&cache) {
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            files.insert(parts.join("/"));
        }
    }

    Ok(files)
}

/// Whether `path` exists and holds anything: a file, or a directory with entries.
pub fn has_content(path: &Path) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {
            let mut entries = std::fs::read_dir(path).map_err(|e| KbError::io(path, e))?;
            Ok(entries.next().is_some())
        }
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(KbError::io(path, e)),
    }
}
