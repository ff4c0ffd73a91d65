//! Target path resolution.
//!
//! Maps each source KB onto the KB root that will receive it:
//!
//! | mode | target |
//! |---|---|
//! | `single` | `dest_root/<source folder name>` (exactly one source) |
//! | `isolated-subdirectories` | `dest_root/<source folder name>`, per source |
//! | `merge` | `dest_root` itself, shared by every source |
//!
//! The folder name always comes from the source path; callers cannot supply it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use kbinstall_shared::{InstallMode, KbError, Result};

/// One source and the KB root it installs into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPair {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Computes install targets.
pub struct PathResolver;

impl PathResolver {
    /// Resolve every source to its target, in request order.
    ///
    /// Fails with [`KbError::AmbiguousTarget`] when no target can be
    /// determined. Resolution leaves the filesystem as it found it.
    pub fn resolve(
        sources: &[PathBuf],
        dest_root: &Path,
        mode: InstallMode,
    ) -> Result<Vec<ResolvedPair>> {
        if sources.is_empty() {
            return Err(KbError::ambiguous_target(dest_root, "no source paths given"));
        }
        if mode == InstallMode::Single && sources.len() != 1 {
            return Err(KbError::ambiguous_target(
                dest_root,
                format!(
                    "single mode takes exactly one source, got {}; use merge or isolated-subdirectories",
                    sources.len()
                ),
            ));
        }

        let pairs = match mode {
            InstallMode::Merge => {
                let root = prepare_merge_root(dest_root)?;
                sources
                    .iter()
                    .map(|s| ResolvedPair {
                        source: absolute_source(s),
                        target: root.clone(),
                    })
                    .collect()
            }
            InstallMode::Single | InstallMode::IsolatedSubdirectories => {
                let root = check_parent_root(dest_root)?;
                sources
                    .iter()
                    .map(|s| {
                        let source = absolute_source(s);
                        let name = source_name(&source)?;
                        Ok(ResolvedPair {
                            target: root.join(name),
                            source,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?
            }
        };

        for pair in &pairs {
            debug!(
                %mode,
                source = %pair.source.display(),
                target = %pair.target.display(),
                "resolved install target"
            );
        }

        Ok(pairs)
    }
}

/// Canonical path when the source exists, otherwise the absolute form as given.
fn absolute_source(source: &Path) -> PathBuf {
    std::fs::canonicalize(source)
        .or_else(|_| std::path::absolute(source))
        .unwrap_or_else(|_| source.to_path_buf())
}

fn source_name(source: &Path) -> Result<OsString> {
    source
        .file_name()
        .map(OsString::from)
        .ok_or_else(|| KbError::ambiguous_target(source, "source path has no folder name"))
}

/// `dest_root` for the per-source modes must be an existing, writable directory.
fn check_parent_root(dest_root: &Path) -> Result<PathBuf> {
    if !dest_root.is_dir() {
        return Err(KbError::ambiguous_target(
            dest_root,
            "destination root is not a directory",
        ));
    }

    probe_writable(dest_root)?;

    std::fs::canonicalize(dest_root).map_err(|e| KbError::io(dest_root, e))
}

/// In merge mode `dest_root` is the KB root itself. A missing one is left for
/// the first pair that installs to create, so a request whose pairs all fail
/// leaves nothing behind. The returned path is the canonical form of its
/// deepest existing ancestor with the missing components appended.
fn prepare_merge_root(dest_root: &Path) -> Result<PathBuf> {
    if dest_root.exists() && !dest_root.is_dir() {
        return Err(KbError::ambiguous_target(
            dest_root,
            "merge target exists and is not a directory",
        ));
    }

    let absolute = std::path::absolute(dest_root).map_err(|e| KbError::io(dest_root, e))?;
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        let name = existing.file_name().ok_or_else(|| {
            KbError::ambiguous_target(dest_root, "merge target has no existing ancestor")
        })?;
        missing.push(name.to_os_string());
        existing = existing.parent().ok_or_else(|| {
            KbError::ambiguous_target(dest_root, "merge target has no existing ancestor")
        })?;
    }

    if !existing.is_dir() {
        return Err(KbError::ambiguous_target(
            dest_root,
            format!("{} is not a directory", existing.display()),
        ));
    }
    probe_writable(existing)?;

    let root = std::fs::canonicalize(existing).map_err(|e| KbError::io(existing, e))?;
    Ok(missing.iter().rev().fold(root, |acc, part| acc.join(part)))
}

fn probe_writable(dir: &Path) -> Result<()> {
    let probe = dir.join(format!(".kbinstall-probe-{}", uuid::Uuid::now_v7()));
    std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)
        .map_err(|e| KbError::ambiguous_target(dir, format!("destination is not writable: {e}")))?;
    let _ = std::fs::remove_file(&probe);
    Ok(())
}
