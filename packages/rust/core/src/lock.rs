//! Cross-process exclusive lock per install target.
//!
//! Two installs that resolve to the same KB root must not interleave their
//! load-merge-write cycles. Lock files live under the system temp directory,
//! keyed by a hash of the absolute target path, so acquiring a lock never
//! touches the destination tree.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use kbinstall_shared::{KbError, Result};

const LOCK_DIR_NAME: &str = "kbinstall-locks";

/// Held for the lifetime of one target's load-merge-write cycle.
/// Released on drop.
#[derive(Debug)]
pub struct TargetLock {
    file: File,
    path: PathBuf,
}

impl TargetLock {
    /// Block until the exclusive lock for `target` is held.
    pub fn acquire(target: &Path) -> Result<Self> {
        let dir = std::env::temp_dir().join(LOCK_DIR_NAME);
        std::fs::create_dir_all(&dir).map_err(|e| KbError::io(&dir, e))?;

        let path = dir.join(format!("{}.lock", lock_key(target)));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| KbError::io(&path, e))?;

        FileExt::lock_exclusive(&file).map_err(|e| KbError::io(&path, e))?;
        debug!(target = %target.display(), lock = %path.display(), "target lock acquired");

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(lock = %self.path.display(), error = %e, "failed to release target lock");
        }
    }
}

/// Symlinked spellings of an existing target share one key.
fn lock_key(target: &Path) -> String {
    let absolute = std::fs::canonicalize(target)
        .or_else(|_| std::path::absolute(target))
        .unwrap_or_else(|_| target.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(absolute.to_string_lossy().as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..32].to_string()
}
