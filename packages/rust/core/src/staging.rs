//! Caller-owned scratch directory for preparing source KBs.
//!
//! Producers (fetchers, converters) fill a staging area with a KB and hand
//! its path to the installer. The directory is removed when the
//! [`StagingArea`] is dropped, including on early returns and panics.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use kbinstall_shared::{KbError, Result};

const STAGE_PREFIX: &str = ".kbstage-";

#[derive(Debug)]
pub struct StagingArea {
    path: PathBuf,
    keep: bool,
}

impl StagingArea {
    /// Create `<parent>/.kbstage-<uuid>`.
    pub fn new_in(parent: &Path) -> Result<Self> {
        let path = parent.join(format!("{STAGE_PREFIX}{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&path).map_err(|e| KbError::io(&path, e))?;
        debug!(path = %path.display(), "staging area created");
        Ok(Self { path, keep: false })
    }

    /// Create a staging area under the system temp directory.
    pub fn new() -> Result<Self> {
        Self::new_in(&std::env::temp_dir())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create (if needed) and return a named child, e.g. the KB folder whose
    /// name the installer will use as the target name.
    pub fn kb_dir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.path.join(name);
        std::fs::create_dir_all(&dir).map_err(|e| KbError::io(&dir, e))?;
        Ok(dir)
    }

    /// Detach: the directory survives drop. Returns its path.
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "staging area removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove staging area"),
        }
    }
}
