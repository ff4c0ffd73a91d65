//! Core domain types for kbinstall knowledge bases.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KbError;

/// Name of the catalog file at the root of every installed KB.
pub const CATALOG_FILE_NAME: &str = "catalog.json";

/// Older producers wrote their catalog under this name.
pub const LEGACY_CATALOG_FILE_NAME: &str = "discovery.json";

/// Document cache subdirectory; catalog `path` fields are relative to it.
pub const CACHE_DIR_NAME: &str = "cache";

// ---------------------------------------------------------------------------
// DocumentEntry
// ---------------------------------------------------------------------------

/// One cataloged document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEntry {
    /// Location inside the KB's `cache/` directory. Primary key of a catalog.
    pub path: String,
    /// Original source locator (URL, repository path, or local path).
    #[serde(default, alias = "url", skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Short human-readable title, filled in by enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// One-paragraph summary, filled in by enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Producer-specific keys carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DocumentEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            uri: None,
            title: None,
            summary: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The `catalog.json` structure: an ordered list of documents and nothing else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    pub documents: Vec<DocumentEntry>,
}

/// What [`Catalog::upsert`] did with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The path was new and the entry was appended.
    Inserted,
    /// The path existed; `changed` tells whether any field differed.
    Replaced { changed: bool },
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&DocumentEntry> {
        self.documents.iter().find(|d| d.path == path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().map(|d| d.path.as_str())
    }

    /// Insert `entry`, or replace the existing entry with the same path
    /// wholesale (fields `entry` leaves unset are cleared, not kept).
    /// Existing entries keep their position; new ones are appended.
    pub fn upsert(&mut self, entry: &DocumentEntry) -> Upsert {
        match self.documents.iter_mut().find(|d| d.path == entry.path) {
            Some(existing) => {
                let changed = *existing != *entry;
                if changed {
                    *existing = entry.clone();
                }
                Upsert::Replaced { changed }
            }
            None => {
                self.documents.push(entry.clone());
                Upsert::Inserted
            }
        }
    }
}

// ---------------------------------------------------------------------------
// InstallMode
// ---------------------------------------------------------------------------

/// How sources are mapped onto the destination root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallMode {
    /// Exactly one source, installed at `dest_root/<source name>`.
    Single,
    /// Every source is merged into `dest_root` itself.
    Merge,
    /// Each source gets its own `dest_root/<source name>`.
    IsolatedSubdirectories,
}

impl InstallMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Merge => "merge",
            Self::IsolatedSubdirectories => "isolated-subdirectories",
        }
    }
}

impl fmt::Display for InstallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallMode {
    type Err = KbError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "single" => Ok(Self::Single),
            "merge" => Ok(Self::Merge),
            "isolated-subdirectories" | "isolated" => Ok(Self::IsolatedSubdirectories),
            other => Err(KbError::InvalidMode {
                mode: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Install request / result
// ---------------------------------------------------------------------------

/// One installer invocation.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// Source KB directories, in application order.
    pub sources: Vec<PathBuf>,
    /// Destination root (parent of targets, or the target itself in merge mode).
    pub dest_root: PathBuf,
    pub mode: InstallMode,
    /// Authorizes installing into a non-empty target in the isolation modes.
    pub force: bool,
}

/// Outcome recorded for one source/target pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallOutcome {
    Created,
    Merged,
    SkippedExists,
    Overwritten,
    Failed,
}

impl InstallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Merged => "merged",
            Self::SkippedExists => "skipped-exists",
            Self::Overwritten => "overwritten",
            Self::Failed => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Created | Self::Merged | Self::Overwritten)
    }
}

/// Error detail attached to a failed or skipped pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairError {
    pub code: String,
    pub message: String,
}

impl From<&KbError> for PairError {
    fn from(err: &KbError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Per-source result of an install.
#[derive(Debug, Clone)]
pub struct InstallResult {
    pub source: PathBuf,
    /// Resolved KB root that received (or would have received) the source.
    pub target: PathBuf,
    pub outcome: InstallOutcome,
    /// Entries in the target catalog after this pair was applied.
    pub document_count: usize,
    /// Source entries whose path was new to the target.
    pub documents_added: usize,
    /// Source entries that collided with an existing path and changed it.
    pub documents_replaced: usize,
    /// Source entries that collided with an identical existing entry and file.
    pub documents_unchanged: usize,
    pub error: Option<PairError>,
}

impl InstallResult {
    /// A result for a pair that never got past validation or the overwrite gate.
    pub fn rejected(source: PathBuf, target: PathBuf, err: &KbError) -> Self {
        let outcome = match err {
            KbError::TargetExists { .. } => InstallOutcome::SkippedExists,
            _ => InstallOutcome::Failed,
        };
        Self {
            source,
            target,
            outcome,
            document_count: 0,
            documents_added: 0,
            documents_replaced: 0,
            documents_unchanged: 0,
            error: Some(PairError::from(err)),
        }
    }
}
