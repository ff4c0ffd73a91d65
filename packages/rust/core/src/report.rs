//! Machine-readable install report.
//!
//! The report is the installer's only stdout output. Callers locate the KB to
//! open through `open_path` rather than by scanning `results`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kbinstall_shared::{InstallOutcome, InstallRequest, InstallResult, KbError, PairError};

use crate::catalog::CatalogStore;

/// Overall status of one installer invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// Every pair succeeded.
    Success,
    /// At least one pair failed and at least one succeeded.
    Partial,
    /// Every pair failed, or the request was rejected before any pair ran.
    Error,
}

/// One source's line in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub source: PathBuf,
    pub target_kb_root: PathBuf,
    pub catalog_file: PathBuf,
    pub outcome: InstallOutcome,
    pub document_count: usize,
    pub documents_added: usize,
    pub documents_replaced: usize,
    pub documents_unchanged: usize,
    pub error: Option<PairError>,
}

impl From<&InstallResult> for ReportEntry {
    fn from(result: &InstallResult) -> Self {
        Self {
            source: result.source.clone(),
            target_kb_root: result.target.clone(),
            catalog_file: CatalogStore::catalog_path(&result.target),
            outcome: result.outcome,
            document_count: result.document_count,
            documents_added: result.documents_added,
            documents_replaced: result.documents_replaced,
            documents_unchanged: result.documents_unchanged,
            error: result.error.clone(),
        }
    }
}

/// Full report for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallReport {
    pub status: ReportStatus,
    pub mode: String,
    pub force: bool,
    /// Target of the last listed source; the shared root in `merge` mode.
    pub open_path: Option<PathBuf>,
    pub installed_at: DateTime<Utc>,
    pub results: Vec<ReportEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PairError>,
}

impl InstallReport {
    /// Number of pairs that did not succeed.
    pub fn failures(&self) -> usize {
        self.results
            .iter()
            .filter(|r| !r.outcome.is_success())
            .count()
    }

    /// Pretty-printed JSON with a trailing newline.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

/// Builds [`InstallReport`]s.
pub struct InstallReporter;

impl InstallReporter {
    /// Report for a request whose pairs all ran.
    pub fn report(request: &InstallRequest, results: &[InstallResult]) -> InstallReport {
        let failed = results.iter().filter(|r| !r.outcome.is_success()).count();
        let status = if failed == 0 && !results.is_empty() {
            ReportStatus::Success
        } else if failed < results.len() {
            ReportStatus::Partial
        } else {
            ReportStatus::Error
        };

        InstallReport {
            status,
            mode: request.mode.as_str().to_string(),
            force: request.force,
            open_path: results.last().map(|r| r.target.clone()),
            installed_at: Utc::now(),
            results: results.iter().map(ReportEntry::from).collect(),
            error: None,
        }
    }

    /// Report for a request rejected before any pair ran.
    ///
    /// `mode` is the caller's raw mode string so an invalid one is echoed back.
    pub fn rejected(mode: &str, force: bool, err: &KbError) -> InstallReport {
        InstallReport {
            status: ReportStatus::Error,
            mode: mode.to_string(),
            force,
            open_path: None,
            installed_at: Utc::now(),
            results: Vec::new(),
            error: Some(PairError::from(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbinstall_shared::InstallMode;

    fn result(source: &str, target: &str, outcome: InstallOutcome) -> InstallResult {
        InstallResult {
            source: PathBuf::from(source),
            target: PathBuf::from(target),
            outcome,
            document_count: 2,
            documents_added: 2,
            documents_replaced: 0,
            documents_unchanged: 0,
            error: None,
        }
    }

    fn request(mode: InstallMode) -> InstallRequest {
        InstallRequest {
            sources: vec![PathBuf::from("/src/a"), PathBuf::from("/src/b")],
            dest_root: PathBuf::from("/out"),
            mode,
            force: false,
        }
    }

    #[test]
    fn open_path_is_last_target() {
        let results = vec![
            result("/src/a", "/out/a", InstallOutcome::Created),
            result("/src/b", "/out/b", InstallOutcome::Created),
        ];
        let report = InstallReporter::report(&request(InstallMode::IsolatedSubdirectories), &results);

        assert_eq!(report.status, ReportStatus::Success);
        assert_eq!(report.open_path, Some(PathBuf::from("/out/b")));
        assert_eq!(report.results[0].catalog_file, PathBuf::from("/out/a/catalog.json"));
    }

    #[test]
    fn status_reflects_failures() {
        let err = KbError::TargetExists {
            path: PathBuf::from("/out/b"),
        };
        let mixed = vec![
            result("/src/a", "/out/a", InstallOutcome::Created),
            InstallResult::rejected(PathBuf::from("/src/b"), PathBuf::from("/out/b"), &err),
        ];
        let report = InstallReporter::report(&request(InstallMode::IsolatedSubdirectories), &mixed);
        assert_eq!(report.status, ReportStatus::Partial);
        assert_eq!(report.failures(), 1);

        let all_failed = vec![mixed[1].clone()];
        let report = InstallReporter::report(&request(InstallMode::Single), &all_failed);
        assert_eq!(report.status, ReportStatus::Error);
        // A skipped pair still names where the KB would have gone.
        assert_eq!(report.open_path, Some(PathBuf::from("/out/b")));
    }

    #[test]
    fn json_shape() {
        let results = vec![result("/src/a", "/out", InstallOutcome::Merged)];
        let report = InstallReporter::report(&request(InstallMode::Merge), &results);
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["status"], "success");
        assert_eq!(value["mode"], "merge");
        assert_eq!(value["open_path"], "/out");
        assert_eq!(value["results"][0]["outcome"], "merged");
        assert_eq!(value["results"][0]["target_kb_root"], "/out");
        assert!(value["results"][0]["error"].is_null());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn rejected_report_carries_error() {
        let err = KbError::InvalidMode {
            mode: "mirror".into(),
        };
        let report = InstallReporter::rejected("mirror", false, &err);
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["status"], "error");
        assert_eq!(value["mode"], "mirror");
        assert!(value["open_path"].is_null());
        assert_eq!(value["results"].as_array().unwrap().len(), 0);
        assert_eq!(value["error"]["code"], "INVALID_MODE");
    }
}
