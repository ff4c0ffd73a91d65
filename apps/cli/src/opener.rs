//! Open a directory in the platform file manager.

use std::path::Path;
use std::process::{Command, Stdio};

use color_eyre::eyre::{Result, eyre};
use tracing::{debug, warn};

#[cfg(target_os = "windows")]
const OPENER: &str = "explorer";
#[cfg(target_os = "macos")]
const OPENER: &str = "open";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const OPENER: &str = "xdg-open";

/// Open `path`, logging a warning instead of failing. Stdout stays reserved
/// for the report, so the opener's own output is discarded.
pub(crate) fn open_directory(path: &Path) {
    if let Err(e) = try_open(path) {
        warn!(path = %path.display(), error = %e, "could not open directory");
    }
}

fn try_open(path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Err(eyre!("not a directory"));
    }

    let status = Command::new(OPENER)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| eyre!("failed to run {OPENER}: {e}"))?;

    // explorer.exe reports 1 even on success.
    if !status.success() && !cfg!(target_os = "windows") {
        return Err(eyre!("{OPENER} exited with {status}"));
    }

    debug!(path = %path.display(), opener = OPENER, "opened directory");
    Ok(())
}
