//! Application configuration for kbinstall.
//!
//! User config lives at `~/.kbinstall/kbinstall.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KbError, Result};
use crate::types::InstallMode;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "kbinstall.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".kbinstall";

// ---------------------------------------------------------------------------
// Config structs (matching kbinstall.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Defaults for `kbinstall install` flags.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Installer behavior switches.
    #[serde(default)]
    pub install: InstallConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Install mode used when `--mode` is not given.
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Destination root used when `--dest` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_root: Option<PathBuf>,

    /// Whether `--force` is implied.
    #[serde(default)]
    pub force: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            dest_root: None,
            force: false,
        }
    }
}

fn default_mode() -> String {
    InstallMode::Single.as_str().into()
}

/// `[install]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Accept `discovery.json` (with its `metadata` block) as a source catalog.
    #[serde(default = "default_true")]
    pub accept_legacy_catalogs: bool,

    /// Skip rewriting documents whose bytes already match the target.
    #[serde(default = "default_true")]
    pub skip_identical_files: bool,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            accept_legacy_catalogs: true,
            skip_identical_files: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.kbinstall/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| KbError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.kbinstall/kbinstall.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| KbError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| KbError::config(format!("failed to parse {}: {e}", path.display())))?;

    validate_config(&config)?;
    Ok(config)
}

/// Reject values that would only fail later, at install time.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    config
        .defaults
        .mode
        .parse::<InstallMode>()
        .map_err(|e| KbError::config(format!("[defaults] mode: {e}")))?;
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| KbError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| KbError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| KbError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}
