//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use kbinstall_core::{
    CatalogStore, InstallProgress, InstallReport, InstallReporter, MergeEngine, verify_kb,
};
use kbinstall_shared::{
    AppConfig, DocumentEntry, InstallMode, InstallRequest, InstallResult, KbError, Upsert,
    init_config, init_config_at, load_config, load_config_from,
};
use tracing::{debug, info};

use crate::opener;

/// Every pair succeeded.
const EXIT_OK: u8 = 0;
/// At least one pair failed or was skipped; `verify` found problems.
const EXIT_PARTIAL: u8 = 1;
/// The request was rejected before any pair ran.
const EXIT_REJECTED: u8 = 2;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// kbinstall: install knowledge bases into a destination, merging safely.
#[derive(Parser)]
#[command(
    name = "kbinstall",
    version,
    about = "Install and merge knowledge bases (catalog.json + cache/) with a JSON report.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json. Logs always go to stderr.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.kbinstall/kbinstall.toml.
    #[arg(long, env = "KBINSTALL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Install one or more source KBs and print a JSON report.
    Install {
        /// Source KB directories, applied in the order given.
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Destination root: the parent of new KBs, or the KB itself in merge mode.
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Install mode: single, merge, or isolated-subdirectories.
        #[arg(short, long)]
        mode: Option<String>,

        /// Proceed into a non-empty target (merges, never wipes).
        #[arg(long)]
        force: bool,

        /// Open the resulting KB directory in the file manager.
        #[arg(long)]
        open: bool,
    },

    /// Check that a KB's catalog and cache files agree.
    Verify {
        /// KB root directory.
        kb: PathBuf,
    },

    /// Create an empty KB (catalog.json + cache/).
    New {
        /// KB root directory to create.
        kb: PathBuf,
    },

    /// Add one catalog entry, or replace the entry at the same path.
    Register {
        /// KB root directory.
        #[arg(long)]
        kb: PathBuf,

        /// Document path relative to the KB's cache/ directory.
        #[arg(long)]
        path: String,

        /// Original source locator.
        #[arg(long)]
        uri: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        summary: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Stdout is reserved for command output.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kbinstall=warn",
        1 => "kbinstall=info",
        2 => "kbinstall=debug",
        _ => "kbinstall=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config;
    match cli.command {
        Command::Install {
            sources,
            dest,
            mode,
            force,
            open,
        } => cmd_install(config_path.as_deref(), sources, dest, mode, force, open),
        Command::Verify { kb } => cmd_verify(config_path.as_deref(), &kb),
        Command::New { kb } => cmd_new(&kb),
        Command::Register {
            kb,
            path,
            uri,
            title,
            summary,
        } => {
            let mut entry = DocumentEntry::new(path);
            entry.uri = uri;
            entry.title = title;
            entry.summary = summary;
            cmd_register(&kb, &entry)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path.as_deref()),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

/// Load config from `--config` when given (missing file means defaults),
/// otherwise from the default location.
fn load_app_config(path: Option<&Path>) -> kbinstall_shared::Result<AppConfig> {
    match path {
        Some(p) if p.exists() => load_config_from(p),
        Some(p) => {
            debug!(path = %p.display(), "config file not found, using defaults");
            Ok(AppConfig::default())
        }
        None => load_config(),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_install(
    config_path: Option<&Path>,
    sources: Vec<PathBuf>,
    dest: Option<PathBuf>,
    mode: Option<String>,
    force: bool,
    open: bool,
) -> Result<ExitCode> {
    let config = match load_app_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            let mode = mode.unwrap_or_default();
            return print_rejected(&InstallReporter::rejected(&mode, force, &e), &e);
        }
    };

    let mode_str = mode.unwrap_or_else(|| config.defaults.mode.clone());
    let force = force || config.defaults.force;

    let mode: InstallMode = match mode_str.parse() {
        Ok(m) => m,
        Err(e) => return print_rejected(&InstallReporter::rejected(&mode_str, force, &e), &e),
    };

    let Some(dest_root) = dest.or_else(|| config.defaults.dest_root.clone()) else {
        let e = KbError::ambiguous_target(
            ".",
            "no destination given; pass --dest or set [defaults] dest_root",
        );
        return print_rejected(&InstallReporter::rejected(&mode_str, force, &e), &e);
    };

    let request = InstallRequest {
        sources,
        dest_root,
        mode,
        force,
    };

    info!(
        mode = %request.mode,
        force = request.force,
        dest_root = %request.dest_root.display(),
        sources = request.sources.len(),
        "installing knowledge bases"
    );

    let engine = MergeEngine::from_config(&config.install);
    let progress = CliProgress::new();
    let outcome = engine.install(&request, &progress);
    progress.finish();

    let results = match outcome {
        Ok(results) => results,
        Err(e) => return print_rejected(&InstallReporter::rejected(&mode_str, force, &e), &e),
    };

    let report = InstallReporter::report(&request, &results);
    print!("{}", report.to_json()?);

    if open {
        if let Some(path) = report.open_path.as_deref() {
            opener::open_directory(path);
        }
    }

    Ok(ExitCode::from(if report.failures() == 0 {
        EXIT_OK
    } else {
        EXIT_PARTIAL
    }))
}

fn print_rejected(report: &InstallReport, err: &KbError) -> Result<ExitCode> {
    tracing::error!(code = err.code(), error = %err, "install request rejected");
    print!("{}", report.to_json()?);
    Ok(ExitCode::from(EXIT_REJECTED))
}

fn cmd_verify(config_path: Option<&Path>, kb: &Path) -> Result<ExitCode> {
    let config = load_app_config(config_path)?;
    let store = CatalogStore::new(config.install.accept_legacy_catalogs);
    let report = verify_kb(&store, kb)?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(ExitCode::from(if report.is_clean() {
        EXIT_OK
    } else {
        EXIT_PARTIAL
    }))
}

fn cmd_new(kb: &Path) -> Result<ExitCode> {
    CatalogStore::default().init(kb)?;
    println!("Knowledge base created at: {}", kb.display());
    Ok(ExitCode::from(EXIT_OK))
}

fn cmd_register(kb: &Path, entry: &DocumentEntry) -> Result<ExitCode> {
    if !CatalogStore::catalog_path(kb).exists() {
        return Err(eyre!(
            "no catalog.json at '{}'; create the KB first with `kbinstall new`",
            kb.display()
        ));
    }

    let verb = match CatalogStore::default().register(kb, entry)? {
        Upsert::Inserted => "added",
        Upsert::Replaced { changed: true } => "updated",
        Upsert::Replaced { changed: false } => "unchanged",
    };
    println!("{verb}: {}", entry.path);
    Ok(ExitCode::from(EXIT_OK))
}

fn cmd_config_init(config_path: Option<&Path>) -> Result<ExitCode> {
    let path = match config_path {
        Some(p) => {
            init_config_at(p)?;
            p.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(ExitCode::from(EXIT_OK))
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<ExitCode> {
    let config = load_app_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(ExitCode::from(EXIT_OK))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl InstallProgress for CliProgress {
    fn pair_started(&self, index: usize, total: usize, source: &Path, target: &Path) {
        self.spinner.set_message(format!(
            "[{index}/{total}] {} -> {}",
            source.display(),
            target.display()
        ));
    }

    fn document_copied(&self, path: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Copying [{current}/{total}] {path}"));
    }

    fn pair_finished(&self, result: &InstallResult) {
        self.spinner.println(format!(
            "  {}: {}",
            result.outcome.as_str(),
            result.target.display()
        ));
    }
}
