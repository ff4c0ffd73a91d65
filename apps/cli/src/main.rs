//! kbinstall CLI: install and merge knowledge bases.
//!
//! Copies source KBs (a catalog plus its cached documents) into a destination
//! and reports every outcome as JSON on stdout.

mod commands;
mod opener;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
