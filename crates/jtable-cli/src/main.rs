//! JTable CLI
//!
//! Opens a table from a JSON data file (or a generated sample), applies a
//! query and prints the visible page. Row edits go through the same
//! controller operations a UI would call.

use clap::Parser;

mod cli;
mod commands;
mod dataset;
mod logging;
mod render;
mod source;

use crate::cli::{Cli, Command};
use crate::logging::LoggingConfig;
use jtable_services::TableSettings;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::default()
    }
    .with_format(cli.log_format);
    if let Err(error) = logging::init(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }

    if let Err(error) = run(cli).await {
        tracing::error!(error = %error, "Command failed");
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings_path = cli.settings.unwrap_or_else(commands::default_settings_path);

    if let Command::Settings { init } = cli.command {
        return commands::run_settings(&settings_path, init);
    }

    let settings = TableSettings::load_from(&settings_path)?;
    tracing::debug!(?settings, path = %settings_path.display(), "Using table settings");

    match cli.command {
        Command::View(args) => commands::run_view(args, &settings).await,
        Command::Add(args) => commands::run_add(args, &settings).await,
        Command::Update(args) => commands::run_update(args, &settings).await,
        Command::Delete(args) => commands::run_delete(args, &settings).await,
        Command::Settings { .. } => Ok(()),
    }
}
