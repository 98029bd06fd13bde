//! CLI argument definitions for the `jtable` binary

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::logging::LogFormat;

#[derive(Parser)]
#[command(
    name = "jtable",
    version,
    about = "Page, sort, filter and edit tabular data from the terminal",
    long_about = "Drive a JTable controller from the command line.\n\n\
                  Tables come from a JSON data file or a generated sample and can be\n\
                  resolved in memory (client mode) or through a simulated data source\n\
                  (server mode)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Settings file (default: <config dir>/jtable/settings.json)
    #[arg(long, value_name = "PATH", global = true, env = "JTABLE_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormat,

    /// Verbose logging, including resolution spans
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show one page of a table
    View(ViewArgs),

    /// Add a row, then show the table
    Add(AddArgs),

    /// Patch a row by id, then show the table
    Update(UpdateArgs),

    /// Delete a row by id, then show the table
    Delete(DeleteArgs),

    /// Show or create the settings file
    Settings {
        /// Write the default settings if the file does not exist
        #[arg(long)]
        init: bool,
    },
}

/// Where the table comes from and how it is resolved
#[derive(Args, Debug, Clone)]
pub struct TableArgs {
    /// JSON data file with "config" and "rows"
    #[arg(long, value_name = "FILE")]
    pub data: Option<PathBuf>,

    /// Rows in the generated sample when no data file is given
    #[arg(long, default_value_t = 100)]
    pub sample_rows: usize,

    /// Resolve pages through a data source instead of in memory
    #[arg(long)]
    pub server: bool,

    /// Simulated data source latency in milliseconds (server mode)
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,
}

/// Query applied before the page is shown
#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Page to show (1-indexed, clamped to the last page)
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Rows per page (default from settings)
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Sort column; prefix with '-' for descending, e.g. --sort=-salary
    #[arg(long, allow_hyphen_values = true)]
    pub sort: Option<String>,

    /// Column filter: COLUMN=TEXT, COLUMN=MIN..MAX or COLUMN=A|B|C
    #[arg(long = "filter", value_name = "COLUMN=EXPR")]
    pub filters: Vec<String>,

    /// Search text matched against searchable columns
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Args, Debug)]
pub struct ViewArgs {
    #[command(flatten)]
    pub table: TableArgs,

    #[command(flatten)]
    pub query: QueryArgs,

    /// Print the snapshot as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[command(flatten)]
    pub table: TableArgs,

    /// Field values: FIELD=VALUE
    #[arg(value_name = "FIELD=VALUE", required = true)]
    pub fields: Vec<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub table: TableArgs,

    /// Row id
    pub id: String,

    /// Field values to patch: FIELD=VALUE
    #[arg(value_name = "FIELD=VALUE", required = true)]
    pub fields: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub table: TableArgs,

    /// Row id
    pub id: String,
}
