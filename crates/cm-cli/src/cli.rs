//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use cm_core::ExportFormat;

/// Coding-activity metrics store.
///
/// Records keystroke, undo/redo, compile, error and idle signals from an
/// instrumented page and summarizes them per site and day.
#[derive(Debug, Parser)]
#[command(name = "cm", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the database and default settings.
    Init,

    /// Record one raw event (JSON object).
    Record {
        /// The event payload. Read from stdin when omitted.
        payload: Option<String>,
    },

    /// Bulk-import events from stdin. Nothing is stored if any event is invalid.
    Import {
        /// Input format.
        #[arg(long, value_enum, default_value_t = ImportFormat::Jsonl)]
        format: ImportFormat,
    },

    /// Show the summary for a site and day.
    Summary {
        /// Site origin (e.g., <https://example.com>).
        #[arg(long, required_unless_present = "all")]
        origin: Option<String>,

        /// Day in YYYY-MM-DD form (defaults to today, local time).
        #[arg(long)]
        day: Option<String>,

        /// Show every site and day that has events.
        #[arg(long, conflicts_with_all = ["origin", "day"])]
        all: bool,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Export every recorded event.
    Export {
        /// Output format: json or csv.
        #[arg(long, default_value = "json")]
        format: ExportFormat,

        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export one summary as a labeled JSON record.
    ExportSummary {
        /// Site origin.
        #[arg(long)]
        origin: String,

        /// Day in YYYY-MM-DD form (defaults to today, local time).
        #[arg(long)]
        day: Option<String>,

        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete all recorded events. Settings are kept.
    Clear,

    /// Read or change settings.
    #[command(subcommand)]
    Settings(SettingsAction),

    /// Rebuild the summary cache from the event log.
    Recompute {
        /// Only compare the cache with the log; fail if they differ.
        #[arg(long)]
        check: bool,
    },

    /// Show database status.
    Status,

    /// Answer JSON requests, one per line, on stdin/stdout.
    Serve,
}

/// Settings subcommands.
#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Print the current settings.
    Get {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Replace the settings record.
    Set {
        /// Idle threshold in milliseconds.
        #[arg(long, allow_negative_numbers = true)]
        idle_ms: i64,
    },
}

/// Input formats accepted by `import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImportFormat {
    /// One JSON event object per line.
    Jsonl,
    /// CSV as produced by `export --format csv`.
    Csv,
}
