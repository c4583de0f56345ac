//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// timebin -- time-binned feature counting, aggregation and change detection.
///
/// Every data command reads an FSDB (tab separated) stream from a file or
/// stdin and writes one to a file or stdout. Logs always go to stderr.
#[derive(Parser, Debug)]
#[command(name = "timebin", version, about, long_about = None)]
pub struct Cli {
    /// Path to the timebin.toml configuration file (defaults apply if missing).
    #[arg(short, long, global = true, default_value = "timebin.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// FSDB rows for data, human-readable text for reports.
    Text,
    /// One JSON object per row; pretty JSON for reports.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Count features per time bin (Feature Counter).
    Count(CountArgs),

    /// Re-aggregate (timebin, index, key, subkey, value) tuples per bin.
    Aggregate(AggregateArgs),

    /// Compute relationship columns over each bin's tuples.
    Relate(RelateArgs),

    /// Detect sudden rises and drops in per-key time series.
    Edges(EdgesArgs),

    /// Run count, aggregate and relate as one concurrent pipeline.
    Run(RunArgs),

    /// List registered function names.
    Functions(FunctionsArgs),

    /// Manage runtime configuration.
    Config(ConfigArgs),
}

/// Input and output streams shared by every data command.
#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    /// Input FSDB file ("-" for stdin).
    #[arg(default_value = "-")]
    pub input: PathBuf,

    /// Output file ("-" for stdout).
    #[arg(default_value = "-")]
    pub output_file: PathBuf,
}

// ---- count ----

/// Count features per time bin.
#[derive(Args, Debug)]
pub struct CountArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// YAML analysis specification with a featureCounter section.
    #[arg(short = 'y', long = "spec")]
    pub spec: Option<PathBuf>,

    /// Index definition `name:function[:arg,...[:value[:arg,...]]]` (repeatable).
    #[arg(short = 's', long = "index", conflicts_with = "spec")]
    pub indices: Vec<String>,

    /// Time column (name, col(name) or position).
    #[arg(short = 't', long)]
    pub time_column: Option<String>,

    /// Time bin size in seconds.
    #[arg(short = 'b', long)]
    pub bin_size: Option<u32>,

    /// Hold every bin until the input ends (input need not be sorted).
    #[arg(long)]
    pub bulk: bool,
}

// ---- aggregate ----

/// Re-aggregate tuples per bin.
#[derive(Args, Debug)]
pub struct AggregateArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// YAML analysis specification with an aggregator section.
    #[arg(short = 'y', long = "spec")]
    pub spec: Option<PathBuf>,

    /// Aggregation strategy `name[:arg,...]` (repeatable, default: sum).
    #[arg(short = 'a', long = "aggregator", conflicts_with = "spec")]
    pub aggregators: Vec<String>,
}

// ---- relate ----

/// Compute relationship columns.
#[derive(Args, Debug)]
pub struct RelateArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// YAML analysis specification with a relationshipAnalysis section.
    #[arg(short = 'y', long = "spec")]
    pub spec: PathBuf,
}

// ---- edges ----

/// Detect rises and drops.
#[derive(Args, Debug)]
pub struct EdgesArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// YAML analysis specification with an edgeDetect section.
    #[arg(short = 'y', long = "spec")]
    pub spec: Option<PathBuf>,

    /// Time column (name, col(name) or position).
    #[arg(short = 't', long)]
    pub time_column: Option<String>,

    /// Time bin size in seconds.
    #[arg(short = 'b', long)]
    pub bin_size: Option<u32>,

    /// Column identifying each series.
    #[arg(short = 'k', long)]
    pub key_column: Option<String>,

    /// Columns to analyze (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Number of bins summed on each side.
    #[arg(short = 'w', long)]
    pub window_size: Option<usize>,

    /// Number of bins ignored between the two sides.
    #[arg(short = 'm', long)]
    pub middle_size: Option<usize>,

    /// Report when the sums differ by more than this.
    #[arg(short = 'z', long)]
    pub zero_jump: Option<f64>,

    /// Report when one sum exceeds the other by more than this factor.
    #[arg(long)]
    pub scale_height: Option<f64>,

    /// Per-bin minimum for the larger side.
    #[arg(long)]
    pub min_value: Option<f64>,

    /// Input is long-format (series, time, value) rows grouped by series.
    #[arg(long, conflicts_with = "explode")]
    pub grouped: bool,

    /// Only explode wide rows into long-format (series, time, value) rows.
    #[arg(long)]
    pub explode: bool,
}

// ---- run ----

/// Run the concurrent pipeline.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// YAML analysis specification (featureCounter plus optional
    /// aggregator and relationshipAnalysis sections).
    #[arg(short = 'y', long = "spec")]
    pub spec: PathBuf,

    /// Hold every bin until the input ends.
    #[arg(long)]
    pub bulk: bool,
}

// ---- functions ----

/// List registered functions.
#[derive(Args, Debug)]
pub struct FunctionsArgs {
    /// Show only one kind (extractor, value, combine, filter, relationship, aggregation).
    #[arg(long)]
    pub kind: Option<String>,
}

// ---- config ----

/// Manage timebin configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, defaults).
        #[arg(long)]
        section: Option<String>,
    },
}
