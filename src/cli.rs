use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::{store::DEFAULT_BUSY_TIMEOUT, upsert::StrategyKind};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Clean buoy and weather observations and load them incrementally",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Coerce column types and report the inferred schema with null counts
    Probe(ProbeArgs),
    /// Print null counts per column and the missingness tier of the table
    Nulls(NullsArgs),
    /// Run the cleaning pipeline and write the resulting table as CSV
    Clean(CleanArgs),
    /// Run the cleaning pipeline and append new rows to a SQLite store
    Load(LoadArgs),
    /// Descriptive statistics over a CSV file or a stored table
    Stats(StatsArgs),
    /// Parse buoy station metadata from a JSON descriptor
    Station(StationArgs),
}

#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// Input CSV file (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// Write the schema as YAML to this path instead of printing a table
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Pipeline configuration supplying boolean flags and datetime hints
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct NullsArgs {
    #[command(flatten)]
    pub source: InputArgs,
}

#[derive(Debug, Args)]
pub struct CleanArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// Output CSV file (stdout when omitted or `-`)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Pipeline configuration (YAML)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Delimiter for the output file (defaults to ',')
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Print the first N cleaned rows as a table instead of writing CSV
    #[arg(long)]
    pub preview: Option<usize>,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// SQLite database file receiving the rows
    #[arg(long)]
    pub store: PathBuf,
    /// Pipeline configuration (YAML)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Target table (overrides `target_table` in the config)
    #[arg(long)]
    pub table: Option<String>,
    /// Upsert strategy (overrides the config)
    #[arg(long, value_parser = parse_strategy)]
    pub strategy: Option<StrategyKind>,
    /// Ordering column (watermark) or reference column (key-set)
    #[arg(long)]
    pub column: Option<String>,
    /// Milliseconds to wait for another loader's write lock
    #[arg(long = "busy-timeout-ms", default_value_t = DEFAULT_BUSY_TIMEOUT.as_millis() as u64)]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Input CSV file
    #[arg(short = 'i', long = "input", conflicts_with = "store")]
    pub input: Option<PathBuf>,
    /// SQLite database to read from instead of a CSV file
    #[arg(long, requires = "table")]
    pub store: Option<PathBuf>,
    /// Stored table to read
    #[arg(long)]
    pub table: Option<String>,
    /// Columns to summarize (defaults to every numeric column)
    #[arg(short = 'C', long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
    /// Percentiles between 0 and 100, comma separated
    #[arg(long, value_delimiter = ',', value_parser = parse_percentile)]
    pub percentiles: Vec<f64>,
    /// Pearson correlation between two numeric columns, as `a,b`
    #[arg(long, value_parser = parse_column_pair)]
    pub correlate: Option<(String, String)>,
    /// Moving median ending at this date (YYYY-MM-DD)
    #[arg(long = "moving-median", value_parser = parse_date)]
    pub moving_median: Option<NaiveDate>,
    /// Length of the moving median window in days
    #[arg(long = "window-days", default_value_t = 7)]
    pub window_days: i64,
    /// Trailing moving average over the last N rows ordered by Datetime
    #[arg(long = "moving-average")]
    pub moving_average: Option<usize>,
    /// Restrict to a single `Station ID`
    #[arg(long)]
    pub station: Option<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct StationArgs {
    /// JSON file holding one station descriptor or an array of them
    #[arg(long)]
    pub json: PathBuf,
    /// Print the parsed stations as JSON instead of a table
    #[arg(long = "as-json")]
    pub as_json: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "pipe" | "|" => Ok(b'|'),
        "semicolon" | ";" => Ok(b';'),
        other => match other.as_bytes() {
            [] => Err("Delimiter cannot be empty".to_string()),
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err("Delimiter must be a single ASCII character".to_string()),
        },
    }
}

fn parse_strategy(value: &str) -> Result<StrategyKind, String> {
    value.parse().map_err(|err| format!("{err}"))
}

fn parse_percentile(value: &str) -> Result<f64, String> {
    let p: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if (0.0..=100.0).contains(&p) {
        Ok(p)
    } else {
        Err("Percentiles must be between 0 and 100".to_string())
    }
}

fn parse_column_pair(value: &str) -> Result<(String, String), String> {
    match value.split_once(',') {
        Some((a, b)) if !a.trim().is_empty() && !b.trim().is_empty() => {
            Ok((a.trim().to_string(), b.trim().to_string()))
        }
        _ => Err("Expected two column names separated by a comma".to_string()),
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("'{value}' is not a YYYY-MM-DD date"))
}
