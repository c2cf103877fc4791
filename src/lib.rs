pub mod cli;
pub mod coerce;
pub mod config;
pub mod coords;
pub mod data;
pub mod error;
pub mod frame;
pub mod identity;
pub mod io_utils;
pub mod missing;
pub mod pipeline;
pub mod provision;
pub mod schema;
pub mod station;
pub mod stats;
pub mod store;
pub mod table;
pub mod transform;
pub mod upsert;

use std::{env, fs, path::Path, sync::OnceLock, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use encoding_rs::Encoding;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, InputArgs},
    config::PipelineConfig,
    frame::Frame,
    missing::MissingnessTier,
    pipeline::Pipeline,
    schema::Schema,
    store::SqliteStore,
    upsert::UpsertStrategy,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("buoy_etl", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Probe(args) => handle_probe(&args),
        Commands::Nulls(args) => handle_nulls(&args),
        Commands::Clean(args) => handle_clean(&args),
        Commands::Load(args) => handle_load(&args),
        Commands::Stats(args) => stats::execute(&args),
        Commands::Station(args) => handle_station(&args),
    }
}

fn read_input(source: &InputArgs) -> Result<Frame> {
    let encoding: &'static Encoding = io_utils::resolve_encoding(source.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&source.input, source.delimiter);
    info!(
        "Reading '{}' with delimiter '{}'",
        source.input.display(),
        printable_delimiter(delimiter)
    );
    io_utils::read_frame_from_path(&source.input, Some(delimiter), encoding)
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            let config = PipelineConfig::load(path)
                .with_context(|| format!("Loading pipeline config {path:?}"))?;
            debug!("Pipeline config: {config:?}");
            Ok(config)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn handle_probe(args: &cli::ProbeArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let frame = read_input(&args.source)?;
    let (frame, report) = config
        .coercer()
        .coerce(frame)
        .with_context(|| format!("Typing columns of {:?}", args.source.input))?;
    let schema = Schema::from_frame(&frame);
    match &args.output {
        Some(path) => {
            schema
                .save(path)
                .with_context(|| format!("Writing schema to {path:?}"))?;
            info!(
                "Schema for {} column(s) written to {path:?}",
                schema.columns.len()
            );
        }
        None => {
            let headers = ["column", "type", "nulls"].map(String::from).to_vec();
            let rows: Vec<Vec<String>> = schema
                .columns
                .iter()
                .map(|c| vec![c.name.clone(), c.datatype.to_string(), c.nulls.to_string()])
                .collect();
            table::print_table(&headers, &rows);
        }
    }
    let skipped: Vec<&str> = report.skipped().collect();
    if !skipped.is_empty() {
        info!("Left as text: {}", skipped.join(", "));
    }
    Ok(())
}

fn handle_nulls(args: &cli::NullsArgs) -> Result<()> {
    let frame = read_input(&args.source)?;
    let report = missing::null_report(&frame);
    let (headers, rows) = table::null_rows(&report);
    table::print_table(&headers, &rows);
    let tier = MissingnessTier::for_rows(frame.row_count());
    println!(
        "\n{} row(s): tier {tier}, drop threshold {}%",
        frame.row_count(),
        tier.threshold()
    );
    Ok(())
}

fn handle_clean(args: &cli::CleanArgs) -> Result<()> {
    let pipeline = Pipeline::new(load_config(args.config.as_deref())?);
    let frame = read_input(&args.source)?;
    let (frame, report) = pipeline
        .clean(frame)
        .with_context(|| format!("Cleaning {:?}", args.source.input))?;
    if !report.resolution.dropped.is_empty() {
        info!(
            "Tier {} dropped: {}",
            report.resolution.tier,
            report.resolution.dropped.join(", ")
        );
    }
    if let Some(limit) = args.preview {
        let (headers, rows) = table::frame_rows(&frame, limit);
        table::print_table(&headers, &rows);
        return Ok(());
    }
    let delimiter = args.output_delimiter.unwrap_or(io_utils::DEFAULT_CSV_DELIMITER);
    io_utils::write_frame_to_path(args.output.as_deref(), delimiter, &frame)?;
    if let Some(path) = &args.output {
        info!("Wrote {} row(s) to {path:?}", frame.row_count());
    }
    Ok(())
}

fn handle_load(args: &cli::LoadArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(table) = &args.table {
        config.target_table = table.clone();
    }
    if let Some(strategy) = args.strategy {
        config.upsert.strategy = strategy;
        if args.column.is_none() {
            config.upsert.column = None;
        }
    }
    if let Some(column) = &args.column {
        config.upsert.column = Some(column.clone());
    }
    let strategy: UpsertStrategy = config.upsert.resolve();
    let table = config.target_table.clone();

    let frame = read_input(&args.source)?;
    let mut store =
        SqliteStore::open(&args.store, Duration::from_millis(args.busy_timeout_ms))
            .with_context(|| format!("Opening store {:?}", args.store))?;
    let pipeline = Pipeline::new(config);
    let (outcome, _) = pipeline
        .load(frame, &mut store, &table, &strategy)
        .with_context(|| format!("Loading {:?} into '{table}'", args.source.input))?;
    println!("{table}: {}", upsert::describe(&outcome));
    Ok(())
}

fn handle_station(args: &cli::StationArgs) -> Result<()> {
    let text = fs::read_to_string(&args.json)
        .with_context(|| format!("Reading station metadata {:?}", args.json))?;
    let parsed: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("Parsing JSON {:?}", args.json))?;
    let descriptors = match parsed {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };
    let stations = descriptors
        .iter()
        .map(station::parse_station)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Parsing stations in {:?}", args.json))?;

    if args.as_json {
        println!("{}", serde_json::to_string_pretty(&stations)?);
        return Ok(());
    }
    let Some(first) = stations.first() else {
        info!("No station descriptors in {:?}", args.json);
        return Ok(());
    };
    let headers: Vec<String> = first.fields().iter().map(|(h, _)| h.to_string()).collect();
    let rows: Vec<Vec<String>> = stations
        .iter()
        .map(|s| s.fields().into_iter().map(|(_, v)| v).collect())
        .collect();
    table::print_table(&headers, &rows);
    info!("Parsed {} station(s)", stations.len());
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
