use anyhow::{Context, Result as AnyResult, anyhow};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use itertools::Itertools;
use log::info;

use crate::{
    cli::StatsArgs,
    coerce::TypeCoercer,
    data::Value,
    error::{PipelineError, Result},
    frame::{Column, Frame},
    io_utils, missing,
    store::{DEFAULT_BUSY_TIMEOUT, SqliteStore},
    table,
    transform::DATETIME_COLUMN,
};

pub const STATION_ID_COLUMN: &str = "Station ID";
const NO_DATA: &str = "no data";

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len().is_multiple_of(2) {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Sample standard deviation; needs at least two values.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let sum_squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some((sum_squares / (values.len() as f64 - 1.0)).sqrt())
}

pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().copied().minmax_by(f64::total_cmp).into_option()
}

/// Continuous percentile with linear interpolation between closest ranks.
/// `p` is a percentage in `0..=100`.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&p) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Pearson correlation over rows where both columns are present.
pub fn correlation(frame: &Frame, left: &str, right: &str) -> Result<Option<f64>> {
    let a = numeric_column(frame, "correlation", left)?;
    let b = numeric_column(frame, "correlation", right)?;
    let pairs: Vec<(f64, f64)> = a
        .cells()
        .iter()
        .zip(b.cells())
        .filter_map(|(x, y)| Some((x.as_ref()?.as_f64()?, y.as_ref()?.as_f64()?)))
        .collect();
    if pairs.len() < 2 {
        return Ok(None);
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return Ok(None);
    }
    Ok(Some(cov / (var_x.sqrt() * var_y.sqrt())))
}

/// Median of `column` over rows with `start <= Datetime <= end`.
pub fn median_between(
    frame: &Frame,
    column: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Option<f64>> {
    let values = numeric_column(frame, "median", column)?;
    let stamps = frame.require("median", DATETIME_COLUMN)?;
    let selected: Vec<f64> = stamps
        .cells()
        .iter()
        .zip(values.cells())
        .filter_map(|(stamp, value)| match (stamp, value) {
            (Some(Value::DateTime(dt)), Some(v)) if *dt >= start && *dt <= end => v.as_f64(),
            _ => None,
        })
        .collect();
    Ok(median(&selected))
}

/// Median over `[date - window_days, date]`, with `date` taken at midnight.
pub fn moving_median(
    frame: &Frame,
    column: &str,
    date: NaiveDate,
    window_days: i64,
) -> Result<Option<f64>> {
    let end = date.and_time(chrono::NaiveTime::MIN);
    let start = end - TimeDelta::days(window_days);
    median_between(frame, column, start, end)
}

/// Trailing mean of the last `window` present values, ordered by `Datetime`.
/// Each point of the series covers its own row and the `window - 1` before it.
pub fn moving_average(
    frame: &Frame,
    column: &str,
    window: usize,
) -> Result<Vec<(NaiveDateTime, f64)>> {
    let values = numeric_column(frame, "moving average", column)?;
    let stamps = frame.require("moving average", DATETIME_COLUMN)?;
    let series: Vec<(NaiveDateTime, f64)> = stamps
        .cells()
        .iter()
        .zip(values.cells())
        .filter_map(|(stamp, value)| match (stamp, value) {
            (Some(Value::DateTime(dt)), Some(v)) => Some((*dt, v.as_f64()?)),
            _ => None,
        })
        .sorted_by_key(|(dt, _)| *dt)
        .collect();
    if window == 0 || series.len() < window {
        return Ok(Vec::new());
    }
    Ok(series
        .windows(window)
        .map(|slice| {
            let sum: f64 = slice.iter().map(|(_, v)| v).sum();
            (slice[window - 1].0, sum / window as f64)
        })
        .collect())
}

/// Keeps rows of one station.
pub fn filter_station(frame: &Frame, station: &str) -> Result<Frame> {
    let ids = frame.require("station filter", STATION_ID_COLUMN)?;
    let mask: Vec<bool> = ids
        .cells()
        .iter()
        .map(|cell| cell.as_ref().is_some_and(|v| v.key_token() == station))
        .collect();
    Ok(frame.filter_rows(&mask))
}

fn numeric_column<'a>(frame: &'a Frame, stage: &'static str, name: &str) -> Result<&'a Column> {
    let column = frame.require(stage, name)?;
    if !column.datatype().is_numeric() {
        return Err(PipelineError::TypeMismatch {
            column: name.to_string(),
            expected: "numeric".to_string(),
            found: column.datatype().to_string(),
        });
    }
    Ok(column)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std_dev: Option<f64>,
    pub mode: Option<Value>,
}

impl ColumnSummary {
    pub fn from_column(column: &Column) -> Self {
        let values = column.numeric_values();
        let numeric = column.datatype().is_numeric();
        let bounds = if numeric { min_max(&values) } else { None };
        Self {
            name: column.name().to_string(),
            count: column.len() - column.null_count(),
            min: bounds.map(|(min, _)| min),
            max: bounds.map(|(_, max)| max),
            mean: numeric.then(|| mean(&values)).flatten(),
            median: numeric.then(|| median(&values)).flatten(),
            std_dev: numeric.then(|| std_dev(&values)).flatten(),
            mode: missing::mode(column),
        }
    }

    fn render_row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.count.to_string(),
            format_metric(self.min),
            format_metric(self.max),
            format_metric(self.mean),
            format_metric(self.median),
            format_metric(self.std_dev),
            self.mode
                .as_ref()
                .map(Value::key_token)
                .unwrap_or_else(|| NO_DATA.to_string()),
        ]
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.4}")
    }
}

fn format_metric(metric: Option<f64>) -> String {
    metric
        .map(format_number)
        .unwrap_or_else(|| NO_DATA.to_string())
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|h| h.to_string()).collect()
}

fn load_frame(args: &StatsArgs) -> AnyResult<Frame> {
    match (&args.input, &args.store) {
        (Some(input), _) => {
            let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
            let raw = io_utils::read_frame_from_path(input, args.delimiter, encoding)?;
            let (frame, _) = TypeCoercer::default()
                .coerce(raw)
                .with_context(|| format!("Typing columns of {input:?}"))?;
            Ok(frame)
        }
        (None, Some(store)) => {
            let table = args
                .table
                .as_deref()
                .ok_or_else(|| anyhow!("--table is required when reading from --store"))?;
            let store = SqliteStore::open(store, DEFAULT_BUSY_TIMEOUT)
                .with_context(|| format!("Opening store {store:?}"))?;
            store
                .read_frame(table)
                .with_context(|| format!("Reading table '{table}'"))
        }
        (None, None) => Err(anyhow!("Provide either --input or --store")),
    }
}

pub fn execute(args: &StatsArgs) -> AnyResult<()> {
    let mut frame = load_frame(args)?;
    if let Some(station) = &args.station {
        frame = filter_station(&frame, station)?;
        info!("Filtered to station {station}: {} row(s)", frame.row_count());
    }

    let columns: Vec<String> = if args.columns.is_empty() {
        frame
            .columns()
            .iter()
            .filter(|c| c.datatype().is_numeric())
            .map(|c| c.name().to_string())
            .collect()
    } else {
        args.columns.clone()
    };
    if columns.is_empty() {
        return Err(anyhow!(
            "No numeric columns available. Provide an explicit column list."
        ));
    }

    let rows = columns
        .iter()
        .map(|name| {
            frame
                .require("stats", name)
                .map(|column| ColumnSummary::from_column(column).render_row())
        })
        .collect::<Result<Vec<_>>>()?;
    table::print_table(
        &headers(&["column", "count", "min", "max", "mean", "median", "std_dev", "mode"]),
        &rows,
    );

    if !args.percentiles.is_empty() {
        let mut rows = Vec::new();
        for name in &columns {
            let values = numeric_column(&frame, "percentiles", name)?.numeric_values();
            for p in &args.percentiles {
                rows.push(vec![
                    name.clone(),
                    format_number(*p),
                    format_metric(percentile(&values, *p)),
                ]);
            }
        }
        println!();
        table::print_table(&headers(&["column", "percentile", "value"]), &rows);
    }

    if let Some((left, right)) = &args.correlate {
        let value = correlation(&frame, left, right)?;
        println!();
        table::print_table(
            &headers(&["left", "right", "correlation"]),
            &[vec![left.clone(), right.clone(), format_metric(value)]],
        );
    }

    if let Some(date) = args.moving_median {
        let rows = columns
            .iter()
            .map(|name| {
                let value = moving_median(&frame, name, date, args.window_days)?;
                let start = date - TimeDelta::days(args.window_days);
                Ok(vec![
                    name.clone(),
                    start.to_string(),
                    date.to_string(),
                    format_metric(value),
                ])
            })
            .collect::<Result<Vec<_>>>()?;
        println!();
        table::print_table(&headers(&["column", "start", "end", "moving_median"]), &rows);
    }

    if let Some(window) = args.moving_average {
        let rows = columns
            .iter()
            .map(|name| {
                let series = moving_average(&frame, name, window)?;
                let (at, value) = match series.last() {
                    Some((at, value)) => (at.to_string(), Some(*value)),
                    None => (NO_DATA.to_string(), None),
                };
                Ok(vec![name.clone(), window.to_string(), at, format_metric(value)])
            })
            .collect::<Result<Vec<_>>>()?;
        println!();
        table::print_table(&headers(&["column", "window", "latest", "moving_average"]), &rows);
    }

    info!("Computed statistics for {} column(s)", columns.len());
    Ok(())
}
