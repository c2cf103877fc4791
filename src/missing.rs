//! Missingness-adaptive column dropping and imputation.
//!
//! The row count selects a [`MissingnessTier`] whose threshold decides, per
//! column, whether nulls are filled or the column is dropped outright.
//! Numeric columns are filled with their median, everything else with its
//! mode. Rows are never removed.

use std::{collections::BTreeMap, fmt};

use log::{debug, info};

use crate::{
    data::Value,
    error::Result,
    frame::{Column, Frame},
    schema::{ColumnType, SemanticType},
    stats,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingnessTier {
    Green,
    Yellow,
    Orange,
    Red,
}

impl MissingnessTier {
    pub fn for_rows(rows: usize) -> Self {
        match rows {
            n if n > 100_000 => MissingnessTier::Green,
            n if n > 10_000 => MissingnessTier::Yellow,
            n if n > 2_000 => MissingnessTier::Orange,
            _ => MissingnessTier::Red,
        }
    }

    /// Missing percentage above which a column is dropped.
    pub fn threshold(self) -> f64 {
        match self {
            MissingnessTier::Green => 70.0,
            MissingnessTier::Yellow => 60.0,
            MissingnessTier::Orange => 55.0,
            MissingnessTier::Red => 50.0,
        }
    }
}

impl fmt::Display for MissingnessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MissingnessTier::Green => "green",
            MissingnessTier::Yellow => "yellow",
            MissingnessTier::Orange => "orange",
            MissingnessTier::Red => "red",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnNulls {
    pub name: String,
    pub nulls: usize,
    pub rows: usize,
}

impl ColumnNulls {
    pub fn missing_pct(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.nulls as f64 / self.rows as f64 * 100.0
        }
    }
}

/// Per-column null counts in column order.
pub fn null_report(frame: &Frame) -> Vec<ColumnNulls> {
    frame
        .columns()
        .iter()
        .map(|column| ColumnNulls {
            name: column.name().to_string(),
            nulls: column.null_count(),
            rows: frame.row_count(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub tier: MissingnessTier,
    pub dropped: Vec<String>,
    pub imputed: Vec<(String, Value)>,
}

/// Applies the tier policy to every column of `frame`.
pub fn resolve(frame: Frame) -> Result<(Frame, Resolution)> {
    let rows = frame.row_count();
    let tier = MissingnessTier::for_rows(rows);
    let mut resolution = Resolution {
        tier,
        dropped: Vec::new(),
        imputed: Vec::new(),
    };
    if rows == 0 {
        info!("Empty table; tier {tier}, nothing to resolve");
        return Ok((frame, resolution));
    }

    let threshold = tier.threshold();
    let mut kept = Vec::with_capacity(frame.column_count());
    for column in frame.into_columns() {
        let nulls = column.null_count();
        if nulls == 0 {
            kept.push(column);
            continue;
        }
        let missing_pct = nulls as f64 / rows as f64 * 100.0;
        if missing_pct > threshold {
            debug!(
                "Dropping '{}' ({missing_pct:.1}% missing > {threshold}%)",
                column.name()
            );
            resolution.dropped.push(column.name().to_string());
            continue;
        }
        match impute(column)? {
            (column, Some(fill)) => {
                debug!("Filled {nulls} null(s) in '{}' with {fill}", column.name());
                resolution.imputed.push((column.name().to_string(), fill));
                kept.push(column);
            }
            (column, None) => kept.push(column),
        }
    }

    info!(
        "Tier {tier} ({rows} rows, threshold {threshold}%): dropped {} column(s), imputed {}",
        resolution.dropped.len(),
        resolution.imputed.len()
    );
    Ok((Frame::new(kept)?, resolution))
}

fn impute(column: Column) -> Result<(Column, Option<Value>)> {
    let fill = match column.datatype().semantic() {
        SemanticType::Numeric => median_fill(&column),
        _ => mode(&column),
    };
    let Some(fill) = fill else {
        return Ok((column, None));
    };
    let datatype = fill.column_type();
    let name = column.name().to_string();
    let cells = column
        .into_cells()
        .into_iter()
        .map(|cell| match cell {
            Some(value) => value.convert_to(&datatype),
            None => Some(fill.clone()),
        })
        .collect();
    Ok((Column::new(name, datatype, cells)?, Some(fill)))
}

/// Median as a cell value. Integer columns whose median is fractional are
/// widened to float.
fn median_fill(column: &Column) -> Option<Value> {
    let median = stats::median(&column.numeric_values())?;
    match column.datatype() {
        ColumnType::Integer if median.fract() == 0.0 => Some(Value::Integer(median as i64)),
        _ => Some(Value::Float(median)),
    }
}

/// Most frequent non-null value; ties resolve to the smallest value.
pub fn mode(column: &Column) -> Option<Value> {
    let mut counts: BTreeMap<&Value, usize> = BTreeMap::new();
    for value in column.non_null() {
        *counts.entry(value).or_default() += 1;
    }
    let mut best: Option<(&Value, usize)> = None;
    for (value, count) in counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.clone())
}
