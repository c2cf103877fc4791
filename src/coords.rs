//! Coordinate token parsing into signed decimal degrees.
//!
//! Two representations are accepted:
//!
//! - [`parse_coordinate`]: a magnitude with an optional sign and an optional
//!   trailing hemisphere letter (`45.50N`, `122.33W`, `-10.0`).
//! - [`parse_suffixed`]: a token whose last character is always the
//!   hemisphere letter, for sources that guarantee that shape.
//!
//! `S` and `W` negate the magnitude, `N` and `E` keep it positive. Both
//! forms fail with [`PipelineError::InvalidCoordinate`] rather than guessing.

use std::sync::OnceLock;

use regex::Regex;

use crate::{
    data::{Value, parse_float},
    error::{PipelineError, Result},
    frame::{Column, Frame},
    schema::ColumnType,
};

fn coordinate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([-+]?\d+(?:\.\d+)?)\s*([NSEWnsew]?)$").expect("valid coordinate regex")
    })
}

fn latitude_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"([+-]?\d+\.\d+|\d+)\s*([NS])").expect("valid latitude regex"))
}

fn longitude_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"([+-]?\d+\.\d+|\d+)\s*([EW])").expect("valid longitude regex"))
}

fn invalid(token: &str) -> PipelineError {
    PipelineError::InvalidCoordinate {
        token: token.to_string(),
    }
}

fn apply_hemisphere(magnitude: f64, hemisphere: char) -> f64 {
    match hemisphere.to_ascii_uppercase() {
        'S' | 'W' => -magnitude.abs(),
        _ => magnitude,
    }
}

/// Parses `45.50N`, `122.33W`, `-10.0` and friends into signed degrees.
pub fn parse_coordinate(token: &str) -> Result<f64> {
    let trimmed = token.trim();
    let captures = coordinate_pattern()
        .captures(trimmed)
        .ok_or_else(|| invalid(token))?;
    let magnitude = parse_float(&captures[1]).ok_or_else(|| invalid(token))?;
    Ok(match captures[2].chars().next() {
        Some(hemisphere) => apply_hemisphere(magnitude, hemisphere),
        None => magnitude,
    })
}

/// Parses a token whose last character must be a hemisphere letter.
pub fn parse_suffixed(token: &str) -> Result<f64> {
    let trimmed = token.trim();
    let mut chars = trimmed.chars();
    let hemisphere = chars.next_back().ok_or_else(|| invalid(token))?;
    if !matches!(hemisphere.to_ascii_uppercase(), 'N' | 'S' | 'E' | 'W') {
        return Err(invalid(token));
    }
    let magnitude = parse_float(chars.as_str()).ok_or_else(|| invalid(token))?;
    if magnitude.is_sign_negative() {
        return Err(invalid(token));
    }
    Ok(apply_hemisphere(magnitude, hemisphere))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Scans a combined location string for an `N`/`S` token and an `E`/`W`
/// token independently, returning `(latitude, longitude)` rounded to two
/// decimal places.
pub fn extract_lat_lon(location: &str) -> Result<(f64, f64)> {
    let scan = |pattern: &Regex| -> Result<f64> {
        let captures = pattern
            .captures(location)
            .ok_or_else(|| invalid(location))?;
        let magnitude = parse_float(&captures[1]).ok_or_else(|| invalid(location))?;
        let hemisphere = captures[2].chars().next().unwrap_or('N');
        Ok(round2(apply_hemisphere(magnitude, hemisphere)))
    };
    Ok((scan(latitude_pattern())?, scan(longitude_pattern())?))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinateSource {
    /// Separate latitude and longitude columns, each normalized in place.
    Columns { latitude: String, longitude: String },
    /// One combined location column, split into `Latitude` and `Longitude`.
    Location { column: String },
}

/// Rewrites the geographic columns of `frame` as float degrees. Any
/// malformed token aborts the stage.
pub fn normalize_frame(mut frame: Frame, source: &CoordinateSource) -> Result<Frame> {
    match source {
        CoordinateSource::Columns {
            latitude,
            longitude,
        } => {
            for name in [latitude, longitude] {
                let column = frame.require("coordinates", name)?;
                let normalized = normalize_column(column)?;
                frame.replace_column(normalized)?;
            }
            Ok(frame)
        }
        CoordinateSource::Location { column } => {
            let location = frame.require("coordinates", column)?;
            let mut lats = Vec::with_capacity(location.len());
            let mut lons = Vec::with_capacity(location.len());
            for cell in location.cells() {
                match cell {
                    Some(value) => {
                        let (lat, lon) = extract_lat_lon(&value.key_token())?;
                        lats.push(Some(Value::Float(lat)));
                        lons.push(Some(Value::Float(lon)));
                    }
                    None => {
                        lats.push(None);
                        lons.push(None);
                    }
                }
            }
            let index = frame.column_index(column).map(|i| i + 1).unwrap_or(0);
            frame.insert_column(index, Column::new("Latitude", ColumnType::Float, lats)?)?;
            frame.insert_column(index + 1, Column::new("Longitude", ColumnType::Float, lons)?)?;
            Ok(frame)
        }
    }
}

fn normalize_column(column: &Column) -> Result<Column> {
    let cells = column
        .cells()
        .iter()
        .map(|cell| match cell {
            Some(Value::Float(f)) => Ok(Some(Value::Float(*f))),
            Some(Value::Integer(i)) => Ok(Some(Value::Float(*i as f64))),
            Some(other) => parse_coordinate(&other.key_token()).map(|v| Some(Value::Float(v))),
            None => Ok(None),
        })
        .collect::<Result<Vec<_>>>()?;
    Column::new(column.name(), ColumnType::Float, cells)
}
