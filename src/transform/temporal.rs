//! Datetime canonicalization and the derived time dimension.

use std::fmt;

use chrono::{Datelike, NaiveDateTime, Timelike};
use log::info;

use crate::{
    data::{Value, parse_naive_datetime},
    error::{PipelineError, Result},
    frame::{Column, Frame},
    schema::ColumnType,
};

pub const DATETIME_COLUMN: &str = "Datetime";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPeriod {
    Night,
    Morning,
    Afternoon,
    Evening,
}

impl DayPeriod {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            0..=5 => DayPeriod::Night,
            6..=11 => DayPeriod::Morning,
            12..=17 => DayPeriod::Afternoon,
            _ => DayPeriod::Evening,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DayPeriod::Night => "Night",
            DayPeriod::Morning => "Morning",
            DayPeriod::Afternoon => "Afternoon",
            DayPeriod::Evening => "Evening",
        }
    }
}

impl fmt::Display for DayPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn floor_to_hour(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_minute(0)
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

/// Parses `source` as UTC datetimes, floors each to the hour and renames the
/// column to [`DATETIME_COLUMN`]. Any unparseable token fails the stage.
pub fn canonicalize_datetime(mut frame: Frame, source: &str) -> Result<Frame> {
    let column = frame.require("datetime canonicalization", source)?;
    let cells = column
        .cells()
        .iter()
        .map(|cell| {
            let parsed = match cell {
                None => return Ok(None),
                Some(Value::DateTime(dt)) => *dt,
                Some(other) => {
                    let token = other.key_token();
                    parse_naive_datetime(&token).ok_or_else(|| PipelineError::InvalidDate {
                        column: source.to_string(),
                        token,
                    })?
                }
            };
            Ok(Some(Value::DateTime(floor_to_hour(parsed))))
        })
        .collect::<Result<Vec<_>>>()?;
    frame.replace_column(Column::new(source, ColumnType::DateTime, cells)?)?;
    frame.rename_column(source, DATETIME_COLUMN)?;
    info!("Canonicalized '{source}' into '{DATETIME_COLUMN}' (UTC, hourly)");
    Ok(frame)
}

/// Derives `Year`, `Month`, `Day`, `Hour`, `DayOfWeek` and `DayPeriod` from
/// the `Datetime` column. Existing derived columns are overwritten.
pub fn add_time_dimension(mut frame: Frame) -> Result<Frame> {
    let datetime = frame.require("time dimension", DATETIME_COLUMN)?;
    if datetime.datatype() != &ColumnType::DateTime {
        return Err(PipelineError::TypeMismatch {
            column: DATETIME_COLUMN.to_string(),
            expected: ColumnType::DateTime.to_string(),
            found: datetime.datatype().to_string(),
        });
    }
    let stamps: Vec<Option<NaiveDateTime>> = datetime
        .cells()
        .iter()
        .map(|cell| match cell {
            Some(Value::DateTime(dt)) => Some(*dt),
            _ => None,
        })
        .collect();

    let integer = |f: fn(&NaiveDateTime) -> i64| -> Vec<Option<Value>> {
        stamps
            .iter()
            .map(|dt| dt.as_ref().map(|dt| Value::Integer(f(dt))))
            .collect()
    };
    let text = |f: fn(&NaiveDateTime) -> String| -> Vec<Option<Value>> {
        stamps
            .iter()
            .map(|dt| dt.as_ref().map(|dt| Value::String(f(dt))))
            .collect()
    };

    let derived = vec![
        Column::new("Year", ColumnType::Integer, integer(|dt| i64::from(dt.year())))?,
        Column::new("Month", ColumnType::Integer, integer(|dt| i64::from(dt.month())))?,
        Column::new("Day", ColumnType::Integer, integer(|dt| i64::from(dt.day())))?,
        Column::new("Hour", ColumnType::Integer, integer(|dt| i64::from(dt.hour())))?,
        Column::new("DayOfWeek", ColumnType::String, text(|dt| dt.format("%A").to_string()))?,
        Column::new(
            "DayPeriod",
            ColumnType::String,
            text(|dt| DayPeriod::from_hour(dt.hour()).to_string()),
        )?,
    ];
    for column in derived {
        if frame.column(column.name()).is_some() {
            frame.replace_column(column)?;
        } else {
            frame.push_column(column)?;
        }
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn canonicalizes_offsets_and_floors_to_hour() {
        let frame = Frame::new(vec![Column::from_strings(
            "time",
            [Some("2024-01-10T08:45:00+02:00"), None, Some("2024-01-10 23:59")],
        )])
        .unwrap();
        let frame = canonicalize_datetime(frame, "time").unwrap();
        let column = frame.column(DATETIME_COLUMN).unwrap();
        assert_eq!(column.datatype(), &ColumnType::DateTime);
        assert_eq!(column.get(0), Some(&Value::DateTime(at(2024, 1, 10, 6, 0))));
        assert_eq!(column.get(1), None);
        assert_eq!(column.get(2), Some(&Value::DateTime(at(2024, 1, 10, 23, 0))));
    }

    #[test]
    fn unparseable_token_is_reported_with_its_column() {
        let frame = Frame::new(vec![Column::from_strings("time", [Some("soon")])]).unwrap();
        let err = canonicalize_datetime(frame, "time").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidDate { ref column, ref token } if column == "time" && token == "soon"
        ));
    }

    #[test]
    fn day_period_boundaries() {
        assert_eq!(DayPeriod::from_hour(0), DayPeriod::Night);
        assert_eq!(DayPeriod::from_hour(5), DayPeriod::Night);
        assert_eq!(DayPeriod::from_hour(6), DayPeriod::Morning);
        assert_eq!(DayPeriod::from_hour(12), DayPeriod::Afternoon);
        assert_eq!(DayPeriod::from_hour(18), DayPeriod::Evening);
        assert_eq!(DayPeriod::from_hour(23), DayPeriod::Evening);
    }

    #[test]
    fn time_dimension_appends_calendar_columns() {
        let frame = Frame::new(vec![
            Column::new(
                DATETIME_COLUMN,
                ColumnType::DateTime,
                vec![Some(Value::DateTime(at(2024, 1, 10, 14, 0)))],
            )
            .unwrap(),
        ])
        .unwrap();
        let frame = add_time_dimension(frame).unwrap();
        assert_eq!(
            frame.column_names(),
            vec!["Datetime", "Year", "Month", "Day", "Hour", "DayOfWeek", "DayPeriod"]
        );
        assert_eq!(frame.row(0)[4], Some(&Value::Integer(14)));
        assert_eq!(frame.row(0)[5], Some(&Value::String("Wednesday".into())));
        assert_eq!(frame.row(0)[6], Some(&Value::String("Afternoon".into())));
        let again = add_time_dimension(frame.clone()).unwrap();
        assert_eq!(again, frame);
    }

    #[test]
    fn time_dimension_requires_typed_datetime() {
        let frame =
            Frame::new(vec![Column::from_strings(DATETIME_COLUMN, [Some("2024-01-10")])]).unwrap();
        assert!(matches!(
            add_time_dimension(frame),
            Err(PipelineError::TypeMismatch { .. })
        ));
    }
}
