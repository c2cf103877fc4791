//! Whole-column type coercion.
//!
//! Every string column is tried as numeric first (integer, then float), then
//! as a datetime or time of day if its name carries one of the configured
//! temporal hints. Coercion is all-or-nothing: a single unparseable non-null
//! cell leaves the column untouched and is reported as a skip. Designated
//! flag columns become integer `0`/`1` with nulls mapped to `0`. Running the
//! coercer twice yields the same table as running it once.

use log::{debug, info};

use crate::{
    data::{
        Value, parse_boolean, parse_float, parse_integer, parse_naive_datetime, parse_naive_time,
    },
    error::Result,
    frame::{Column, Frame},
    schema::ColumnType,
};

pub const DEFAULT_BOOLEAN_FLAGS: &[&str] = &["is_day"];
pub const DEFAULT_DATETIME_HINTS: &[&str] = &["date", "time"];

#[derive(Debug, Clone)]
pub struct TypeCoercer {
    boolean_flags: Vec<String>,
    datetime_hints: Vec<String>,
}

impl Default for TypeCoercer {
    fn default() -> Self {
        Self::new(
            DEFAULT_BOOLEAN_FLAGS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_DATETIME_HINTS.iter().map(|s| s.to_string()).collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoercionOutcome {
    /// The column was converted to a new type.
    Coerced { from: ColumnType, to: ColumnType },
    /// The column already had a typed representation; nulls were normalized.
    Normalized(ColumnType),
    /// Full-column coercion failed on `sample`; the column kept its type.
    Skipped { sample: String },
    /// A designated flag column was mapped to `0`/`1`.
    Flag,
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct CoercionReport {
    pub columns: Vec<(String, CoercionOutcome)>,
}

impl CoercionReport {
    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|(_, outcome)| matches!(outcome, CoercionOutcome::Skipped { .. }))
            .map(|(name, _)| name.as_str())
    }

    pub fn outcome(&self, column: &str) -> Option<&CoercionOutcome> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, outcome)| outcome)
    }
}

impl TypeCoercer {
    pub fn new(boolean_flags: Vec<String>, datetime_hints: Vec<String>) -> Self {
        let datetime_hints = datetime_hints
            .into_iter()
            .map(|hint| hint.to_ascii_lowercase())
            .filter(|hint| !hint.is_empty())
            .collect();
        Self {
            boolean_flags,
            datetime_hints,
        }
    }

    pub fn coerce(&self, frame: Frame) -> Result<(Frame, CoercionReport)> {
        let mut report = CoercionReport::default();
        let mut columns = Vec::with_capacity(frame.column_count());
        for column in frame.into_columns() {
            let name = column.name().to_string();
            let (column, outcome) = self.coerce_column(column)?;
            match &outcome {
                CoercionOutcome::Skipped { sample } => {
                    info!("Column '{name}' left as {} (unparseable value '{sample}')", column.datatype());
                }
                CoercionOutcome::Coerced { from, to } => {
                    debug!("Column '{name}' coerced {from} -> {to}");
                }
                _ => {}
            }
            report.columns.push((name, outcome));
            columns.push(column);
        }
        Ok((Frame::new(columns)?, report))
    }

    fn is_flag(&self, name: &str) -> bool {
        self.boolean_flags.iter().any(|flag| flag == name)
    }

    fn has_temporal_hint(&self, name: &str) -> bool {
        let lowered = name.to_ascii_lowercase();
        self.datetime_hints.iter().any(|hint| lowered.contains(hint))
    }

    fn coerce_column(&self, column: Column) -> Result<(Column, CoercionOutcome)> {
        if self.is_flag(column.name()) {
            return Ok((coerce_flag(column)?, CoercionOutcome::Flag));
        }
        match column.datatype() {
            ColumnType::String => self.coerce_string_column(column),
            ColumnType::Float => {
                let normalized = normalize_float(column)?;
                Ok((normalized, CoercionOutcome::Normalized(ColumnType::Float)))
            }
            ColumnType::Integer => Ok((column, CoercionOutcome::Normalized(ColumnType::Integer))),
            _ => Ok((column, CoercionOutcome::Unchanged)),
        }
    }

    fn coerce_string_column(&self, column: Column) -> Result<(Column, CoercionOutcome)> {
        let texts = string_cells(&column);
        if texts.iter().all(Option::is_none) {
            return Ok((column, CoercionOutcome::Unchanged));
        }

        let numeric_failure = match try_parse_all(&texts, |s| parse_integer(s).map(Value::Integer))
        {
            Ok(cells) => return promote(column, ColumnType::Integer, cells),
            Err(_) => match try_parse_all(&texts, |s| parse_float(s).map(Value::Float)) {
                Ok(cells) => return promote(column, ColumnType::Float, cells),
                Err(sample) => sample,
            },
        };

        if !self.has_temporal_hint(column.name()) {
            return Ok((
                column,
                CoercionOutcome::Skipped {
                    sample: numeric_failure,
                },
            ));
        }

        let datetime_failure =
            match try_parse_all(&texts, |s| parse_naive_datetime(s).map(Value::DateTime)) {
                Ok(cells) => return promote(column, ColumnType::DateTime, cells),
                Err(sample) => sample,
            };
        match try_parse_all(&texts, |s| parse_naive_time(s).map(Value::Time)) {
            Ok(cells) => promote(column, ColumnType::Time, cells),
            Err(_) => Ok((
                column,
                CoercionOutcome::Skipped {
                    sample: datetime_failure,
                },
            )),
        }
    }
}

fn string_cells(column: &Column) -> Vec<Option<String>> {
    column
        .cells()
        .iter()
        .map(|cell| match cell {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.key_token()),
            None => None,
        })
        .collect()
}

/// Parses every non-null cell or returns the first token that failed.
fn try_parse_all<F>(texts: &[Option<String>], parse: F) -> std::result::Result<Vec<Option<Value>>, String>
where
    F: Fn(&str) -> Option<Value>,
{
    texts
        .iter()
        .map(|cell| match cell {
            Some(text) => parse(text).map(Some).ok_or_else(|| text.clone()),
            None => Ok(None),
        })
        .collect()
}

fn promote(
    column: Column,
    to: ColumnType,
    cells: Vec<Option<Value>>,
) -> Result<(Column, CoercionOutcome)> {
    let from = column.datatype().clone();
    let promoted = Column::new(column.name(), to.clone(), cells)?;
    Ok((promoted, CoercionOutcome::Coerced { from, to }))
}

fn normalize_float(column: Column) -> Result<Column> {
    let name = column.name().to_string();
    let cells = column
        .into_cells()
        .into_iter()
        .map(|cell| cell.filter(|value| !matches!(value, Value::Float(f) if !f.is_finite())))
        .collect();
    Column::new(name, ColumnType::Float, cells)
}

fn flag_value(cell: Option<&Value>) -> i64 {
    let truthy = match cell {
        Some(Value::Boolean(b)) => *b,
        Some(Value::Integer(i)) => *i != 0,
        Some(Value::Float(f)) => f.is_finite() && *f != 0.0,
        Some(Value::String(s)) => parse_float(s)
            .map(|f| f != 0.0)
            .or_else(|| parse_boolean(s))
            .unwrap_or(false),
        Some(Value::DateTime(_)) | Some(Value::Time(_)) | None => false,
    };
    i64::from(truthy)
}

fn coerce_flag(column: Column) -> Result<Column> {
    let cells = column
        .cells()
        .iter()
        .map(|cell| Some(Value::Integer(flag_value(cell.as_ref()))))
        .collect();
    Column::new(column.name(), ColumnType::Integer, cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(name: &str, values: &[Option<&str>]) -> Column {
        Column::from_strings(name, values.iter().copied())
    }

    fn coerce(columns: Vec<Column>) -> (Frame, CoercionReport) {
        TypeCoercer::default()
            .coerce(Frame::new(columns).unwrap())
            .expect("coerce")
    }

    #[test]
    fn numeric_strings_become_integer_or_float() {
        let (frame, report) = coerce(vec![
            strings("count", &[Some("1"), None, Some("3")]),
            strings("height", &[Some("1.5"), Some("2"), None]),
        ]);
        let count = frame.column("count").unwrap();
        assert_eq!(count.datatype(), &ColumnType::Integer);
        assert_eq!(count.null_count(), 1);
        let height = frame.column("height").unwrap();
        assert_eq!(height.datatype(), &ColumnType::Float);
        assert_eq!(height.get(1), Some(&Value::Float(2.0)));
        assert_eq!(
            report.outcome("height"),
            Some(&CoercionOutcome::Coerced {
                from: ColumnType::String,
                to: ColumnType::Float
            })
        );
    }

    #[test]
    fn single_bad_token_leaves_whole_column_unchanged() {
        let (frame, report) = coerce(vec![strings(
            "pressure",
            &[Some("1013.2"), Some("MM"), Some("1012.8")],
        )]);
        let pressure = frame.column("pressure").unwrap();
        assert_eq!(pressure.datatype(), &ColumnType::String);
        assert_eq!(pressure.get(0), Some(&Value::String("1013.2".into())));
        assert_eq!(report.skipped().collect::<Vec<_>>(), vec!["pressure"]);
    }

    #[test]
    fn hinted_columns_become_datetime() {
        let (frame, _) = coerce(vec![
            strings(
                "Datetime",
                &[Some("2024-01-10 00:00:00"), Some("2024-01-11T06:00:00Z")],
            ),
            strings("label", &[Some("2024-01-10"), Some("2024-01-11")]),
        ]);
        assert_eq!(
            frame.column("Datetime").unwrap().datatype(),
            &ColumnType::DateTime
        );
        // No temporal hint in the name, so the column stays categorical.
        assert_eq!(
            frame.column("label").unwrap().datatype(),
            &ColumnType::String
        );
    }

    #[test]
    fn hinted_time_of_day_columns_become_time() {
        let (frame, _) = coerce(vec![strings("sunrise_time", &[Some("06:41"), None])]);
        assert_eq!(
            frame.column("sunrise_time").unwrap().datatype(),
            &ColumnType::Time
        );
    }

    #[test]
    fn flag_column_maps_to_zero_or_one_with_nulls_as_zero() {
        let (frame, _) = coerce(vec![strings(
            "is_day",
            &[Some("1"), None, Some("0.0"), Some("true"), Some("junk")],
        )]);
        let flag = frame.column("is_day").unwrap();
        assert_eq!(flag.datatype(), &ColumnType::Integer);
        let values: Vec<_> = flag.cells().iter().flatten().cloned().collect();
        assert_eq!(
            values,
            vec![
                Value::Integer(1),
                Value::Integer(0),
                Value::Integer(0),
                Value::Integer(1),
                Value::Integer(0)
            ]
        );
    }

    #[test]
    fn float_columns_drop_non_finite_values() {
        let column = Column::new(
            "visibility",
            ColumnType::Float,
            vec![Some(Value::Float(f64::NAN)), Some(Value::Float(10.0))],
        )
        .unwrap();
        let (frame, report) = coerce(vec![column]);
        assert_eq!(frame.column("visibility").unwrap().null_count(), 1);
        assert_eq!(
            report.outcome("visibility"),
            Some(&CoercionOutcome::Normalized(ColumnType::Float))
        );
    }

    #[test]
    fn coercion_is_idempotent() {
        let columns = vec![
            strings("Datetime", &[Some("2024-01-10 00:00"), None]),
            strings("Station ID", &[Some("46025"), Some("46025A")]),
            strings("T°(C°)", &[Some("12.5"), Some("13")]),
            strings("is_day", &[None, Some("1")]),
        ];
        let coercer = TypeCoercer::default();
        let (once, _) = coercer.coerce(Frame::new(columns).unwrap()).unwrap();
        let (twice, _) = coercer.coerce(once.clone()).unwrap();
        assert_eq!(once, twice);
    }
}
