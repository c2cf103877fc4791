//! Synthetic row keys built from an ordered list of key columns.
//!
//! Datetime cells render as a fixed-width `YYYYMMDDHHMMSS` token, every other
//! cell as its plain string form. Fields are concatenated without a
//! separator unless a delimiter is configured; an undelimited key can collide
//! when field boundaries are ambiguous (`"12" + "3"` and `"1" + "23"`).

use log::info;

use crate::{
    data::{KEY_DATETIME_FORMAT, Value},
    error::{PipelineError, Result},
    frame::{Column, Frame},
    schema::ColumnType,
};

pub const UNIQUE_ID_COLUMN: &str = "Unique ID";

#[derive(Debug, Clone)]
pub struct IdentityKeyBuilder {
    key_columns: Vec<String>,
    delimiter: Option<String>,
    output_column: String,
}

impl IdentityKeyBuilder {
    pub fn new(key_columns: Vec<String>) -> Self {
        Self {
            key_columns,
            delimiter: None,
            output_column: UNIQUE_ID_COLUMN.to_string(),
        }
    }

    /// Joins fields with `delimiter`. This changes the stored key shape.
    pub fn with_delimiter(mut self, delimiter: Option<String>) -> Self {
        self.delimiter = delimiter.filter(|d| !d.is_empty());
        self
    }

    pub fn output_column(&self) -> &str {
        &self.output_column
    }

    /// Prepends the key column. Fails if a key column is absent or null.
    pub fn build(&self, mut frame: Frame) -> Result<Frame> {
        if self.key_columns.is_empty() {
            return Err(PipelineError::Config(
                "at least one key column is required".to_string(),
            ));
        }
        let columns = self
            .key_columns
            .iter()
            .map(|name| frame.require("identity", name))
            .collect::<Result<Vec<_>>>()?;

        let separator = self.delimiter.as_deref().unwrap_or("");
        let keys = (0..frame.row_count())
            .map(|row| {
                let parts = columns
                    .iter()
                    .map(|column| key_part(column, row))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(Value::String(parts.join(separator))))
            })
            .collect::<Result<Vec<_>>>()?;

        // A rebuilt key replaces the previous one instead of clashing with it.
        frame.drop_column(&self.output_column);
        let key_column = Column::new(self.output_column.clone(), ColumnType::String, keys)?;
        frame.insert_column(0, key_column)?;
        info!(
            "Built '{}' from [{}] for {} row(s)",
            self.output_column,
            self.key_columns.join(", "),
            frame.row_count()
        );
        Ok(frame)
    }
}

fn key_part(column: &Column, row: usize) -> Result<String> {
    match column.get(row) {
        Some(Value::DateTime(dt)) => Ok(dt.format(KEY_DATETIME_FORMAT).to_string()),
        Some(value) => Ok(value.key_token()),
        None => Err(PipelineError::NullKeyValue {
            column: column.name().to_string(),
            row,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn builder(columns: &[&str]) -> IdentityKeyBuilder {
        IdentityKeyBuilder::new(columns.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn datetime_columns_render_fixed_width() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(7, 0, 9)
            .unwrap();
        let frame = Frame::new(vec![
            Column::new("Datetime", ColumnType::DateTime, vec![Some(Value::DateTime(dt))]).unwrap(),
            Column::new("Station ID", ColumnType::Integer, vec![Some(Value::Integer(46025))])
                .unwrap(),
        ])
        .unwrap();
        let frame = builder(&["Station ID", "Datetime"]).build(frame).unwrap();
        assert_eq!(
            frame.column_names(),
            vec![UNIQUE_ID_COLUMN, "Datetime", "Station ID"]
        );
        assert_eq!(
            frame.column(UNIQUE_ID_COLUMN).unwrap().get(0),
            Some(&Value::String("4602520240105070009".into()))
        );
    }

    #[test]
    fn missing_key_column_is_fatal() {
        let frame = Frame::new(vec![Column::from_strings("Zone", [Some("bay")])]).unwrap();
        let err = builder(&["Station ID"]).build(frame).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }

    #[test]
    fn null_key_value_is_rejected() {
        let frame = Frame::new(vec![Column::from_strings("Station ID", [Some("1"), None])]).unwrap();
        let err = builder(&["Station ID"]).build(frame).unwrap_err();
        assert!(matches!(err, PipelineError::NullKeyValue { row: 1, .. }));
    }

    #[test]
    fn delimiter_separates_fields() {
        let frame = Frame::new(vec![
            Column::from_strings("station", [Some("12"), Some("1")]),
            Column::from_strings("zone", [Some("3"), Some("23")]),
        ])
        .unwrap();
        let frame = builder(&["station", "zone"])
            .with_delimiter(Some("|".into()))
            .build(frame)
            .unwrap();
        let keys: Vec<_> = frame.column(UNIQUE_ID_COLUMN).unwrap().non_null().cloned().collect();
        assert_eq!(
            keys,
            vec![Value::String("12|3".into()), Value::String("1|23".into())]
        );
    }

    #[test]
    fn rebuilding_replaces_existing_key() {
        let frame = Frame::new(vec![Column::from_strings("station", [Some("a")])]).unwrap();
        let keyed = builder(&["station"]).build(frame).unwrap();
        let rekeyed = builder(&["station"]).build(keyed.clone()).unwrap();
        assert_eq!(keyed, rekeyed);
    }
}
