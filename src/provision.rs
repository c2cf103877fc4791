//! Persisted-table schema derivation.
//!
//! Maps each column's [`ColumnType`] onto a storage type and renders the
//! `CREATE TABLE` statement the store executes before the first write.

use std::fmt;

use crate::{frame::Frame, schema::ColumnType};

/// Bounded length used for string columns.
pub const STRING_LENGTH: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Float,
    Integer,
    String(usize),
    DateTime,
    Time,
    Boolean,
}

impl StorageType {
    pub fn for_column(datatype: &ColumnType) -> Self {
        match datatype {
            ColumnType::Integer => StorageType::Integer,
            ColumnType::Float => StorageType::Float,
            ColumnType::DateTime => StorageType::DateTime,
            ColumnType::Time => StorageType::Time,
            ColumnType::Boolean => StorageType::Boolean,
            ColumnType::String => StorageType::String(STRING_LENGTH),
        }
    }

    /// Column type a stored value of this kind reads back as.
    pub fn column_type(self) -> ColumnType {
        match self {
            StorageType::Float => ColumnType::Float,
            StorageType::Integer => ColumnType::Integer,
            StorageType::String(_) => ColumnType::String,
            StorageType::DateTime => ColumnType::DateTime,
            StorageType::Time => ColumnType::Time,
            StorageType::Boolean => ColumnType::Boolean,
        }
    }

    /// Parses a declared SQL type as reported by the store.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        match upper.as_str() {
            "INT" | "INTEGER" | "BIGINT" => StorageType::Integer,
            "FLOAT" | "REAL" | "DOUBLE" | "NUMERIC" => StorageType::Float,
            "DATETIME" | "TIMESTAMP" => StorageType::DateTime,
            "TIME" => StorageType::Time,
            "BOOLEAN" | "BOOL" => StorageType::Boolean,
            _ => StorageType::String(STRING_LENGTH),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Float => f.write_str("FLOAT"),
            StorageType::Integer => f.write_str("INT"),
            StorageType::String(len) => write!(f, "VARCHAR({len})"),
            StorageType::DateTime => f.write_str("DATETIME"),
            StorageType::Time => f.write_str("TIME"),
            StorageType::Boolean => f.write_str("BOOLEAN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<(String, StorageType)>,
    pub primary_key: Option<String>,
}

impl TableSchema {
    pub fn infer(frame: &Frame, primary_key: Option<&str>) -> Self {
        let columns = frame
            .columns()
            .iter()
            .map(|column| {
                (
                    column.name().to_string(),
                    StorageType::for_column(column.datatype()),
                )
            })
            .collect();
        let primary_key = primary_key
            .filter(|key| frame.column_index(key).is_some())
            .map(str::to_string);
        Self {
            columns,
            primary_key,
        }
    }

    pub fn create_statement(&self, table: &str) -> String {
        let mut definitions: Vec<String> = self
            .columns
            .iter()
            .map(|(name, ty)| format!("{} {ty}", quote_identifier(name)))
            .collect();
        if let Some(key) = &self.primary_key {
            definitions.push(format!("PRIMARY KEY ({})", quote_identifier(key)));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_identifier(table),
            definitions.join(", ")
        )
    }
}

/// Double-quotes an SQL identifier, escaping embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::Value, frame::Column};

    #[test]
    fn infers_storage_types_and_primary_key() {
        let frame = Frame::new(vec![
            Column::from_strings("Unique ID", [Some("k1")]),
            Column::new("Wave Height (m)", ColumnType::Float, vec![Some(Value::Float(1.0))])
                .unwrap(),
            Column::new("is_day", ColumnType::Integer, vec![Some(Value::Integer(1))]).unwrap(),
        ])
        .unwrap();
        let schema = TableSchema::infer(&frame, Some("Unique ID"));
        assert_eq!(schema.columns[0].1, StorageType::String(255));
        assert_eq!(schema.columns[1].1, StorageType::Float);
        assert_eq!(
            schema.create_statement("buoy"),
            "CREATE TABLE IF NOT EXISTS \"buoy\" (\"Unique ID\" VARCHAR(255), \
             \"Wave Height (m)\" FLOAT, \"is_day\" INT, PRIMARY KEY (\"Unique ID\"))"
        );
    }

    #[test]
    fn unknown_primary_key_is_ignored() {
        let frame = Frame::new(vec![Column::from_strings("a", [Some("x")])]).unwrap();
        assert_eq!(TableSchema::infer(&frame, Some("missing")).primary_key, None);
    }

    #[test]
    fn declared_types_read_back() {
        assert_eq!(StorageType::from_declared("VARCHAR(255)"), StorageType::String(255));
        assert_eq!(StorageType::from_declared("int"), StorageType::Integer);
        assert_eq!(
            StorageType::from_declared("DATETIME").column_type(),
            ColumnType::DateTime
        );
    }

    #[test]
    fn identifiers_escape_quotes() {
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
