//! Persisted store boundary and its SQLite implementation.
//!
//! Everything the upsert engine needs from a store happens inside
//! [`Store::transaction`]: the watermark or key-set read and the append that
//! follows it run in one unit of work, so two concurrent loads cannot both
//! compute the same delta. If the closure fails, nothing is written.

use std::{path::Path, time::Duration};

use log::debug;
use rusqlite::{
    Connection, OptionalExtension, TransactionBehavior, params, params_from_iter,
    types::{Value as SqlValue, ValueRef},
};

use crate::{
    data::{STORE_DATETIME_FORMAT, STORE_TIME_FORMAT, Value},
    error::{PipelineError, Result},
    frame::{Column, Frame},
    provision::{StorageType, TableSchema, quote_identifier},
    schema::ColumnType,
};

/// Operations available inside a store transaction.
pub trait StoreSession {
    fn table_exists(&mut self, table: &str) -> Result<bool>;

    fn create_table(&mut self, table: &str, schema: &TableSchema) -> Result<()>;

    /// `MAX(column)`, or `None` when the table holds no non-null value.
    fn read_max(&mut self, table: &str, column: &str) -> Result<Option<Value>>;

    /// Distinct non-null stored values of `column`, as SQLite returns them.
    fn read_set(&mut self, table: &str, column: &str) -> Result<Vec<Value>>;

    /// Appends all rows of `frame`; returns the number written.
    fn write_append(&mut self, table: &str, frame: &Frame) -> Result<usize>;
}

pub trait Store {
    /// Runs `work` in one transaction, committing only if it succeeds.
    fn transaction<T, F>(&mut self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn StoreSession) -> Result<T>;
}

/// How long a writer waits for another connection's lock before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a database file. A concurrent loader holding the
    /// write lock is waited on for up to `busy_timeout`.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Declared columns of `table` in table order, or an empty list if the
    /// table does not exist.
    pub fn table_columns(&self, table: &str) -> Result<Vec<(String, StorageType)>> {
        let sql = format!("PRAGMA table_info({})", quote_identifier(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let declared: String = row.get(2)?;
                Ok((name, StorageType::from_declared(&declared)))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Reads a whole persisted table back into a typed [`Frame`].
    pub fn read_frame(&self, table: &str) -> Result<Frame> {
        let declared = self.table_columns(table)?;
        if declared.is_empty() {
            return Err(PipelineError::Store(format!(
                "table '{table}' does not exist"
            )));
        }
        let select = declared
            .iter()
            .map(|(name, _)| quote_identifier(name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {select} FROM {}", quote_identifier(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let mut cells: Vec<Vec<Option<Value>>> = vec![Vec::new(); declared.len()];
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (idx, column) in cells.iter_mut().enumerate() {
                column.push(from_sql_ref(row.get_ref(idx)?));
            }
        }
        let columns = declared
            .into_iter()
            .zip(cells)
            .map(|((name, storage), raw)| typed_column(name, &storage, raw))
            .collect::<Result<Vec<_>>>()?;
        Frame::new(columns)
    }
}

impl Store for SqliteStore {
    fn transaction<T, F>(&mut self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn StoreSession) -> Result<T>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut session = SqliteSession { conn: &tx };
        let result = work(&mut session)?;
        tx.commit()?;
        Ok(result)
    }
}

struct SqliteSession<'a> {
    conn: &'a Connection,
}

impl StoreSession for SqliteSession<'_> {
    fn table_exists(&mut self, table: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn create_table(&mut self, table: &str, schema: &TableSchema) -> Result<()> {
        let statement = schema.create_statement(table);
        debug!("{statement}");
        self.conn.execute(&statement, [])?;
        Ok(())
    }

    fn read_max(&mut self, table: &str, column: &str) -> Result<Option<Value>> {
        let sql = format!(
            "SELECT MAX({}) FROM {}",
            quote_identifier(column),
            quote_identifier(table)
        );
        let max = self
            .conn
            .query_row(&sql, [], |row| Ok(from_sql_ref(row.get_ref(0)?)))?;
        Ok(max)
    }

    fn read_set(&mut self, table: &str, column: &str) -> Result<Vec<Value>> {
        let sql = format!(
            "SELECT DISTINCT {} FROM {}",
            quote_identifier(column),
            quote_identifier(table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(value) = from_sql_ref(row.get_ref(0)?) {
                values.push(value);
            }
        }
        Ok(values)
    }

    fn write_append(&mut self, table: &str, frame: &Frame) -> Result<usize> {
        let names = frame.column_names();
        let columns = names
            .iter()
            .map(|name| quote_identifier(name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=names.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders})",
            quote_identifier(table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        for row in 0..frame.row_count() {
            let values = frame.row(row).into_iter().map(to_sql_value);
            stmt.execute(params_from_iter(values))?;
        }
        Ok(frame.row_count())
    }
}

/// Types raw stored cells by the declared column type. An `INT` column that
/// holds fractional `REAL` cells is widened to float; any other cell that
/// does not fit is a type mismatch.
fn typed_column(name: String, storage: &StorageType, raw: Vec<Option<Value>>) -> Result<Column> {
    let declared = storage.column_type();
    let converted: Option<Vec<Option<Value>>> = raw
        .iter()
        .map(|cell| match cell {
            Some(value) => value.convert_to(&declared).map(Some),
            None => Some(None),
        })
        .collect();
    if let Some(cells) = converted {
        return Column::new(name, declared, cells);
    }

    let all_numeric = raw.iter().flatten().all(|value| value.as_f64().is_some());
    if declared == ColumnType::Integer && all_numeric {
        debug!("Widening stored column '{name}' from INT to FLOAT");
        let cells = raw
            .into_iter()
            .map(|cell| cell.and_then(|value| value.convert_to(&ColumnType::Float)))
            .collect();
        return Column::new(name, ColumnType::Float, cells);
    }

    let found = raw
        .iter()
        .flatten()
        .find(|value| value.convert_to(&declared).is_none())
        .map(Value::key_token)
        .unwrap_or_default();
    Err(PipelineError::TypeMismatch {
        column: name,
        expected: declared.to_string(),
        found,
    })
}

fn to_sql_value(cell: Option<&Value>) -> SqlValue {
    match cell {
        None => SqlValue::Null,
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
        Some(Value::Integer(i)) => SqlValue::Integer(*i),
        Some(Value::Float(f)) => SqlValue::Real(*f),
        Some(Value::Boolean(b)) => SqlValue::Integer(i64::from(*b)),
        Some(Value::DateTime(dt)) => SqlValue::Text(dt.format(STORE_DATETIME_FORMAT).to_string()),
        Some(Value::Time(t)) => SqlValue::Text(t.format(STORE_TIME_FORMAT).to_string()),
    }
}

fn from_sql_ref(value: ValueRef<'_>) -> Option<Value> {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Integer(i) => Some(Value::Integer(i)),
        ValueRef::Real(f) => Some(Value::Float(f)),
        ValueRef::Text(bytes) => Some(Value::String(String::from_utf8_lossy(bytes).into_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_frame() -> Frame {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        Frame::new(vec![
            Column::from_strings("Unique ID", [Some("a"), Some("b")]),
            Column::new(
                "Datetime",
                ColumnType::DateTime,
                vec![Some(Value::DateTime(dt)), None],
            )
            .unwrap(),
            Column::new(
                "Wave Height (m)",
                ColumnType::Float,
                vec![Some(Value::Float(1.5)), Some(Value::Float(2.0))],
            )
            .unwrap(),
            Column::new(
                "flag",
                ColumnType::Boolean,
                vec![Some(Value::Boolean(true)), Some(Value::Boolean(false))],
            )
            .unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn writes_and_reads_back_typed_rows() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let frame = sample_frame();
        store
            .transaction(|session| {
                assert!(!session.table_exists("buoy")?);
                session.create_table("buoy", &TableSchema::infer(&frame, Some("Unique ID")))?;
                session.write_append("buoy", &frame)
            })
            .unwrap();
        let read = store.read_frame("buoy").unwrap();
        assert_eq!(read, frame);
    }

    #[test]
    fn read_max_and_read_set_see_committed_rows() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let frame = sample_frame();
        let (max, keys) = store
            .transaction(|session| {
                session.create_table("buoy", &TableSchema::infer(&frame, None))?;
                assert_eq!(session.read_max("buoy", "Datetime")?, None);
                session.write_append("buoy", &frame)?;
                Ok((
                    session.read_max("buoy", "Datetime")?,
                    session.read_set("buoy", "Unique ID")?,
                ))
            })
            .unwrap();
        assert_eq!(max, Some(Value::String("2024-01-10 06:00:00".into())));
        let mut keys = keys;
        keys.sort();
        assert_eq!(
            keys,
            vec![Value::String("a".into()), Value::String("b".into())]
        );
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let frame = sample_frame();
        let result: Result<()> = store.transaction(|session| {
            session.create_table("buoy", &TableSchema::infer(&frame, None))?;
            session.write_append("buoy", &frame)?;
            Err(PipelineError::Store("injected".into()))
        });
        assert!(result.is_err());
        assert!(store.table_columns("buoy").unwrap().is_empty());
    }

    fn single(name: &str, ty: ColumnType, cells: Vec<Value>) -> Frame {
        Frame::new(vec![
            Column::new(name, ty, cells.into_iter().map(Some).collect()).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn integer_column_holding_fractions_reads_back_as_float() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let first = single(
            "WSPD",
            ColumnType::Integer,
            vec![Value::Integer(1), Value::Integer(2)],
        );
        let later = single("WSPD", ColumnType::Float, vec![Value::Float(1.5)]);
        store
            .transaction(|session| {
                session.create_table("obs", &TableSchema::infer(&first, None))?;
                session.write_append("obs", &first)?;
                session.write_append("obs", &later)
            })
            .unwrap();

        let read = store.read_frame("obs").unwrap();
        let column = read.column("WSPD").unwrap();
        assert_eq!(column.datatype(), &ColumnType::Float);
        assert_eq!(
            column.cells(),
            &[
                Some(Value::Float(1.0)),
                Some(Value::Float(2.0)),
                Some(Value::Float(1.5))
            ]
        );
    }

    #[test]
    fn unreadable_stored_cell_is_a_type_mismatch() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let stamps = single(
            "Datetime",
            ColumnType::DateTime,
            vec![Value::DateTime(
                NaiveDate::from_ymd_opt(2024, 1, 10)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            )],
        );
        let junk = single("Datetime", ColumnType::String, vec![Value::String("soon".into())]);
        store
            .transaction(|session| {
                session.create_table("obs", &TableSchema::infer(&stamps, None))?;
                session.write_append("obs", &stamps)?;
                session.write_append("obs", &junk)
            })
            .unwrap();

        let err = store.read_frame("obs").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::TypeMismatch { ref column, ref found, .. }
                if column == "Datetime" && found == "soon"
        ));
    }

    #[test]
    fn file_store_applies_busy_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            SqliteStore::open(&dir.path().join("buoys.db"), Duration::from_millis(1500)).unwrap();
        let timeout: i64 = store
            .connection()
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, 1500);
    }

    #[test]
    fn read_frame_of_unknown_table_is_a_store_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.read_frame("nope"),
            Err(PipelineError::Store(_))
        ));
    }
}
