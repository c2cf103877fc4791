//! Incremental, append-only loading of new rows into a persisted table.
//!
//! The delta against the store is computed inside the same store
//! transaction that writes it, using one of two strategies:
//!
//! - [`UpsertStrategy::Watermark`]: keep rows whose ordering column is
//!   strictly greater than the stored maximum. Late rows at or below the
//!   watermark are discarded.
//! - [`UpsertStrategy::KeySet`]: keep rows whose reference value is not yet
//!   stored. The whole stored key set is held in memory.
//!
//! Existing rows are never updated or deleted.

use std::{collections::HashSet, fmt, str::FromStr};

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    error::{PipelineError, Result},
    frame::Frame,
    provision::TableSchema,
    store::{Store, StoreSession},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    Watermark,
    KeySet,
}

impl FromStr for StrategyKind {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "watermark" => Ok(StrategyKind::Watermark),
            "key-set" | "keyset" | "key_set" => Ok(StrategyKind::KeySet),
            other => Err(PipelineError::Config(format!(
                "unknown upsert strategy '{other}' (expected watermark or key-set)"
            ))),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Watermark => f.write_str("watermark"),
            StrategyKind::KeySet => f.write_str("key-set"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertStrategy {
    Watermark { column: String },
    KeySet { column: String },
}

impl UpsertStrategy {
    pub fn new(kind: StrategyKind, column: impl Into<String>) -> Self {
        let column = column.into();
        match kind {
            StrategyKind::Watermark => UpsertStrategy::Watermark { column },
            StrategyKind::KeySet => UpsertStrategy::KeySet { column },
        }
    }

    pub fn column(&self) -> &str {
        match self {
            UpsertStrategy::Watermark { column } | UpsertStrategy::KeySet { column } => column,
        }
    }

    fn stage(&self) -> &'static str {
        match self {
            UpsertStrategy::Watermark { .. } => "watermark upsert",
            UpsertStrategy::KeySet { .. } => "key-set upsert",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Written {
        rows: usize,
        skipped: usize,
        created_table: bool,
    },
    /// Every incoming row is already present; nothing was written.
    NoNewRows { skipped: usize },
}

impl UpsertOutcome {
    pub fn rows_written(&self) -> usize {
        match self {
            UpsertOutcome::Written { rows, .. } => *rows,
            UpsertOutcome::NoNewRows { .. } => 0,
        }
    }
}

pub struct UpsertEngine<'s, S: Store> {
    store: &'s mut S,
}

impl<'s, S: Store> UpsertEngine<'s, S> {
    pub fn new(store: &'s mut S) -> Self {
        Self { store }
    }

    /// Appends the rows of `frame` that `strategy` considers new.
    pub fn upsert(
        &mut self,
        table: &str,
        frame: &Frame,
        strategy: &UpsertStrategy,
    ) -> Result<UpsertOutcome> {
        frame.require(strategy.stage(), strategy.column())?;
        let outcome = self.store.transaction(|session| {
            let created_table = ensure_table(session, table, frame, strategy)?;
            let mask = if created_table {
                new_rows_in_empty_table(frame, strategy)?
            } else {
                match strategy {
                    UpsertStrategy::Watermark { column } => {
                        watermark_mask(session, table, frame, column)?
                    }
                    UpsertStrategy::KeySet { column } => keyset_mask(session, table, frame, column)?,
                }
            };
            let delta = frame.filter_rows(&mask);
            let skipped = frame.row_count() - delta.row_count();
            if delta.row_count() == 0 {
                return Ok(UpsertOutcome::NoNewRows { skipped });
            }
            let rows = session.write_append(table, &delta)?;
            Ok(UpsertOutcome::Written {
                rows,
                skipped,
                created_table,
            })
        })?;
        match &outcome {
            UpsertOutcome::Written { rows, skipped, .. } => {
                info!("Appended {rows} row(s) to '{table}' ({skipped} already present)");
            }
            UpsertOutcome::NoNewRows { skipped } => {
                info!("No new rows for '{table}' ({skipped} already present)");
            }
        }
        Ok(outcome)
    }
}

/// Creates the target table from `frame` if absent. Returns `true` when the
/// table was created in this call.
fn ensure_table(
    session: &mut dyn StoreSession,
    table: &str,
    frame: &Frame,
    strategy: &UpsertStrategy,
) -> Result<bool> {
    if session.table_exists(table)? {
        return Ok(false);
    }
    let primary_key = match strategy {
        UpsertStrategy::KeySet { column } => Some(column.as_str()),
        UpsertStrategy::Watermark { .. } => None,
    };
    let schema = TableSchema::infer(frame, primary_key);
    session.create_table(table, &schema)?;
    info!("Created table '{table}' with {} column(s)", schema.columns.len());
    Ok(true)
}

/// A fresh table takes every row, except that key-set loads still collapse
/// duplicate keys inside the batch.
fn new_rows_in_empty_table(frame: &Frame, strategy: &UpsertStrategy) -> Result<Vec<bool>> {
    match strategy {
        UpsertStrategy::Watermark { .. } => Ok(vec![true; frame.row_count()]),
        UpsertStrategy::KeySet { column } => key_mask(frame, column, &HashSet::new()),
    }
}

fn watermark_mask(
    session: &mut dyn StoreSession,
    table: &str,
    frame: &Frame,
    column: &str,
) -> Result<Vec<bool>> {
    let ordering = frame.require("watermark upsert", column)?;
    let Some(stored) = session.read_max(table, column)? else {
        return Ok(vec![true; frame.row_count()]);
    };
    let watermark = stored.convert_to(ordering.datatype()).ok_or_else(|| {
        PipelineError::TypeMismatch {
            column: column.to_string(),
            expected: ordering.datatype().to_string(),
            found: stored.key_token(),
        }
    })?;
    info!("Watermark for '{table}.{column}' is {watermark}");
    Ok(ordering
        .cells()
        .iter()
        .map(|cell| cell.as_ref().is_some_and(|value| value > &watermark))
        .collect())
}

fn keyset_mask(
    session: &mut dyn StoreSession,
    table: &str,
    frame: &Frame,
    column: &str,
) -> Result<Vec<bool>> {
    let keys = frame.require("key-set upsert", column)?;
    let stored = session.read_set(table, column)?;
    // Stored REAL 46025.0 and incoming INT 46025 must compare equal.
    let existing: HashSet<String> = stored
        .iter()
        .map(|value| {
            value
                .convert_to(keys.datatype())
                .unwrap_or_else(|| value.clone())
                .key_token()
        })
        .collect();
    info!("Loaded {} existing key(s) from '{table}.{column}'", existing.len());
    key_mask(frame, column, &existing)
}

/// Keeps rows whose key is neither stored nor seen earlier in the batch.
fn key_mask(frame: &Frame, column: &str, existing: &HashSet<String>) -> Result<Vec<bool>> {
    let keys = frame.require("key-set upsert", column)?;
    let mut seen: HashSet<String> = HashSet::new();
    Ok(keys
        .cells()
        .iter()
        .map(|cell| match cell {
            Some(value) => {
                let token = value.key_token();
                !existing.contains(&token) && seen.insert(token)
            }
            None => false,
        })
        .collect())
}

/// Renders an outcome for the CLI.
pub fn describe(outcome: &UpsertOutcome) -> String {
    match outcome {
        UpsertOutcome::Written {
            rows,
            skipped,
            created_table,
        } => {
            let created = if *created_table { " (table created)" } else { "" };
            format!("wrote {rows} row(s), skipped {skipped}{created}")
        }
        UpsertOutcome::NoNewRows { skipped } => format!("no new rows ({skipped} skipped)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::Value, frame::Column, schema::ColumnType, store::SqliteStore};

    fn keyed(keys: &[&str]) -> Frame {
        Frame::new(vec![
            Column::from_strings("Unique ID", keys.iter().map(|k| Some(*k))),
            Column::new(
                "value",
                ColumnType::Integer,
                (0..keys.len() as i64).map(|i| Some(Value::Integer(i))).collect(),
            )
            .unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn first_load_creates_table_and_writes_everything() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let strategy = UpsertStrategy::KeySet {
            column: "Unique ID".into(),
        };
        let outcome = UpsertEngine::new(&mut store)
            .upsert("buoy", &keyed(&["A", "B", "A"]), &strategy)
            .unwrap();
        assert_eq!(
            outcome,
            UpsertOutcome::Written {
                rows: 2,
                skipped: 1,
                created_table: true
            }
        );
    }

    #[test]
    fn reloading_the_same_batch_is_a_no_op() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let strategy = UpsertStrategy::KeySet {
            column: "Unique ID".into(),
        };
        let frame = keyed(&["A", "B"]);
        let mut engine = UpsertEngine::new(&mut store);
        engine.upsert("buoy", &frame, &strategy).unwrap();
        let outcome = engine.upsert("buoy", &frame, &strategy).unwrap();
        assert_eq!(outcome, UpsertOutcome::NoNewRows { skipped: 2 });
        assert_eq!(outcome.rows_written(), 0);
    }

    #[test]
    fn missing_reference_column_aborts_before_touching_store() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let strategy = UpsertStrategy::Watermark {
            column: "Datetime".into(),
        };
        let err = UpsertEngine::new(&mut store)
            .upsert("buoy", &keyed(&["A"]), &strategy)
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
        assert!(store.table_columns("buoy").unwrap().is_empty());
    }

    #[test]
    fn key_set_matches_numeric_keys_across_batch_types() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let strategy = UpsertStrategy::KeySet {
            column: "Station ID".into(),
        };
        let stations = |ty: ColumnType, values: Vec<Value>| {
            Frame::new(vec![
                Column::new("Station ID", ty, values.into_iter().map(Some).collect()).unwrap(),
            ])
            .unwrap()
        };
        let first = stations(
            ColumnType::Float,
            vec![Value::Float(46025.0), Value::Float(46026.5)],
        );
        let second = stations(
            ColumnType::Integer,
            vec![Value::Integer(46025), Value::Integer(46027)],
        );

        let mut engine = UpsertEngine::new(&mut store);
        engine.upsert("stations", &first, &strategy).unwrap();
        let outcome = engine.upsert("stations", &second, &strategy).unwrap();

        assert_eq!(
            outcome,
            UpsertOutcome::Written {
                rows: 1,
                skipped: 1,
                created_table: false
            }
        );
        assert_eq!(store.read_frame("stations").unwrap().row_count(), 3);
    }

    #[test]
    fn strategy_kind_parses_cli_spellings() {
        assert_eq!("key-set".parse::<StrategyKind>().unwrap(), StrategyKind::KeySet);
        assert_eq!("Watermark".parse::<StrategyKind>().unwrap(), StrategyKind::Watermark);
        assert!("latest".parse::<StrategyKind>().is_err());
    }
}
