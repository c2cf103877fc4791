//! Error taxonomy for the cleaning, identity and upsert stages.
//!
//! Coercion skips are not represented here: a column that fails full
//! coercion is reported through [`crate::coerce::CoercionReport`] instead.
//! Empty upsert deltas are an [`crate::upsert::UpsertOutcome`], not an error.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Coordinate token without a numeric prefix or with an unknown hemisphere.
    #[error("invalid coordinate '{token}'")]
    InvalidCoordinate { token: String },

    #[error("column '{column}' holds unparseable date token '{token}'")]
    InvalidDate { column: String, token: String },

    /// A stage requires a column the table does not carry.
    #[error("{stage}: required column '{column}' is missing")]
    MissingColumn { stage: &'static str, column: String },

    #[error("key column '{column}' is null at row {row}")]
    NullKeyValue { column: String, row: usize },

    #[error("column '{column}' has {found} row(s), table has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("column '{0}' already exists")]
    DuplicateColumn(String),

    #[error("column '{column}' is {expected} but holds {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error("invalid station metadata: {0}")]
    InvalidStation(String),

    #[error("store failure: {0}")]
    Store(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn missing_column(stage: &'static str, column: impl Into<String>) -> Self {
        PipelineError::MissingColumn {
            stage,
            column: column.into(),
        }
    }
}
