#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use buoy_etl::{
    data::Value,
    frame::{Column, Frame},
    schema::ColumnType,
};
use chrono::{NaiveDate, NaiveDateTime};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .expect("valid date")
        .and_hms_opt(0, 0, 0)
        .expect("valid time")
}

pub fn datetime_column(name: &str, stamps: &[NaiveDateTime]) -> Column {
    Column::new(
        name,
        ColumnType::DateTime,
        stamps.iter().map(|dt| Some(Value::DateTime(*dt))).collect(),
    )
    .expect("datetime column")
}

pub fn float_column(name: &str, values: &[Option<f64>]) -> Column {
    Column::new(
        name,
        ColumnType::Float,
        values.iter().map(|v| v.map(Value::Float)).collect(),
    )
    .expect("float column")
}

pub fn string_column(name: &str, values: &[&str]) -> Column {
    Column::from_strings(name, values.iter().map(|v| Some(*v)))
}

pub fn frame(columns: Vec<Column>) -> Frame {
    Frame::new(columns).expect("frame")
}
