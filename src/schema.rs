//! Column type model and schema snapshots.
//!
//! [`ColumnType`] is the storage-level tag carried by every [`crate::frame::Column`];
//! it is decided once by the type coercer and never re-probed afterwards.
//! [`SemanticType`] groups those tags into the four classes the cleaning
//! stages branch on. A [`Schema`] is a serializable snapshot of a table's
//! column names, types and null counts, written by `probe`.

use std::{fmt, fs::File, io::BufReader, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::frame::Frame;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Numeric,
    Datetime,
    Boolean,
    Categorical,
}

impl Serialize for ColumnType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        ColumnType::from_str(&raw).map_err(de::Error::custom)
    }
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "String",
            ColumnType::Integer => "Integer",
            ColumnType::Float => "Float",
            ColumnType::Boolean => "Boolean",
            ColumnType::DateTime => "DateTime",
            ColumnType::Time => "Time",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["String", "Integer", "Float", "Boolean", "DateTime", "Time"]
    }

    pub fn semantic(&self) -> SemanticType {
        match self {
            ColumnType::Integer | ColumnType::Float => SemanticType::Numeric,
            ColumnType::DateTime | ColumnType::Time => SemanticType::Datetime,
            ColumnType::Boolean => SemanticType::Boolean,
            ColumnType::String => SemanticType::Categorical,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.semantic() == SemanticType::Numeric
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "string" | "str" | "text" | "varchar" => Ok(ColumnType::String),
            "integer" | "int" | "i64" => Ok(ColumnType::Integer),
            "float" | "double" | "real" | "f64" => Ok(ColumnType::Float),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "datetime" | "timestamp" => Ok(ColumnType::DateTime),
            "time" => Ok(ColumnType::Time),
            _ => Err(anyhow!(
                "Unknown column type '{value}'. Supported types: {}",
                ColumnType::variants().join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub datatype: ColumnType,
    #[serde(default)]
    pub nulls: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schema {
    pub rows: usize,
    pub columns: Vec<ColumnMeta>,
}

impl Schema {
    pub fn from_frame(frame: &Frame) -> Self {
        let columns = frame
            .columns()
            .iter()
            .map(|column| ColumnMeta {
                name: column.name().to_string(),
                datatype: column.datatype().clone(),
                nulls: column.null_count(),
            })
            .collect();
        Self {
            rows: frame.row_count(),
            columns,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating schema file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing schema YAML")
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing schema to YAML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader).with_context(|| format!("Parsing schema YAML {path:?}"))
    }
}
