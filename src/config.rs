//! YAML pipeline configuration.
//!
//! ```yaml
//! drop_columns: ["Unnamed: 0", "index"]
//! rename:
//!   station_id: Station ID
//!   WVHT: Wave Height (m)
//! datetime_source: time
//! time_dimension: true
//! coordinates:
//!   location: Location
//! key_columns: [Station ID, Datetime]
//! target_table: cleaned_meteo_data
//! upsert:
//!   strategy: watermark
//!   column: Datetime
//! ```
//!
//! Every field is optional; an empty document yields [`PipelineConfig::default`].

use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    coerce::{DEFAULT_BOOLEAN_FLAGS, DEFAULT_DATETIME_HINTS, TypeCoercer},
    coords::CoordinateSource,
    error::{PipelineError, Result},
    identity::{IdentityKeyBuilder, UNIQUE_ID_COLUMN},
    transform::DATETIME_COLUMN,
    upsert::{StrategyKind, UpsertStrategy},
};

pub const DEFAULT_TARGET_TABLE: &str = "cleaned_meteo_data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub drop_columns: Vec<String>,
    pub rename: BTreeMap<String, String>,
    pub datetime_source: Option<String>,
    pub time_dimension: bool,
    pub boolean_flags: Vec<String>,
    pub datetime_hints: Vec<String>,
    pub coordinates: Option<CoordinateConfig>,
    pub key_columns: Vec<String>,
    pub key_delimiter: Option<String>,
    pub target_table: String,
    pub upsert: UpsertConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            drop_columns: Vec::new(),
            rename: BTreeMap::new(),
            datetime_source: None,
            time_dimension: false,
            boolean_flags: DEFAULT_BOOLEAN_FLAGS.iter().map(|s| s.to_string()).collect(),
            datetime_hints: DEFAULT_DATETIME_HINTS.iter().map(|s| s.to_string()).collect(),
            coordinates: None,
            key_columns: Vec::new(),
            key_delimiter: None,
            target_table: DEFAULT_TARGET_TABLE.to_string(),
            upsert: UpsertConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinateConfig {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub location: Option<String>,
}

impl CoordinateConfig {
    pub fn source(&self) -> Result<CoordinateSource> {
        match (&self.latitude, &self.longitude, &self.location) {
            (Some(latitude), Some(longitude), None) => Ok(CoordinateSource::Columns {
                latitude: latitude.clone(),
                longitude: longitude.clone(),
            }),
            (None, None, Some(column)) => Ok(CoordinateSource::Location {
                column: column.clone(),
            }),
            _ => Err(PipelineError::Config(
                "coordinates need either latitude and longitude, or location".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct UpsertConfig {
    pub strategy: StrategyKind,
    /// Ordering column (watermark) or reference column (key-set).
    pub column: Option<String>,
}

impl UpsertConfig {
    pub fn resolve(&self) -> UpsertStrategy {
        let column = self.column.clone().unwrap_or_else(|| match self.strategy {
            StrategyKind::Watermark => DATETIME_COLUMN.to_string(),
            StrategyKind::KeySet => UNIQUE_ID_COLUMN.to_string(),
        });
        UpsertStrategy::new(self.strategy, column)
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Option<Self> = serde_yaml::from_str(text)?;
        let config = config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_table.trim().is_empty() {
            return Err(PipelineError::Config("target_table must not be empty".into()));
        }
        if let Some(coordinates) = &self.coordinates {
            coordinates.source()?;
        }
        if let Some(column) = &self.upsert.column
            && column.trim().is_empty()
        {
            return Err(PipelineError::Config("upsert.column must not be empty".into()));
        }
        Ok(())
    }

    pub fn coercer(&self) -> TypeCoercer {
        TypeCoercer::new(self.boolean_flags.clone(), self.datetime_hints.clone())
    }

    pub fn key_builder(&self) -> Option<IdentityKeyBuilder> {
        (!self.key_columns.is_empty()).then(|| {
            IdentityKeyBuilder::new(self.key_columns.clone())
                .with_delimiter(self.key_delimiter.clone())
        })
    }

    pub fn renames(&self) -> Vec<(&str, &str)> {
        self.rename
            .iter()
            .map(|(from, to)| (from.as_str(), to.as_str()))
            .collect()
    }
}
