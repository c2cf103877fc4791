//! Stage orchestration.
//!
//! A run takes ownership of the raw table and threads it through, in order:
//! column maintenance, type coercion, datetime canonicalization, coordinate
//! normalization, the time dimension, missing-value resolution and key
//! synthesis. [`Pipeline::load`] then hands the cleaned table to the upsert
//! engine.

use log::info;

use crate::{
    coerce::CoercionReport,
    config::PipelineConfig,
    coords,
    error::Result,
    frame::Frame,
    missing::{self, Resolution},
    store::Store,
    transform,
    upsert::{UpsertEngine, UpsertOutcome, UpsertStrategy},
};

#[derive(Debug, Clone)]
pub struct CleanReport {
    pub dropped_columns: Vec<String>,
    pub coercion: CoercionReport,
    pub resolution: Resolution,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn clean(&self, frame: Frame) -> Result<(Frame, CleanReport)> {
        let config = &self.config;
        let (frame, dropped_columns) = transform::drop_if_exist(frame, &config.drop_columns);
        let frame = transform::rename_if_exist(frame, &config.renames())?;
        let (mut frame, coercion) = config.coercer().coerce(frame)?;

        if let Some(source) = &config.datetime_source {
            frame = transform::canonicalize_datetime(frame, source)?;
        }
        if let Some(coordinates) = &config.coordinates {
            frame = coords::normalize_frame(frame, &coordinates.source()?)?;
        }
        if config.time_dimension {
            frame = transform::add_time_dimension(frame)?;
        }

        let (mut frame, resolution) = missing::resolve(frame)?;
        if let Some(builder) = config.key_builder() {
            frame = builder.build(frame)?;
        }

        let report = CleanReport {
            dropped_columns,
            coercion,
            resolution,
            rows: frame.row_count(),
            columns: frame.column_count(),
        };
        info!(
            "Cleaned table: {} row(s), {} column(s)",
            report.rows, report.columns
        );
        Ok((frame, report))
    }

    /// Cleans `frame` and appends its new rows to `table`.
    pub fn load<S: Store>(
        &self,
        frame: Frame,
        store: &mut S,
        table: &str,
        strategy: &UpsertStrategy,
    ) -> Result<(UpsertOutcome, CleanReport)> {
        let (frame, report) = self.clean(frame)?;
        let outcome = UpsertEngine::new(store).upsert(table, &frame, strategy)?;
        Ok((outcome, report))
    }
}
