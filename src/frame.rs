//! In-memory table model shared by every pipeline stage.
//!
//! A [`Frame`] is an ordered list of named [`Column`]s that all hold the same
//! number of rows. Each column carries exactly one [`ColumnType`]; every
//! non-null cell matches it. Stages take a `Frame` by value and hand back the
//! transformed table, so a caller never observes a half-updated table.

use crate::{
    data::Value,
    error::{PipelineError, Result},
    schema::ColumnType,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    datatype: ColumnType,
    cells: Vec<Option<Value>>,
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        datatype: ColumnType,
        cells: Vec<Option<Value>>,
    ) -> Result<Self> {
        let name = name.into();
        if let Some(found) = cells
            .iter()
            .flatten()
            .map(Value::column_type)
            .find(|ty| ty != &datatype)
        {
            return Err(PipelineError::TypeMismatch {
                column: name,
                expected: datatype.to_string(),
                found: found.to_string(),
            });
        }
        Ok(Self {
            name,
            datatype,
            cells,
        })
    }

    /// Builds a string column; `None` cells stay null.
    pub fn from_strings<I, S>(name: impl Into<String>, cells: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            datatype: ColumnType::String,
            cells: cells
                .into_iter()
                .map(|cell| cell.map(|s| Value::String(s.into())))
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> &ColumnType {
        &self.datatype
    }

    pub fn cells(&self) -> &[Option<Value>] {
        &self.cells
    }

    pub fn get(&self, row: usize) -> Option<&Value> {
        self.cells.get(row).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_none()).count()
    }

    pub fn non_null(&self) -> impl Iterator<Item = &Value> {
        self.cells.iter().flatten()
    }

    /// Non-null cells of a numeric column as `f64`, in row order.
    pub fn numeric_values(&self) -> Vec<f64> {
        self.non_null().filter_map(Value::as_f64).collect()
    }

    pub fn into_cells(self) -> Vec<Option<Value>> {
        self.cells
    }

    pub(crate) fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    fn take_rows(&self, mask: &[bool]) -> Column {
        let cells = self
            .cells
            .iter()
            .zip(mask)
            .filter(|(_, keep)| **keep)
            .map(|(cell, _)| cell.clone())
            .collect();
        Column {
            name: self.name.clone(),
            datatype: self.datatype.clone(),
            cells,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    columns: Vec<Column>,
    row_count: usize,
}

impl Frame {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let row_count = columns.first().map(Column::len).unwrap_or(0);
        let mut frame = Frame {
            columns: Vec::with_capacity(columns.len()),
            row_count,
        };
        for column in columns {
            frame.push_column(column)?;
        }
        Ok(frame)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Looks up a column a stage cannot proceed without.
    pub fn require(&self, stage: &'static str, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| PipelineError::missing_column(stage, name))
    }

    pub fn push_column(&mut self, column: Column) -> Result<()> {
        let at = self.columns.len();
        self.insert_column(at, column)
    }

    pub fn insert_column(&mut self, index: usize, column: Column) -> Result<()> {
        if self.column_index(&column.name).is_some() {
            return Err(PipelineError::DuplicateColumn(column.name));
        }
        if self.columns.is_empty() {
            self.row_count = column.len();
        } else if column.len() != self.row_count {
            return Err(PipelineError::LengthMismatch {
                found: column.len(),
                expected: self.row_count,
                column: column.name,
            });
        }
        let index = index.min(self.columns.len());
        self.columns.insert(index, column);
        Ok(())
    }

    /// Swaps in a column of the same name and length, keeping its position.
    pub fn replace_column(&mut self, column: Column) -> Result<()> {
        let index = self
            .column_index(&column.name)
            .ok_or_else(|| PipelineError::missing_column("replace", column.name.clone()))?;
        if column.len() != self.row_count {
            return Err(PipelineError::LengthMismatch {
                found: column.len(),
                expected: self.row_count,
                column: column.name,
            });
        }
        self.columns[index] = column;
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let index = self.column_index(name)?;
        let removed = self.columns.remove(index);
        if self.columns.is_empty() {
            self.row_count = 0;
        }
        Some(removed)
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<bool> {
        if from == to {
            return Ok(self.column_index(from).is_some());
        }
        if self.column_index(to).is_some() {
            return Err(PipelineError::DuplicateColumn(to.to_string()));
        }
        match self.columns.iter_mut().find(|c| c.name == from) {
            Some(column) => {
                column.rename(to);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Keeps the rows whose mask entry is `true`.
    pub fn filter_rows(&self, mask: &[bool]) -> Frame {
        let columns: Vec<Column> = self.columns.iter().map(|c| c.take_rows(mask)).collect();
        let row_count = mask
            .iter()
            .take(self.row_count)
            .filter(|keep| **keep)
            .count();
        Frame { columns, row_count }
    }

    /// Cells of one row in column order.
    pub fn row(&self, index: usize) -> Vec<Option<&Value>> {
        self.columns.iter().map(|c| c.get(index)).collect()
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station_column(values: &[&str]) -> Column {
        Column::from_strings("Station ID", values.iter().map(|v| Some(*v)))
    }

    #[test]
    fn column_rejects_cells_of_another_type() {
        let err = Column::new(
            "Wave Height (m)",
            ColumnType::Float,
            vec![Some(Value::Float(1.0)), Some(Value::String("x".into()))],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::TypeMismatch { .. }));
    }

    #[test]
    fn frame_enforces_equal_row_counts() {
        let mut frame = Frame::new(vec![station_column(&["a", "b"])]).unwrap();
        let short = Column::from_strings("Zone", [Some("x")]);
        let err = frame.push_column(short).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::LengthMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn replace_rejects_column_of_another_length() {
        let mut frame = Frame::new(vec![station_column(&["a", "b"])]).unwrap();
        let err = frame.replace_column(station_column(&["a"])).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::LengthMismatch { ref column, expected: 2, found: 1 } if column == "Station ID"
        ));
        assert_eq!(frame.column("Station ID").unwrap().len(), 2);
    }

    #[test]
    fn frame_rejects_duplicate_names() {
        let mut frame = Frame::new(vec![station_column(&["a"])]).unwrap();
        let err = frame.push_column(station_column(&["b"])).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateColumn(_)));
    }

    #[test]
    fn filter_rows_keeps_masked_rows_across_columns() {
        let frame = Frame::new(vec![
            station_column(&["a", "b", "c"]),
            Column::new(
                "Value",
                ColumnType::Integer,
                vec![Some(Value::Integer(1)), None, Some(Value::Integer(3))],
            )
            .unwrap(),
        ])
        .unwrap();
        let filtered = frame.filter_rows(&[false, true, true]);
        assert_eq!(filtered.row_count(), 2);
        assert_eq!(
            filtered.row(1),
            vec![Some(&Value::String("c".into())), Some(&Value::Integer(3))]
        );
        assert_eq!(filtered.column("Value").unwrap().null_count(), 1);
    }

    #[test]
    fn rename_refuses_to_shadow_existing_column() {
        let mut frame = Frame::new(vec![
            station_column(&["a"]),
            Column::from_strings("Zone", [Some("x")]),
        ])
        .unwrap();
        assert!(frame.rename_column("Zone", "Station ID").is_err());
        assert!(!frame.rename_column("Missing", "Other").unwrap());
        assert!(frame.rename_column("Zone", "Station Zone").unwrap());
        assert_eq!(frame.column_names(), vec!["Station ID", "Station Zone"]);
    }
}
