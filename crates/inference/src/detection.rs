//! Detection records and their tabular view.

use crate::labels::ClassNames;
use image::RgbImage;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// One detected object in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub class_index: u32,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
}

/// Output of a single `detect` call, shared by extraction and annotation.
#[derive(Debug, Clone)]
pub struct RawDetectionResult {
    pub source_path: PathBuf,
    pub image: RgbImage,
    /// Sorted by descending confidence
    pub records: Vec<DetectionRecord>,
}

impl RawDetectionResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Columnar view with one row per record.
    pub fn table(&self, names: &ClassNames) -> Result<DetectionTable, TableError> {
        DetectionTable::from_records(&self.records, names)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("Column '{0}' not present")]
    MissingColumn(String),

    #[error("Column '{column}' holds {found} values")]
    ColumnType { column: String, found: &'static str },

    #[error("No label for class index {0}")]
    UnknownClass(u32),

    #[error("Column '{column}' has {found} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Float(Vec<f32>),
    Index(Vec<u32>),
    Text(Vec<String>),
}

impl ColumnValues {
    fn len(&self) -> usize {
        match self {
            ColumnValues::Float(v) => v.len(),
            ColumnValues::Index(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ColumnValues::Float(_) => "float",
            ColumnValues::Index(_) => "index",
            ColumnValues::Text(_) => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn new(name: impl Into<String>, values: ColumnValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Column-oriented detections: `xmin, ymin, xmax, ymax, confidence, class, name`.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionTable {
    rows: usize,
    columns: Vec<Column>,
}

impl DetectionTable {
    pub const COLUMNS: [&'static str; 7] =
        ["xmin", "ymin", "xmax", "ymax", "confidence", "class", "name"];

    pub fn from_records(
        records: &[DetectionRecord],
        names: &ClassNames,
    ) -> Result<Self, TableError> {
        let mut bounds: [Vec<f32>; 4] = Default::default();
        let mut confidence = Vec::with_capacity(records.len());
        let mut class = Vec::with_capacity(records.len());
        let mut name = Vec::with_capacity(records.len());

        for record in records {
            let label = names
                .get(record.class_index)
                .ok_or(TableError::UnknownClass(record.class_index))?;

            for (column, value) in bounds.iter_mut().zip(record.bbox) {
                column.push(value);
            }
            confidence.push(record.confidence);
            class.push(record.class_index);
            name.push(label.to_string());
        }

        let [xmin, ymin, xmax, ymax] = bounds;
        let columns = vec![
            Column::new("xmin", ColumnValues::Float(xmin)),
            Column::new("ymin", ColumnValues::Float(ymin)),
            Column::new("xmax", ColumnValues::Float(xmax)),
            Column::new("ymax", ColumnValues::Float(ymax)),
            Column::new("confidence", ColumnValues::Float(confidence)),
            Column::new("class", ColumnValues::Index(class)),
            Column::new("name", ColumnValues::Text(name)),
        ];

        Self::from_columns(columns)
    }

    /// Assemble a table from arbitrary columns; all must share one length.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, TableError> {
        let rows = columns.first().map(|c| c.values.len()).unwrap_or(0);

        if let Some(bad) = columns.iter().find(|c| c.values.len() != rows) {
            return Err(TableError::LengthMismatch {
                column: bad.name.clone(),
                expected: rows,
                found: bad.values.len(),
            });
        }

        Ok(Self { rows, columns })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn column(&self, name: &str) -> Result<&ColumnValues, TableError> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.values)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    pub fn text_column(&self, name: &str) -> Result<&[String], TableError> {
        match self.column(name)? {
            ColumnValues::Text(values) => Ok(values),
            other => Err(TableError::ColumnType {
                column: name.to_string(),
                found: other.kind(),
            }),
        }
    }
}
