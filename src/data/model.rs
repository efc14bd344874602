use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde::Deserialize;

use crate::property::{Labels, PropertyKind};

/// Null sentinel used by most log files.
pub const DEFAULT_NULL_VALUE: f64 = -999.25;

/// Tolerance when matching values against the null sentinel.
pub const NULL_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Cell – a single value in a tabular export
// ---------------------------------------------------------------------------

/// A table cell. Discrete columns exported with labels mix strings and codes,
/// so cells are dynamically typed.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Float(f64),
    /// A discrete code with no label.
    Integer(i64),
    Label(String),
    Null,
}

impl Cell {
    /// Numeric cell; NaN becomes [`Cell::Null`].
    pub fn number(v: f64) -> Self {
        if v.is_nan() {
            Cell::Null
        } else {
            Cell::Float(v)
        }
    }

    /// Numeric view of the cell, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Float(v) => Some(*v),
            Cell::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Integer(i) => write!(f, "{i}"),
            Cell::Label(s) => write!(f, "{s}"),
            Cell::Null => write!(f, ""),
        }
    }
}

// ---------------------------------------------------------------------------
// Frame – depth plus named columns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

/// Column-oriented table handed to exporters and callers. The first column is
/// the depth reference when the frame comes from a property or well.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub columns: Vec<Column>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_column(&mut self, name: impl Into<String>, cells: Vec<Cell>) {
        self.columns.push(Column {
            name: name.into(),
            cells,
        });
    }

    pub fn push_numeric(&mut self, name: impl Into<String>, values: &[f64]) {
        self.push_column(name, values.iter().map(|&v| Cell::number(v)).collect());
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Rename a column; returns false when it does not exist.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        match self.columns.iter_mut().find(|c| c.name == from) {
            Some(col) => {
                col.name = to.to_string();
                true
            }
            None => false,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.cells.len())
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Write as CSV with a header row; nulls are written as `null_repr`.
    pub fn write_csv<W: io::Write>(&self, writer: W, null_repr: &str) -> Result<()> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(self.column_names())
            .context("writing CSV header")?;
        for row in 0..self.num_rows() {
            let record: Vec<String> = self
                .columns
                .iter()
                .map(|col| match col.cells.get(row) {
                    Some(Cell::Null) | None => null_repr.to_string(),
                    Some(cell) => cell.to_string(),
                })
                .collect();
            out.write_record(&record)
                .with_context(|| format!("writing CSV row {row}"))?;
        }
        out.flush().context("flushing CSV output")?;
        Ok(())
    }

    /// Arrow view of the frame. Columns holding labels become `Utf8`, the
    /// rest `Float64`; nulls stay null.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            if col.cells.iter().any(|c| matches!(c, Cell::Label(_))) {
                let array: StringArray = col
                    .cells
                    .iter()
                    .map(|c| (!c.is_null()).then(|| c.to_string()))
                    .collect();
                fields.push(Field::new(&col.name, DataType::Utf8, true));
                arrays.push(Arc::new(array));
            } else {
                let array: Float64Array = col.cells.iter().map(Cell::as_f64).collect();
                fields.push(Field::new(&col.name, DataType::Float64, true));
                arrays.push(Arc::new(array));
            }
        }
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .context("building record batch from frame")
    }
}

// ---------------------------------------------------------------------------
// Curve / CurveTable – a parsed log file
// ---------------------------------------------------------------------------

/// One curve of a parsed log file, values still carrying the file's null sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub name: String,
    pub unit: String,
    pub kind: PropertyKind,
    pub description: String,
    pub values: Vec<f64>,
}

impl Curve {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            unit: String::new(),
            kind: PropertyKind::Continuous,
            description: String::new(),
            values,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_kind(mut self, kind: PropertyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The parsed content of one log source: a depth column plus curves.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveTable {
    /// Well name from the file header, when the format carries one.
    pub well_name: Option<String>,
    pub depth_column: String,
    pub depth: Vec<f64>,
    pub curves: Vec<Curve>,
    pub null_value: f64,
    /// Code → label mappings for discrete curves, keyed by curve name.
    pub labels: BTreeMap<String, Labels>,
}

impl CurveTable {
    pub fn new(depth_column: impl Into<String>, depth: Vec<f64>) -> Self {
        Self {
            well_name: None,
            depth_column: depth_column.into(),
            depth,
            curves: Vec::new(),
            null_value: DEFAULT_NULL_VALUE,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_well_name(mut self, name: impl Into<String>) -> Self {
        self.well_name = Some(name.into());
        self
    }

    pub fn with_curve(mut self, curve: Curve) -> Self {
        self.curves.push(curve);
        self
    }

    pub fn with_labels(mut self, curve: impl Into<String>, labels: Labels) -> Self {
        self.labels.insert(curve.into(), labels);
        self
    }

    pub fn with_null_value(mut self, null_value: f64) -> Self {
        self.null_value = null_value;
        self
    }

    pub fn curve(&self, name: &str) -> Option<&Curve> {
        self.curves.iter().find(|c| c.name == name)
    }

    pub fn curve_names(&self) -> Vec<&str> {
        self.curves.iter().map(|c| c.name.as_str()).collect()
    }

    /// Whether `curve` is marked discrete, by kind or by carrying labels.
    pub fn is_discrete(&self, curve: &Curve) -> bool {
        curve.kind == PropertyKind::Discrete || self.labels.contains_key(&curve.name)
    }
}

// ---------------------------------------------------------------------------
// Formation tops
// ---------------------------------------------------------------------------

/// One formation top pick: the depth at which `surface` is met in `well`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopRecord {
    #[serde(alias = "Well", alias = "Well identifier (Well name)")]
    pub well: String,
    #[serde(alias = "Surface")]
    pub surface: String,
    #[serde(alias = "MD", alias = "Depth")]
    pub depth: f64,
    /// Pick location; absent columns and empty cells read as `None`.
    #[serde(default, alias = "X")]
    pub x: Option<f64>,
    #[serde(default, alias = "Y")]
    pub y: Option<f64>,
    #[serde(default, alias = "Z")]
    pub z: Option<f64>,
}

impl TopRecord {
    pub fn new(well: impl Into<String>, surface: impl Into<String>, depth: f64) -> Self {
        Self {
            well: well.into(),
            surface: surface.into(),
            depth,
            x: None,
            y: None,
            z: None,
        }
    }

    pub fn with_coordinates(mut self, x: f64, y: f64, z: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self.z = Some(z);
        self
    }
}
