use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, Float32Array, Float64Array, Int32Array, Int64Array};
use arrow::datatypes::DataType;
use log::{info, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Deserialize;

use super::export::{sidecar_path, LogMetadata, METADATA_KEY};
use super::model::{Curve, CurveTable, TopRecord, DEFAULT_NULL_VALUE};
use crate::property::{Labels, PropertyKind};

/// Column names recognised as the depth reference, case-insensitively.
const DEPTH_NAMES: [&str; 4] = ["DEPT", "DEPTH", "MD", "TVD"];

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a curve table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – one column per curve, header row with curve names; an
///   optional `<stem>.meta.json` sidecar supplies well name, units, kinds,
///   labels and the null value
/// * `.json`    – `{ "well": ..., "depth": [...], "curves": [{ "name", "values", ... }] }`
/// * `.parquet` – one numeric column per curve; metadata read from the
///   `welllog` schema key when present
pub fn load_file(path: &Path) -> Result<CurveTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "csv" => load_csv(path),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    info!(
        "loaded {} curves x {} samples from {}",
        table.curves.len(),
        table.depth.len(),
        path.display()
    );
    Ok(table)
}

/// Read formation tops from a CSV with `well`, `surface` and `depth` columns
/// (`Well`, `Surface` and `MD` are accepted too).
pub fn load_tops_csv(path: &Path) -> Result<Vec<TopRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening tops file {}", path.display()))?;
    let mut records = Vec::new();
    for (i, row) in reader.deserialize::<TopRecord>().enumerate() {
        records.push(row.with_context(|| format!("parsing tops row {}", i + 1))?);
    }
    info!("loaded {} tops from {}", records.len(), path.display());
    Ok(records)
}

/// The metadata names a depth column the file does not have.
#[derive(Debug, thiserror::Error)]
#[error("depth column '{0}' not found")]
pub struct MissingDepthColumn(pub String);

/// Index of the depth column among `names`: a known depth mnemonic, else the first.
fn depth_column_index<S: AsRef<str>>(names: &[S]) -> Option<usize> {
    if names.is_empty() {
        return None;
    }
    let found = names.iter().position(|n| {
        DEPTH_NAMES
            .iter()
            .any(|d| n.as_ref().eq_ignore_ascii_case(d))
    });
    Some(found.unwrap_or(0))
}

/// Assemble a table from raw columns and optional metadata.
fn build_table(
    mut columns: Vec<(String, Vec<f64>, PropertyKind)>,
    meta: LogMetadata,
) -> Result<CurveTable> {
    let names: Vec<&str> = columns.iter().map(|(n, _, _)| n.as_str()).collect();
    let depth_idx = match meta.depth_column.as_deref() {
        Some(name) => names
            .iter()
            .position(|n| *n == name)
            .ok_or_else(|| MissingDepthColumn(name.to_string()))?,
        None => depth_column_index(&names).context("no columns found")?,
    };

    let (depth_column, depth, _) = columns.remove(depth_idx);
    let mut table = CurveTable::new(depth_column, depth)
        .with_null_value(meta.null_value);
    table.well_name = meta.well_name;
    table.labels = meta.labels;

    for (name, values, inferred) in columns {
        let kind = meta
            .kinds
            .get(&name)
            .map(|k| PropertyKind::from(k.as_str()))
            .unwrap_or(inferred);
        let unit = meta.units.get(&name).cloned().unwrap_or_default();
        let description = meta.descriptions.get(&name).cloned().unwrap_or_default();
        table.curves.push(
            Curve::new(name, values)
                .with_kind(kind)
                .with_unit(unit)
                .with_description(description),
        );
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with curve names, one row per depth sample.
/// Empty cells are missing values.
fn load_csv(path: &Path) -> Result<CurveTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut data: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        for (col_idx, column) in data.iter_mut().enumerate() {
            let raw = record.get(col_idx).unwrap_or("").trim();
            let value = if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
                f64::NAN
            } else {
                raw.parse::<f64>().with_context(|| {
                    format!("Row {row_no}, {}: '{raw}' is not a number", headers[col_idx])
                })?
            };
            column.push(value);
        }
    }

    let meta = read_sidecar(path)?;
    let columns = headers
        .into_iter()
        .zip(data)
        .map(|(name, values)| (name, values, PropertyKind::Continuous))
        .collect();
    build_table(columns, meta)
}

fn read_sidecar(path: &Path) -> Result<LogMetadata> {
    let meta_path = sidecar_path(path);
    if !meta_path.exists() {
        return Ok(LogMetadata::default());
    }
    let text = std::fs::read_to_string(&meta_path)
        .with_context(|| format!("reading {}", meta_path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", meta_path.display()))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

fn default_null() -> f64 {
    DEFAULT_NULL_VALUE
}

fn default_depth_column() -> String {
    "DEPT".to_string()
}

/// Expected JSON schema:
///
/// ```json
/// {
///   "well": "36/7-5 A",
///   "null_value": -999.25,
///   "depth_column": "DEPT",
///   "depth": [2200.0, 2200.5, ...],
///   "curves": [
///     { "name": "PHIE", "unit": "v/v", "values": [0.21, null, ...] },
///     { "name": "Zone", "type": "discrete", "values": [0, 0, ...] }
///   ],
///   "labels": { "Zone": { "0": "Upper", "1": "Lower" } }
/// }
/// ```
#[derive(Debug, Deserialize)]
struct JsonLog {
    #[serde(default)]
    well: Option<String>,
    #[serde(default = "default_null")]
    null_value: f64,
    #[serde(default = "default_depth_column")]
    depth_column: String,
    depth: Vec<Option<f64>>,
    curves: Vec<JsonCurve>,
    #[serde(default)]
    labels: BTreeMap<String, Labels>,
}

#[derive(Debug, Deserialize)]
struct JsonCurve {
    name: String,
    #[serde(default)]
    unit: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    description: String,
    values: Vec<Option<f64>>,
}

fn load_json(path: &Path) -> Result<CurveTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let log: JsonLog = serde_json::from_str(&text).context("parsing JSON")?;

    let depth: Vec<f64> = log.depth.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
    let mut table = CurveTable::new(log.depth_column, depth).with_null_value(log.null_value);
    table.well_name = log.well;
    table.labels = log.labels;

    for curve in log.curves {
        if curve.values.len() != table.depth.len() {
            bail!(
                "curve '{}' has {} values but depth has {}",
                curve.name,
                curve.values.len(),
                table.depth.len()
            );
        }
        let kind = curve
            .kind
            .as_deref()
            .map(PropertyKind::from)
            .unwrap_or(PropertyKind::Continuous);
        let values = curve.values.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        table.curves.push(
            Curve::new(curve.name, values)
                .with_unit(curve.unit)
                .with_kind(kind)
                .with_description(curve.description),
        );
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one numeric column per curve.
///
/// Float columns are continuous curves; integer columns are read as discrete
/// codes. Other column types are skipped.
fn load_parquet(path: &Path) -> Result<CurveTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;

    let meta = match builder.schema().metadata().get(METADATA_KEY) {
        Some(json) => serde_json::from_str(json).context("parsing welllog schema metadata")?,
        None => LogMetadata::default(),
    };

    let reader = builder.build().context("building parquet reader")?;

    let mut columns: Vec<(String, Vec<f64>, PropertyKind)> = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        if columns.is_empty() {
            for field in schema.fields() {
                let kind = match field.data_type() {
                    DataType::Float64 | DataType::Float32 => PropertyKind::Continuous,
                    DataType::Int32 | DataType::Int64 => PropertyKind::Discrete,
                    other => {
                        warn!("skipping column '{}' of type {other:?}", field.name());
                        continue;
                    }
                };
                columns.push((field.name().clone(), Vec::new(), kind));
            }
        }

        for (name, values, _) in columns.iter_mut() {
            let idx = schema
                .index_of(name)
                .map_err(|_| anyhow::anyhow!("column '{name}' missing from record batch"))?;
            values.extend(extract_f64(batch.column(idx))
                .with_context(|| format!("reading column '{name}'"))?);
        }
    }

    build_table(columns, meta)
}

/// Numeric column as `f64`, nulls as NaN.
fn extract_f64(col: &Arc<dyn Array>) -> Result<Vec<f64>> {
    let any = col.as_any();
    if let Some(arr) = any.downcast_ref::<Float64Array>() {
        Ok(arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(arr) = any.downcast_ref::<Float32Array>() {
        Ok(arr.iter().map(|v| v.map_or(f64::NAN, f64::from)).collect())
    } else if let Some(arr) = any.downcast_ref::<Int32Array>() {
        Ok(arr.iter().map(|v| v.map_or(f64::NAN, f64::from)).collect())
    } else if let Some(arr) = any.downcast_ref::<Int64Array>() {
        Ok(arr.iter().map(|v| v.map_or(f64::NAN, |x| x as f64)).collect())
    } else {
        bail!("expected a numeric column, got {:?}", col.data_type())
    }
}
