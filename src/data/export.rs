use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};

use super::model::{Frame, DEFAULT_NULL_VALUE};
use crate::property::Labels;

/// Schema metadata key carrying [`LogMetadata`] in Parquet files.
pub const METADATA_KEY: &str = "welllog";

// ---------------------------------------------------------------------------
// Payload handed to writers
// ---------------------------------------------------------------------------

/// Everything a log writer needs: numeric data keyed by original curve names,
/// units per column and the discrete label side-channel.
#[derive(Debug, Clone, PartialEq)]
pub struct LogPayload {
    pub well_name: String,
    /// Numeric cells only; labels travel in `labels`, not in the rows.
    pub frame: Frame,
    pub units: BTreeMap<String, String>,
    /// Property kind per column (`continuous`, `discrete`, ...).
    pub kinds: BTreeMap<String, String>,
    pub labels: BTreeMap<String, Labels>,
    pub null_value: f64,
}

/// Serialisation backend for [`LogPayload`]s.
pub trait LogWriter {
    fn write_log(&mut self, payload: &LogPayload) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Metadata sidecar
// ---------------------------------------------------------------------------

/// Header information stored beside the data rows so a written log loads
/// back with the same units, kinds and labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMetadata {
    #[serde(default)]
    pub well_name: Option<String>,
    #[serde(default = "default_null")]
    pub null_value: f64,
    #[serde(default)]
    pub depth_column: Option<String>,
    #[serde(default)]
    pub units: BTreeMap<String, String>,
    #[serde(default)]
    pub kinds: BTreeMap<String, String>,
    #[serde(default)]
    pub descriptions: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, Labels>,
}

fn default_null() -> f64 {
    DEFAULT_NULL_VALUE
}

impl Default for LogMetadata {
    fn default() -> Self {
        Self {
            well_name: None,
            null_value: DEFAULT_NULL_VALUE,
            depth_column: None,
            units: BTreeMap::new(),
            kinds: BTreeMap::new(),
            descriptions: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }
}

impl LogMetadata {
    /// Header information for a payload. Columns carrying labels are always
    /// marked discrete so they load back as filters.
    pub fn for_payload(payload: &LogPayload) -> Self {
        let mut kinds = payload.kinds.clone();
        for name in payload.labels.keys() {
            kinds.insert(name.clone(), "discrete".to_string());
        }
        Self {
            well_name: Some(payload.well_name.clone()),
            null_value: payload.null_value,
            depth_column: payload.frame.columns.first().map(|c| c.name.clone()),
            units: payload.units.clone(),
            kinds,
            descriptions: BTreeMap::new(),
            labels: payload.labels.clone(),
        }
    }
}

/// `log.csv` → `log.meta.json`.
pub fn sidecar_path(path: &Path) -> PathBuf {
    path.with_extension("meta.json")
}

// ---------------------------------------------------------------------------
// CSV writer
// ---------------------------------------------------------------------------

/// Writes the data rows as CSV and the header information as a JSON sidecar.
#[derive(Debug, Clone)]
pub struct CsvLogWriter {
    path: PathBuf,
}

impl CsvLogWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogWriter for CsvLogWriter {
    fn write_log(&mut self, payload: &LogPayload) -> Result<()> {
        let file = std::fs::File::create(&self.path)
            .with_context(|| format!("creating {}", self.path.display()))?;
        payload
            .frame
            .write_csv(file, &payload.null_value.to_string())?;

        let meta = LogMetadata::for_payload(payload);
        let meta_path = sidecar_path(&self.path);
        let text = serde_json::to_string_pretty(&meta).context("serialising log metadata")?;
        std::fs::write(&meta_path, text)
            .with_context(|| format!("writing {}", meta_path.display()))?;

        info!(
            "wrote {} rows x {} columns for '{}' to {}",
            payload.frame.num_rows(),
            payload.frame.num_columns(),
            payload.well_name,
            self.path.display()
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Parquet writer
// ---------------------------------------------------------------------------

/// Writes one Parquet file; header information travels in the schema
/// metadata under [`METADATA_KEY`]. Missing values are written as nulls.
#[derive(Debug, Clone)]
pub struct ParquetLogWriter {
    path: PathBuf,
}

impl ParquetLogWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LogWriter for ParquetLogWriter {
    fn write_log(&mut self, payload: &LogPayload) -> Result<()> {
        let batch = payload.frame.to_record_batch()?;
        let meta = serde_json::to_string(&LogMetadata::for_payload(payload))
            .context("serialising log metadata")?;
        let schema = Arc::new(
            batch
                .schema()
                .as_ref()
                .clone()
                .with_metadata(HashMap::from([(METADATA_KEY.to_string(), meta)])),
        );
        let batch = batch
            .with_schema(schema.clone())
            .context("attaching log metadata to schema")?;

        let file = std::fs::File::create(&self.path)
            .with_context(|| format!("creating {}", self.path.display()))?;
        let mut writer =
            ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
        writer.write(&batch).context("writing record batch")?;
        writer.close().context("closing parquet writer")?;

        info!(
            "wrote {} rows x {} columns for '{}' to {}",
            batch.num_rows(),
            batch.num_columns(),
            payload.well_name,
            self.path.display()
        );
        Ok(())
    }
}
