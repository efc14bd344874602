/// Data layer: parsed curve tables, file loading, and tabular export.
///
/// Architecture:
/// ```text
///  .csv (+ .meta.json) / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → CurveTable
///   └──────────┘
///        │
///        ▼
///   ┌────────────┐
///   │ CurveTable  │  depth column, curves, null value, labels
///   └────────────┘
///        │  Well::add_source
///        ▼
///   properties … filter / resample / statistics
///        │
///        ▼
///   ┌──────────┐
///   │  export   │  Frame + units + labels → LogWriter
///   └──────────┘
/// ```

pub mod export;
pub mod loader;
pub mod model;
