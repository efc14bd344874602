//! Well-log property management, discrete filtering and depth-weighted
//! statistics.
//!
//! ```text
//!  files / tables ──► WellDataManager ──► Well ──► Source ──► Property
//!                                                               │ filter("Zone")
//!                                                               ▼
//!                                          Property + secondary filters
//!                                                               │ sums_avg / statistics
//!                                                               ▼
//!                                                     StatsNode tree
//! ```

pub mod data;
pub mod error;
pub mod group;
pub mod manager;
pub mod naming;
pub mod property;
pub mod resample;
pub mod stats;
pub mod well;

pub use data::model::{CurveTable, Frame, TopRecord};
pub use error::{Result, WellLogError};
pub use group::StatsNode;
pub use manager::{MultiWellResult, PropertyQuery, TopsOptions, WellDataManager};
pub use property::{Labels, Property, PropertyKind};
pub use stats::{GroupStats, Statistic, Statistics};
pub use well::{
    ExportOptions, FrameOptions, ResampleGrid, SharedWell, Source, SourceResult, StatOptions, Well,
};
