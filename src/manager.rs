//! Registry of wells and statistics queries that span all of them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use anyhow::anyhow;
use log::{debug, info};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::data::model::{Curve, CurveTable, TopRecord};
use crate::error::{list_or_none, Result, WellLogError};
use crate::group::StatsNode;
use crate::naming::{sanitize_property_name, well_key};
use crate::property::{Labels, Property, PropertyKind};
use crate::stats::{GroupStats, Statistic, Statistics};
use crate::well::{file_source_name, load_table, SharedWell, SourceResult, StatOptions, Well};

/// Where [`WellDataManager::load_tops`] puts the tops in each well.
#[derive(Debug, Clone)]
pub struct TopsOptions {
    pub property_name: String,
    pub source_name: String,
    /// Also add the pick coordinates as continuous `X`, `Y`, `Z` properties.
    pub include_coordinates: bool,
}

impl Default for TopsOptions {
    fn default() -> Self {
        Self {
            property_name: "Well_Tops".to_string(),
            source_name: "Imported_Tops".to_string(),
            include_coordinates: false,
        }
    }
}

/// Coordinate curves for one well's picks; a column none of them has is left out.
fn coordinate_curves(picks: &[&TopRecord]) -> Vec<Curve> {
    let axes: [(&str, fn(&TopRecord) -> Option<f64>); 3] =
        [("X", |r| r.x), ("Y", |r| r.y), ("Z", |r| r.z)];
    axes.into_iter()
        .filter(|&(_, get)| picks.iter().copied().any(|r| get(r).is_some()))
        .map(|(name, get)| {
            let values = picks.iter().copied().map(|r| get(r).unwrap_or(f64::NAN)).collect();
            Curve::new(name, values)
                .with_kind(PropertyKind::Continuous)
                .with_unit("m")
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Wells keyed by `well_{sanitized name}`, in insertion order.
#[derive(Debug, Default)]
pub struct WellDataManager {
    wells: Vec<(String, SharedWell)>,
}

impl WellDataManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing well with this name, or a new empty one.
    pub fn add_well(&mut self, name: &str) -> SharedWell {
        let key = well_key(name);
        if let Some((_, well)) = self.wells.iter().find(|(k, _)| *k == key) {
            return well.clone();
        }
        debug!("creating well '{name}' as {key}");
        let well = Well::new(name);
        self.wells.push((key, well.clone()));
        well
    }

    fn position(&self, name: &str) -> Option<usize> {
        let candidates = [name.to_string(), format!("well_{name}"), well_key(name)];
        self.wells
            .iter()
            .position(|(k, _)| candidates.iter().any(|c| c == k))
    }

    /// Well by registry key (`well_36_7_5_A`), sanitised name (`36_7_5_A`) or
    /// display name (`36/7-5 A`).
    pub fn get_well(&self, name: &str) -> Result<SharedWell> {
        match self.position(name) {
            Some(idx) => Ok(self.wells[idx].1.clone()),
            None => Err(self.not_found(name)),
        }
    }

    pub fn remove_well(&mut self, name: &str) -> Result<SharedWell> {
        match self.position(name) {
            Some(idx) => Ok(self.wells.remove(idx).1),
            None => Err(self.not_found(name)),
        }
    }

    fn not_found(&self, name: &str) -> WellLogError {
        WellLogError::WellNotFound(format!(
            "well '{name}' not found; available wells: {}",
            list_or_none(&self.wells())
        ))
    }

    /// Registry keys in insertion order.
    pub fn wells(&self) -> Vec<&str> {
        self.wells.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn well_handles(&self) -> impl Iterator<Item = &SharedWell> {
        self.wells.iter().map(|(_, w)| w)
    }

    pub fn len(&self) -> usize {
        self.wells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wells.is_empty()
    }

    // ---------------------------------------------------------------------------
    // Ingestion
    // ---------------------------------------------------------------------------

    /// Load a log file into the well it names, creating the well if needed.
    pub fn load_file(&mut self, path: &Path) -> Result<SharedWell> {
        let table = load_table(path)?;
        let well_name = table.well_name.clone().ok_or_else(|| {
            WellLogError::Load(anyhow!(
                "{} has no well name; cannot tell which well to load it into",
                path.display()
            ))
        })?;
        let well = self.add_well(&well_name);
        well.borrow_mut()
            .add_source(&file_source_name(path), table, Some(path))?;
        Ok(well)
    }

    pub fn load_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<()> {
        for path in paths {
            self.load_file(path.as_ref())?;
        }
        Ok(())
    }

    /// Add formation tops as a discrete property in every well they mention.
    ///
    /// Surfaces are coded alphabetically across all records, so the same
    /// surface has the same code and label in every well. Wells are created as
    /// needed; an existing tops source is overwritten.
    pub fn load_tops(&mut self, records: &[TopRecord], options: &TopsOptions) -> Result<()> {
        let surfaces: BTreeSet<&str> = records.iter().map(|r| r.surface.as_str()).collect();
        let codes: BTreeMap<&str, i64> = surfaces
            .iter()
            .enumerate()
            .map(|(i, s)| (*s, i as i64))
            .collect();
        let labels: Labels = codes.iter().map(|(s, &c)| (c, s.to_string())).collect();

        let mut by_well: BTreeMap<&str, Vec<&TopRecord>> = BTreeMap::new();
        for record in records {
            by_well.entry(record.well.as_str()).or_default().push(record);
        }

        let source = sanitize_property_name(&options.source_name);
        for (well_name, mut picks) in by_well {
            picks.sort_by(|a, b| a.depth.total_cmp(&b.depth));
            let depth: Vec<f64> = picks.iter().map(|r| r.depth).collect();
            let values: Vec<f64> = picks
                .iter()
                .map(|r| codes.get(r.surface.as_str()).map_or(f64::NAN, |&c| c as f64))
                .collect();
            let mut table = CurveTable::new("DEPT", depth)
                .with_well_name(well_name)
                .with_curve(Curve::new(options.property_name.clone(), values).with_kind(PropertyKind::Discrete))
                .with_labels(options.property_name.clone(), labels.clone());
            if options.include_coordinates {
                table.curves.extend(coordinate_curves(&picks));
            }

            let well = self.add_well(well_name);
            well.borrow_mut().add_source(&source, table, None)?;
        }
        info!(
            "loaded {} tops ({} surfaces) into source '{source}'",
            records.len(),
            labels.len()
        );
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------------

    /// Start a statistics query for `name` across every well.
    ///
    /// ```ignore
    /// let zones = manager.property("PHIE").filter("Zone").filter("NTG").sums_avg()?;
    /// let p90 = manager.property("PHIE").weighted(false).percentile(90.0)?;
    /// ```
    pub fn property(&self, name: &str) -> PropertyQuery<'_> {
        PropertyQuery {
            manager: self,
            name: name.to_string(),
            filters: Vec::new(),
            nested: false,
            weighted: true,
        }
    }
}

impl fmt::Display for WellDataManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WellDataManager(wells={})", self.wells.len())
    }
}

// ---------------------------------------------------------------------------
// Multi-well query
// ---------------------------------------------------------------------------

/// Per-well results, in registry order, keyed by well display name.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiWellResult<T> {
    wells: Vec<(String, SourceResult<T>)>,
}

impl<T> MultiWellResult<T> {
    /// Result for a well by display or sanitised name.
    pub fn get(&self, well: &str) -> Option<&SourceResult<T>> {
        let key = well_key(well);
        self.wells
            .iter()
            .find(|(name, _)| name == well || well_key(name) == key)
            .map(|(_, r)| r)
    }

    pub fn well_names(&self) -> Vec<&str> {
        self.wells.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SourceResult<T>)> {
        self.wells.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.wells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wells.is_empty()
    }
}

impl<T: Serialize> Serialize for MultiWellResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.wells.len()))?;
        for (well, result) in &self.wells {
            map.serialize_entry(well, result)?;
        }
        map.end()
    }
}

/// Builder for a statistic over one property in every well.
///
/// Wells without the property are left out of the result, and filters a
/// well does not have are skipped for that well. Statistics are depth
/// weighted unless [`PropertyQuery::weighted`] turns that off.
#[derive(Debug, Clone)]
pub struct PropertyQuery<'a> {
    manager: &'a WellDataManager,
    name: String,
    filters: Vec<String>,
    nested: bool,
    weighted: bool,
}

impl PropertyQuery<'_> {
    pub fn filter(mut self, name: &str) -> Self {
        self.filters.push(name.to_string());
        self
    }

    /// Key every well's result by source, even where the name is unique.
    pub fn nested(mut self, nested: bool) -> Self {
        self.nested = nested;
        self
    }

    pub fn weighted(mut self, weighted: bool) -> Self {
        self.weighted = weighted;
        self
    }

    fn run<T>(&self, leaf: impl Fn(&Property) -> StatsNode<T>) -> Result<MultiWellResult<T>> {
        let options = StatOptions {
            nested: self.nested,
            skip_missing_filters: true,
        };
        let mut wells = Vec::new();
        for handle in self.manager.well_handles() {
            let well = handle.try_borrow().map_err(|_| {
                WellLogError::Well("a well is being modified while it is queried".to_string())
            })?;
            if !well.has_property(&self.name) {
                debug!("well '{}' has no '{}', skipping", well.name(), self.name);
                continue;
            }
            let result = well.property_stats(&self.name, &self.filters, &options, &leaf)?;
            wells.push((well.name().to_string(), result));
        }
        Ok(MultiWellResult { wells })
    }

    pub fn sums_avg(&self) -> Result<MultiWellResult<GroupStats>> {
        self.run(Property::sums_avg)
    }

    pub fn statistics(&self) -> Result<MultiWellResult<Statistics>> {
        self.run(Property::statistics)
    }

    /// Any single statistic, honouring the weighted switch.
    pub fn compute(&self, stat: Statistic) -> Result<MultiWellResult<f64>> {
        if let Statistic::Percentile(p) = stat {
            if !(0.0..=100.0).contains(&p) {
                return Err(WellLogError::InvalidArgument(format!(
                    "percentile must be within 0..=100, got {p}"
                )));
            }
        }
        let weighted = self.weighted;
        self.run(|prop| prop.statistic(stat, weighted))
    }

    pub fn mean(&self) -> Result<MultiWellResult<f64>> {
        self.compute(Statistic::Mean)
    }

    pub fn sum(&self) -> Result<MultiWellResult<f64>> {
        self.compute(Statistic::Sum)
    }

    pub fn std(&self) -> Result<MultiWellResult<f64>> {
        self.compute(Statistic::Std)
    }

    pub fn min(&self) -> Result<MultiWellResult<f64>> {
        self.compute(Statistic::Min)
    }

    pub fn max(&self) -> Result<MultiWellResult<f64>> {
        self.compute(Statistic::Max)
    }

    pub fn median(&self) -> Result<MultiWellResult<f64>> {
        self.compute(Statistic::Median)
    }

    pub fn percentile(&self, p: f64) -> Result<MultiWellResult<f64>> {
        self.compute(Statistic::Percentile(p))
    }

    pub fn count(&self) -> Result<MultiWellResult<f64>> {
        self.compute(Statistic::Count)
    }
}
