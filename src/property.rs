//! A single log property and its filter chain.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use log::debug;

use crate::data::export::{LogPayload, LogWriter};
use crate::data::model::{Cell, Curve, Frame, DEFAULT_NULL_VALUE, NULL_TOLERANCE};
use crate::error::{Result, WellLogError};
use crate::group::{group_by, Dimension, StatsNode};
use crate::naming::sanitize_property_name;
use crate::resample::{resample_to_grid, Method};
use crate::stats::{compute_intervals, select, summarize, GroupStats, Statistic, Statistics};
use crate::well::Well;

/// Code → label mapping for a discrete property, e.g. `{0: "NonNet", 1: "Net"}`.
pub type Labels = BTreeMap<i64, String>;

// ---------------------------------------------------------------------------
// PropertyKind
// ---------------------------------------------------------------------------

/// How a property's values are to be read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Measured or computed log, interpolated linearly.
    Continuous,
    /// Integer codes (zones, flags, facies); the only kind usable as a filter.
    Discrete,
    /// Sparse point data such as core plugs.
    Sampled,
    /// Any other tag carried through from the source file.
    Other(String),
}

impl From<&str> for PropertyKind {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "continuous" => PropertyKind::Continuous,
            "discrete" => PropertyKind::Discrete,
            "sampled" => PropertyKind::Sampled,
            _ => PropertyKind::Other(s.trim().to_string()),
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKind::Continuous => write!(f, "continuous"),
            PropertyKind::Discrete => write!(f, "discrete"),
            PropertyKind::Sampled => write!(f, "sampled"),
            PropertyKind::Other(tag) => write!(f, "{tag}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Property
// ---------------------------------------------------------------------------

/// A named series over depth, with optional discrete filters attached.
///
/// Filters are stored as secondary properties that always share this
/// property's depth array; [`Property::filter`] resamples the filter onto
/// the grid rather than moving the grid.
///
/// ```ignore
/// let well = well.borrow();
/// let stats = well.get_property("PHIE")?.filter("Zone")?.filter("NTG")?.sums_avg();
/// ```
#[derive(Debug, Clone)]
pub struct Property {
    name: String,
    original_name: String,
    depth: Vec<f64>,
    values: Vec<f64>,
    unit: String,
    description: String,
    kind: PropertyKind,
    labels: Option<Labels>,
    source: Option<String>,
    secondary: Vec<Property>,
    parent: Option<Weak<RefCell<Well>>>,
}

/// Replace values within [`NULL_TOLERANCE`] of `null_value` with NaN.
fn normalize_nulls(values: &mut [f64], null_value: f64) {
    for v in values.iter_mut() {
        if (*v - null_value).abs() < NULL_TOLERANCE {
            *v = f64::NAN;
        }
    }
}

impl Property {
    /// Build a continuous property. `name` may be a display name; lookups use
    /// its sanitised form. Values equal to the default null sentinel become NaN.
    pub fn new(name: &str, depth: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        Self::with_null_value(name, depth, values, DEFAULT_NULL_VALUE)
    }

    /// Like [`Property::new`] with an explicit null sentinel.
    pub fn with_null_value(
        name: &str,
        depth: Vec<f64>,
        mut values: Vec<f64>,
        null_value: f64,
    ) -> Result<Self> {
        if depth.len() != values.len() {
            return Err(WellLogError::InvalidArgument(format!(
                "property '{name}': depth has {} samples but values has {}",
                depth.len(),
                values.len()
            )));
        }
        normalize_nulls(&mut values, null_value);
        Ok(Self {
            name: sanitize_property_name(name),
            original_name: name.to_string(),
            depth,
            values,
            unit: String::new(),
            description: String::new(),
            kind: PropertyKind::Continuous,
            labels: None,
            source: None,
            secondary: Vec::new(),
            parent: None,
        })
    }

    /// Property for one curve of an ingested table.
    pub(crate) fn from_curve(
        curve: &Curve,
        depth: &[f64],
        null_value: f64,
        kind: PropertyKind,
        labels: Option<Labels>,
        source: &str,
    ) -> Result<Self> {
        let mut prop =
            Self::with_null_value(&curve.name, depth.to_vec(), curve.values.clone(), null_value)?;
        prop.unit = curve.unit.clone();
        prop.description = curve.description.clone();
        prop.kind = kind;
        prop.labels = labels;
        prop.source = Some(source.to_string());
        Ok(prop)
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_kind(mut self, kind: PropertyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    // -- accessors --

    /// Sanitised name used for lookups and dictionary keys.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name as it appeared in the source, used when exporting.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn depth(&self) -> &[f64] {
        &self.depth
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    pub fn labels(&self) -> Option<&Labels> {
        self.labels.as_ref()
    }

    /// Source this property was ingested from (file stem or table name).
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Attached filter dimensions, in the order they were added.
    pub fn secondary_properties(&self) -> &[Property] {
        &self.secondary
    }

    /// Owning well, if it is still alive.
    pub fn parent_well(&self) -> Option<Rc<RefCell<Well>>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn len(&self) -> usize {
        self.depth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depth.is_empty()
    }

    // -- mutation by the owning collaborator --

    pub fn set_kind(&mut self, kind: PropertyKind) {
        self.kind = kind;
    }

    pub fn set_labels(&mut self, labels: Option<Labels>) {
        self.labels = labels;
    }

    pub fn set_unit(&mut self, unit: impl Into<String>) {
        self.unit = unit.into();
    }

    pub(crate) fn set_parent(&mut self, parent: Weak<RefCell<Well>>) {
        self.parent = Some(parent);
    }

    /// Move onto `depth` by resampling with the method for this kind.
    pub(crate) fn resampled_values(&self, depth: &[f64]) -> Result<Vec<f64>> {
        resample_to_grid(&self.depth, &self.values, depth, Method::for_kind(&self.kind))
    }

    /// Replace the series with values already resampled onto `depth`.
    pub(crate) fn replace_series(&mut self, depth: &[f64], values: Vec<f64>) {
        self.depth = depth.to_vec();
        self.values = values;
    }

    // ---------------------------------------------------------------------------
    // Filtering
    // ---------------------------------------------------------------------------

    /// Attach the discrete property `name` from the parent well as a new
    /// filter dimension.
    ///
    /// The filter is resampled onto this property's depth grid with
    /// nearest-neighbour, so the grid and values here are untouched. Returns
    /// a new property; `self` is not modified, so chains can branch freely.
    ///
    /// The name is looked up in this property's own source first, then across
    /// the well.
    pub fn filter(&self, name: &str) -> Result<Property> {
        let well = self.parent_well().ok_or_else(|| {
            WellLogError::PropertyNotFound(format!(
                "cannot filter property '{}': no parent well reference",
                self.name
            ))
        })?;
        let well = well.try_borrow().map_err(|_| {
            WellLogError::Well(format!(
                "cannot filter property '{}': its well is being modified",
                self.name
            ))
        })?;

        let discrete = well.resolve_filter(name, self.source())?;
        if discrete.kind != PropertyKind::Discrete {
            return Err(WellLogError::PropertyType(format!(
                "property '{}' must be discrete to be used as a filter, got '{}'",
                discrete.name, discrete.kind
            )));
        }

        let codes = resample_to_grid(&discrete.depth, &discrete.values, &self.depth, Method::Nearest)?;
        debug!(
            "filter '{}' by '{}' ({} secondaries after)",
            self.name,
            discrete.name,
            self.secondary.len() + 1
        );

        let mut attached = discrete.clone();
        attached.depth = self.depth.clone();
        attached.values = codes;
        attached.secondary = Vec::new();

        let mut filtered = self.clone();
        filtered.secondary.push(attached);
        Ok(filtered)
    }

    // ---------------------------------------------------------------------------
    // Grouped statistics
    // ---------------------------------------------------------------------------

    /// Group by every secondary property in order and evaluate `leaf` on each
    /// final sample mask.
    pub fn group_with<T>(&self, leaf: impl FnMut(&[bool]) -> T) -> StatsNode<T> {
        let dims: Vec<Dimension<'_>> = self
            .secondary
            .iter()
            .map(|s| Dimension {
                name: &s.name,
                values: &s.values,
                labels: s.labels.as_ref(),
            })
            .collect();
        group_by(&dims, vec![true; self.len()], leaf)
    }

    /// Sums and averages per filter group.
    ///
    /// Without filters this is a single leaf over every sample. With filters
    /// the tree nests one level per filter, keyed by label (or
    /// `{filter}_{code}`).
    pub fn sums_avg(&self) -> StatsNode<GroupStats> {
        self.group_with(|mask| GroupStats::from_mask(&self.values, &self.depth, mask))
    }

    /// Full statistics bundle per filter group. Interval weights come from the
    /// whole depth grid, so each sample keeps its own thickness.
    pub fn statistics(&self) -> StatsNode<Statistics> {
        let intervals = compute_intervals(&self.depth);
        self.group_with(|mask| summarize(&select(&self.values, mask), &select(&intervals, mask)))
    }

    /// One statistic per filter group.
    pub fn statistic(&self, stat: Statistic, weighted: bool) -> StatsNode<f64> {
        let intervals = compute_intervals(&self.depth);
        self.group_with(|mask| {
            stat.evaluate(&select(&self.values, mask), &select(&intervals, mask), weighted)
        })
    }

    // ---------------------------------------------------------------------------
    // Tabular export
    // ---------------------------------------------------------------------------

    /// Cells for `values` (this property's, or a resampled copy), label-mapped
    /// when asked and possible.
    pub(crate) fn cells(&self, values: &[f64], discrete_labels: bool) -> Vec<Cell> {
        match (&self.labels, discrete_labels) {
            (Some(labels), true) => values
                .iter()
                .map(|&v| {
                    if v.is_nan() {
                        return Cell::Null;
                    }
                    let code = v as i64;
                    labels
                        .get(&code)
                        .map_or(Cell::Integer(code), |l| Cell::Label(l.clone()))
                })
                .collect(),
            _ => values.iter().map(|&v| Cell::number(v)).collect(),
        }
    }

    /// DEPT, this property, and each filter as columns.
    pub fn to_frame(&self, discrete_labels: bool) -> Frame {
        let mut frame = Frame::new();
        frame.push_numeric("DEPT", &self.depth);
        frame.push_column(self.name.clone(), self.cells(&self.values, discrete_labels));
        for sec in &self.secondary {
            frame.push_column(sec.name.clone(), sec.cells(&sec.values, discrete_labels));
        }
        frame
    }

    /// Write this property and its filters through `writer`.
    ///
    /// Columns are keyed by original names and carry numeric codes; labels go
    /// into the payload's side-channel when `store_labels` is set. The well
    /// name defaults to the parent well's, then `UNKNOWN`.
    pub fn export(
        &self,
        writer: &mut dyn LogWriter,
        well_name: Option<&str>,
        store_labels: bool,
        null_value: f64,
    ) -> Result<()> {
        let well_name = match well_name {
            Some(name) => name.to_string(),
            None => self
                .parent_well()
                .and_then(|w| w.try_borrow().ok().map(|w| w.name().to_string()))
                .unwrap_or_else(|| "UNKNOWN".to_string()),
        };

        let mut frame = self.to_frame(false);
        let mut units = BTreeMap::from([("DEPT".to_string(), "m".to_string())]);
        let mut kinds = BTreeMap::new();
        let mut labels = BTreeMap::new();

        for prop in std::iter::once(self).chain(&self.secondary) {
            frame.rename(&prop.name, &prop.original_name);
            units.insert(prop.original_name.clone(), prop.unit.clone());
            kinds.insert(prop.original_name.clone(), prop.kind.to_string());
            if let (true, Some(l)) = (store_labels, &prop.labels) {
                labels.insert(prop.original_name.clone(), l.clone());
            }
        }

        writer.write_log(&LogPayload {
            well_name,
            frame,
            units,
            kinds,
            labels,
            null_value,
        })?;
        Ok(())
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Property('{}', samples={}, type='{}'",
            self.name,
            self.len(),
            self.kind
        )?;
        if !self.secondary.is_empty() {
            write!(f, ", filters={}", self.secondary.len())?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::CurveTable;
    use crate::well::Well;
    use pretty_assertions::assert_eq;

    struct Recorder(Vec<LogPayload>);

    impl LogWriter for Recorder {
        fn write_log(&mut self, payload: &LogPayload) -> anyhow::Result<()> {
            self.0.push(payload.clone());
            Ok(())
        }
    }

    /// Well with PHIE, a labelled Zone and an unlabelled NTG on one grid.
    fn sample_well() -> Rc<RefCell<Well>> {
        let depth: Vec<f64> = (0..8).map(|i| 2000.0 + i as f64 * 0.5).collect();
        let table = CurveTable::new("DEPT", depth)
            .with_well_name("W-1")
            .with_curve(Curve::new("PHIE", vec![0.10, 0.12, 0.20, 0.22, 0.30, 0.32, 0.40, -999.25]))
            .with_curve(Curve::new("Zone", vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]).with_kind(PropertyKind::Discrete))
            .with_curve(Curve::new("NTG", vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0]).with_kind(PropertyKind::Discrete))
            .with_curve(Curve::new("SW", vec![0.5; 8]))
            .with_labels("Zone", Labels::from([(0, "Upper".to_string()), (1, "Lower".to_string())]));
        let well = Well::new("W-1");
        well.borrow_mut().add_source("log", table, None).unwrap();
        well
    }

    #[test]
    fn null_sentinel_becomes_nan() {
        let prop = Property::new("PHIE", vec![1.0, 2.0], vec![-999.25, 0.2]).unwrap();
        assert!(prop.values()[0].is_nan());
        assert_eq!(prop.values()[1], 0.2);

        let custom = Property::with_null_value("X", vec![1.0], vec![-1.0], -1.0).unwrap();
        assert!(custom.values()[0].is_nan());
    }

    #[test]
    fn names_are_sanitised_but_originals_kept() {
        let prop = Property::new("NTG Flag", vec![1.0], vec![1.0]).unwrap();
        assert_eq!(prop.name(), "NTG_Flag");
        assert_eq!(prop.original_name(), "NTG Flag");
    }

    #[test]
    fn length_mismatch_is_rejected() {
        assert!(Property::new("X", vec![1.0, 2.0], vec![1.0]).is_err());
    }

    #[test]
    fn filter_without_parent_fails() {
        let prop = Property::new("PHIE", vec![1.0], vec![0.2]).unwrap();
        let err = prop.filter("Zone").unwrap_err();
        assert!(matches!(err, WellLogError::PropertyNotFound(_)));
    }

    #[test]
    fn filter_by_missing_property_lists_available() {
        let well = sample_well();
        let well = well.borrow();
        let err = well.get_property("PHIE").unwrap().filter("Facies").unwrap_err();
        match err {
            WellLogError::PropertyNotFound(msg) => assert!(msg.contains("Zone"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn filter_by_continuous_property_is_a_type_error() {
        let well = sample_well();
        let well = well.borrow();
        let err = well.get_property("PHIE").unwrap().filter("SW").unwrap_err();
        assert!(matches!(err, WellLogError::PropertyType(_)));
    }

    #[test]
    fn filter_keeps_grid_and_original() {
        let well = sample_well();
        let well = well.borrow();
        let phie = well.get_property("PHIE").unwrap();
        let filtered = phie.filter("Zone").unwrap();
        let twice = filtered.filter("NTG").unwrap();

        assert_eq!(phie.secondary_properties().len(), 0);
        assert_eq!(filtered.secondary_properties().len(), 1);
        assert_eq!(twice.secondary_properties().len(), 2);
        assert_eq!(twice.depth(), phie.depth());
        for sec in twice.secondary_properties() {
            assert_eq!(sec.depth(), phie.depth());
        }
        assert_eq!(twice.secondary_properties()[0].labels().unwrap()[&1], "Lower");
    }

    #[test]
    fn filter_resamples_onto_caller_grid() {
        let well = sample_well();
        let mut core = Property::new("CPOR", vec![2000.2, 2002.9], vec![0.15, 0.35])
            .unwrap()
            .with_source("log");
        core.set_parent(Rc::downgrade(&well));
        let filtered = core.filter("Zone").unwrap();
        assert_eq!(filtered.secondary_properties()[0].values(), &[0.0, 1.0]);
    }

    #[test]
    fn sums_avg_without_filters_is_flat() {
        let well = sample_well();
        let well = well.borrow();
        let stats = well.get_property("PHIE").unwrap().sums_avg();
        let leaf = stats.leaf().expect("flat statistics");
        assert_eq!(leaf.count, 7);
        assert_eq!(leaf.depth_samples, 8);
        assert!((leaf.depth_thickness - 3.5).abs() < 1e-12);
        assert!((leaf.min - 0.10).abs() < 1e-12);
        assert!((leaf.max - 0.40).abs() < 1e-12);
    }

    #[test]
    fn sums_avg_nests_by_label_then_code() {
        let well = sample_well();
        let well = well.borrow();
        let stats = well
            .get_property("PHIE")
            .unwrap()
            .filter("Zone")
            .unwrap()
            .filter("NTG")
            .unwrap()
            .sums_avg();

        assert_eq!(stats.keys(), vec!["Upper", "Lower"]);
        assert_eq!(stats.get("Upper").unwrap().keys(), vec!["NTG_0", "NTG_1"]);
        let upper_net = stats.at(&["Upper", "NTG_1"]).unwrap().leaf().unwrap();
        assert!((upper_net.mean - 0.21).abs() < 1e-9);
        assert_eq!(upper_net.count, 2);
        let lower_net = stats.at(&["Lower", "NTG_1"]).unwrap().leaf().unwrap();
        assert_eq!(lower_net.count, 1);
        assert_eq!(lower_net.depth_samples, 2);
    }

    #[test]
    fn statistic_tree_uses_full_grid_weights() {
        let well = sample_well();
        let well = well.borrow();
        let zone = well.get_property("PHIE").unwrap().filter("Zone").unwrap();
        let sums = zone.statistic(Statistic::Sum, true);
        // Upper: first sample owns 0.25 m, the rest 0.5 m each.
        let upper = *sums.get("Upper").unwrap().leaf().unwrap();
        assert!((upper - (0.10 * 0.25 + 0.12 * 0.5 + 0.20 * 0.5 + 0.22 * 0.5)).abs() < 1e-12);

        let bundle = zone.statistics();
        assert_eq!(bundle.get("Lower").unwrap().leaf().unwrap().count, 3);
    }

    #[test]
    fn frame_applies_labels_on_request() {
        let well = sample_well();
        let well = well.borrow();
        let filtered = well.get_property("PHIE").unwrap().filter("Zone").unwrap();

        let labelled = filtered.to_frame(true);
        assert_eq!(labelled.column_names(), vec!["DEPT", "PHIE", "Zone"]);
        assert_eq!(labelled.column("Zone").unwrap().cells[0], Cell::Label("Upper".into()));
        assert_eq!(labelled.column("PHIE").unwrap().cells[7], Cell::Null);

        let numeric = filtered.to_frame(false);
        assert_eq!(numeric.column("Zone").unwrap().cells[0], Cell::Float(0.0));
    }

    #[test]
    fn export_uses_original_names_and_label_side_channel() {
        let well = sample_well();
        let well = well.borrow();
        let filtered = well.get_property("PHIE").unwrap().filter("Zone").unwrap();
        let mut recorder = Recorder(Vec::new());
        filtered.export(&mut recorder, None, true, -999.25).unwrap();

        let payload = &recorder.0[0];
        assert_eq!(payload.well_name, "W-1");
        assert_eq!(payload.frame.column_names(), vec!["DEPT", "PHIE", "Zone"]);
        assert_eq!(payload.units["DEPT"], "m");
        assert_eq!(payload.kinds["Zone"], "discrete");
        assert!(payload.labels.contains_key("Zone"));
        assert!(payload
            .frame
            .columns
            .iter()
            .flat_map(|c| &c.cells)
            .all(|c| !matches!(c, Cell::Label(_))));
    }

    #[test]
    fn display_mentions_filters() {
        let prop = Property::new("PHIE", vec![1.0, 2.0], vec![0.1, 0.2]).unwrap();
        assert_eq!(prop.to_string(), "Property('PHIE', samples=2, type='continuous')");
    }
}
