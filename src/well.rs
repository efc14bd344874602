//! A well: named sources of properties, resolved by name across sources.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use log::{info, warn};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::data::export::{LogPayload, LogWriter};
use crate::data::loader;
use crate::data::model::{CurveTable, Frame, DEFAULT_NULL_VALUE};
use crate::error::{list_or_none, Result, WellLogError};
use crate::group::StatsNode;
use crate::naming::{sanitize_property_name, sanitize_well_name, well_key};
use crate::property::{Property, PropertyKind};
use crate::resample::{regular_grid, resample_to_grid, Method, FALLBACK_STEP};

/// Wells are shared between the manager and the properties that point back
/// at them.
pub type SharedWell = Rc<RefCell<Well>>;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Target grid for [`Well::resample`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResampleGrid {
    Explicit(Vec<f64>),
    /// `step` spacing over `range`, or over the union of all property depths.
    Regular {
        step: f64,
        range: Option<(f64, f64)>,
    },
}

impl Default for ResampleGrid {
    fn default() -> Self {
        ResampleGrid::Regular {
            step: FALLBACK_STEP,
            range: None,
        }
    }
}

/// Options for [`Well::to_frame`].
#[derive(Debug, Clone)]
pub struct FrameOptions {
    /// Property whose grid is the frame's depth column; first inserted when unset.
    pub reference: Option<String>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    /// Move every column onto the reference grid instead of requiring a match.
    pub auto_resample: bool,
    pub discrete_labels: bool,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            reference: None,
            include: None,
            exclude: None,
            auto_resample: true,
            discrete_labels: true,
        }
    }
}

/// Options for [`Well::export`].
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    /// Put discrete label maps into the payload side-channel.
    pub store_labels: bool,
    pub null_value: f64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include: None,
            exclude: None,
            store_labels: true,
            null_value: DEFAULT_NULL_VALUE,
        }
    }
}

/// Options for [`Well::property_stats`].
#[derive(Debug, Clone, Default)]
pub struct StatOptions {
    /// Always key results by source, even when the name is unique.
    pub nested: bool,
    /// Ignore filters this well does not have instead of failing.
    pub skip_missing_filters: bool,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Source name for a file: its stem with separators replaced by `_`.
pub(crate) fn file_source_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Read a log file, reporting a missing depth column as a well error.
pub(crate) fn load_table(path: &Path) -> Result<CurveTable> {
    loader::load_file(path).map_err(|e| match e.downcast_ref::<loader::MissingDepthColumn>() {
        Some(missing) => WellLogError::Well(format!("{}: {missing}", path.display())),
        None => WellLogError::Load(e),
    })
}

/// One ingested table: a file or an in-memory table.
#[derive(Debug, Clone)]
pub struct Source {
    name: String,
    path: Option<PathBuf>,
    properties: Vec<Property>,
}

impl Source {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the source was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        let key = sanitize_property_name(name);
        self.properties.iter().find(|p| p.name() == key)
    }

    fn position(&self, name: &str) -> Option<usize> {
        let key = sanitize_property_name(name);
        self.properties.iter().position(|p| p.name() == key)
    }
}

// ---------------------------------------------------------------------------
// Results keyed by source
// ---------------------------------------------------------------------------

/// Statistics for one well: a bare tree when the property name is unique,
/// otherwise one tree per source that has it.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceResult<T> {
    Direct(StatsNode<T>),
    BySource(Vec<(String, StatsNode<T>)>),
}

impl<T> SourceResult<T> {
    pub fn direct(&self) -> Option<&StatsNode<T>> {
        match self {
            SourceResult::Direct(node) => Some(node),
            SourceResult::BySource(_) => None,
        }
    }

    pub fn source(&self, name: &str) -> Option<&StatsNode<T>> {
        match self {
            SourceResult::Direct(_) => None,
            SourceResult::BySource(trees) => {
                trees.iter().find(|(s, _)| s == name).map(|(_, n)| n)
            }
        }
    }
}

impl<T: Serialize> Serialize for SourceResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SourceResult::Direct(node) => node.serialize(serializer),
            SourceResult::BySource(trees) => {
                let mut map = serializer.serialize_map(Some(trees.len()))?;
                for (source, node) in trees {
                    map.serialize_entry(source, node)?;
                }
                map.end()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Well
// ---------------------------------------------------------------------------

/// One selected frame column.
struct FrameColumn<'a> {
    key: String,
    source: &'a Source,
    property: &'a Property,
    values: Vec<f64>,
}

#[derive(Debug)]
pub struct Well {
    name: String,
    sanitized_name: String,
    sources: Vec<Source>,
    external_count: usize,
    self_ref: Weak<RefCell<Well>>,
}

impl Well {
    /// Create an empty well. Properties added later point back at it.
    pub fn new(name: &str) -> SharedWell {
        Rc::new_cyclic(|weak| {
            RefCell::new(Well {
                name: name.to_string(),
                sanitized_name: sanitize_well_name(name),
                sources: Vec::new(),
                external_count: 0,
                self_ref: weak.clone(),
            })
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sanitized_name(&self) -> &str {
        &self.sanitized_name
    }

    /// Registry key, `well_{sanitized}`.
    pub fn key(&self) -> String {
        well_key(&self.name)
    }

    // ---------------------------------------------------------------------------
    // Ingestion
    // ---------------------------------------------------------------------------

    /// Add every curve of `table` as a property of source `name`.
    ///
    /// A source with the same name is replaced in place. Fails when the
    /// table names a different well or has no depth samples.
    pub fn add_source(&mut self, name: &str, table: CurveTable, path: Option<&Path>) -> Result<()> {
        if let Some(table_well) = &table.well_name {
            if sanitize_well_name(table_well) != self.sanitized_name {
                return Err(WellLogError::WellNameMismatch(format!(
                    "cannot load data for well '{table_well}' into well '{}'",
                    self.name
                )));
            }
        }
        if table.depth.is_empty() {
            return Err(WellLogError::Well(format!(
                "source '{name}' has no samples in depth column '{}'",
                table.depth_column
            )));
        }
        if let Some(i) = table.depth.iter().position(|d| !d.is_finite()) {
            return Err(WellLogError::Well(format!(
                "source '{name}': depth column '{}' has a missing or non-finite value at row {i}",
                table.depth_column
            )));
        }

        let mut properties: Vec<Property> = Vec::with_capacity(table.curves.len());
        for curve in &table.curves {
            let kind = if table.is_discrete(curve) {
                PropertyKind::Discrete
            } else {
                curve.kind.clone()
            };
            let labels = table.labels.get(&curve.name).cloned();
            let mut prop =
                Property::from_curve(curve, &table.depth, table.null_value, kind, labels, name)?;
            prop.set_parent(self.self_ref.clone());

            match properties.iter_mut().find(|p| p.name() == prop.name()) {
                Some(existing) => {
                    warn!(
                        "source '{name}': curve '{}' collides with an earlier curve after sanitising, keeping the last",
                        curve.name
                    );
                    *existing = prop;
                }
                None => properties.push(prop),
            }
        }

        info!(
            "well '{}': source '{name}' with {} properties over {} samples",
            self.name,
            properties.len(),
            table.depth.len()
        );

        let source = Source {
            name: name.to_string(),
            path: path.map(Path::to_path_buf),
            properties,
        };
        match self.sources.iter_mut().find(|s| s.name == name) {
            Some(existing) => {
                warn!("well '{}': overwriting existing source '{name}'", self.name);
                *existing = source;
            }
            None => self.sources.push(source),
        }
        Ok(())
    }

    /// Add an in-memory table as `external_df`, `external_df1`, ...
    /// Returns the source name used.
    pub fn add_table(&mut self, table: CurveTable) -> Result<String> {
        let name = match self.external_count {
            0 => "external_df".to_string(),
            n => format!("external_df{n}"),
        };
        self.add_source(&name, table, None)?;
        self.external_count += 1;
        Ok(name)
    }

    /// Load a log file as a source named after its (sanitised) file stem.
    pub fn load_file(&mut self, path: &Path) -> Result<String> {
        let table = load_table(path)?;
        let name = file_source_name(path);
        self.add_source(&name, table, Some(path))?;
        Ok(name)
    }

    pub fn remove_source(&mut self, name: &str) -> Result<Source> {
        match self.sources.iter().position(|s| s.name == name) {
            Some(idx) => Ok(self.sources.remove(idx)),
            None => Err(WellLogError::Well(format!(
                "well '{}' has no source '{name}'; sources: {}",
                self.name,
                list_or_none(&self.source_names())
            ))),
        }
    }

    // ---------------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------------

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn source(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name.as_str()).collect()
    }

    /// Distinct property names in insertion order.
    pub fn properties(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for prop in self.sources.iter().flat_map(|s| &s.properties) {
            if !names.contains(&prop.name()) {
                names.push(prop.name());
            }
        }
        names
    }

    /// Indices of (source, property) pairs carrying `name`.
    fn locate(&self, name: &str) -> Vec<(usize, usize)> {
        self.sources
            .iter()
            .enumerate()
            .filter_map(|(si, s)| s.position(name).map(|pi| (si, pi)))
            .collect()
    }

    pub fn has_property(&self, name: &str) -> bool {
        !self.locate(name).is_empty()
    }

    /// Whether `name` exists in more than one source.
    pub fn is_ambiguous(&self, name: &str) -> bool {
        self.locate(name).len() > 1
    }

    fn locate_unique(&self, name: &str) -> Result<(usize, usize)> {
        match self.locate(name).as_slice() {
            [] => Err(WellLogError::PropertyNotFound(format!(
                "property '{name}' not found in well '{}'; available: {}",
                self.name,
                list_or_none(&self.properties())
            ))),
            [single] => Ok(*single),
            several => {
                let sources: Vec<&str> = several
                    .iter()
                    .map(|&(si, _)| self.sources[si].name.as_str())
                    .collect();
                Err(WellLogError::AmbiguousProperty(format!(
                    "property '{name}' exists in several sources of well '{}': {}; \
                     use get_source_property to pick one",
                    self.name,
                    sources.join(", ")
                )))
            }
        }
    }

    /// Property by sanitised or display name, when exactly one source has it.
    pub fn get_property(&self, name: &str) -> Result<&Property> {
        let (si, pi) = self.locate_unique(name)?;
        Ok(&self.sources[si].properties[pi])
    }

    pub fn get_property_mut(&mut self, name: &str) -> Result<&mut Property> {
        let (si, pi) = self.locate_unique(name)?;
        Ok(&mut self.sources[si].properties[pi])
    }

    fn locate_in_source(&self, source: &str, name: &str) -> Result<(usize, usize)> {
        let si = self.sources.iter().position(|s| s.name == source).ok_or_else(|| {
            WellLogError::PropertyNotFound(format!(
                "well '{}' has no source '{source}'; sources: {}",
                self.name,
                list_or_none(&self.source_names())
            ))
        })?;
        let src = &self.sources[si];
        let pi = src.position(name).ok_or_else(|| {
            let names: Vec<&str> = src.properties.iter().map(Property::name).collect();
            WellLogError::PropertyNotFound(format!(
                "property '{name}' not found in source '{source}' of well '{}'; available: {}",
                self.name,
                list_or_none(&names)
            ))
        })?;
        Ok((si, pi))
    }

    pub fn get_source_property(&self, source: &str, name: &str) -> Result<&Property> {
        let (si, pi) = self.locate_in_source(source, name)?;
        Ok(&self.sources[si].properties[pi])
    }

    pub fn get_source_property_mut(&mut self, source: &str, name: &str) -> Result<&mut Property> {
        let (si, pi) = self.locate_in_source(source, name)?;
        Ok(&mut self.sources[si].properties[pi])
    }

    /// Filter lookup: the caller's own source first, then a well-unique match.
    pub(crate) fn resolve_filter(&self, name: &str, prefer_source: Option<&str>) -> Result<&Property> {
        if let Some(prop) = prefer_source
            .and_then(|s| self.source(s))
            .and_then(|s| s.property(name))
        {
            return Ok(prop);
        }
        self.get_property(name)
    }

    /// Property by frame column key: a plain name, or `{source}.{name}`.
    fn column_property(&self, key: &str) -> Result<&Property> {
        if let Some((source, name)) = key.split_once('.') {
            if let Ok(prop) = self.get_source_property(source, name) {
                return Ok(prop);
            }
        }
        self.get_property(key)
    }

    // ---------------------------------------------------------------------------
    // Resampling and tabular output
    // ---------------------------------------------------------------------------

    /// Move every property onto one grid and return it.
    ///
    /// Continuous logs are interpolated linearly, every other kind takes the
    /// nearest sample. Needs a mutable borrow, so no property of this well may
    /// be mid-filter.
    pub fn resample(&mut self, grid: ResampleGrid) -> Result<Vec<f64>> {
        let all: Vec<&Property> = self.sources.iter().flat_map(|s| &s.properties).collect();
        if all.is_empty() {
            return Err(WellLogError::Well(format!(
                "well '{}' has no properties to resample",
                self.name
            )));
        }

        let grid = match grid {
            ResampleGrid::Explicit(depth) => depth,
            ResampleGrid::Regular { step, range } => {
                let (lo, hi) = match range {
                    Some(range) => range,
                    None => all
                        .iter()
                        .flat_map(|p| p.depth().iter().copied())
                        .filter(|d| d.is_finite())
                        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| {
                            (lo.min(d), hi.max(d))
                        }),
                };
                regular_grid(lo, hi + step / 2.0, step)?
            }
        };

        // All or nothing: a failure leaves every property on its old grid.
        let resampled = all
            .iter()
            .map(|p| p.resampled_values(&grid))
            .collect::<Result<Vec<_>>>()?;
        let props = self.sources.iter_mut().flat_map(|s| s.properties.iter_mut());
        for (prop, values) in props.zip(resampled) {
            prop.replace_series(&grid, values);
        }
        info!("well '{}': resampled onto {} depths", self.name, grid.len());
        Ok(grid)
    }

    /// Column key for a property: its name, or `{source}.{name}` when the
    /// name is ambiguous in this well.
    fn column_key(&self, source: &Source, prop: &Property) -> String {
        if self.is_ambiguous(prop.name()) {
            format!("{}.{}", source.name, prop.name())
        } else {
            prop.name().to_string()
        }
    }

    fn frame_columns(&self, options: &FrameOptions) -> Result<Option<(Vec<f64>, Vec<FrameColumn<'_>>)>> {
        if options.include.is_some() && options.exclude.is_some() {
            return Err(WellLogError::InvalidArgument(
                "include and exclude cannot be used together".to_string(),
            ));
        }

        let entries: Vec<(&Source, &Property)> = self
            .sources
            .iter()
            .flat_map(|s| s.properties.iter().map(move |p| (s, p)))
            .collect();
        let Some(&(_, first)) = entries.first() else {
            return Ok(None);
        };
        let reference = match &options.reference {
            Some(name) => self.column_property(name)?,
            None => first,
        };
        let depth = reference.depth().to_vec();

        let keyed: Vec<(String, &Source, &Property)> = entries
            .into_iter()
            .map(|(s, p)| (self.column_key(s, p), s, p))
            .collect();
        let matches = |wanted: &str, key: &str, prop: &Property| {
            wanted == key || sanitize_property_name(wanted) == prop.name()
        };

        let selected: Vec<(String, &Source, &Property)> = match (&options.include, &options.exclude) {
            (Some(include), _) => {
                let missing: Vec<&str> = include
                    .iter()
                    .filter(|w| !keyed.iter().any(|(k, _, p)| matches(w, k, p)))
                    .map(String::as_str)
                    .collect();
                if !missing.is_empty() {
                    let available: Vec<&str> = keyed.iter().map(|(k, _, _)| k.as_str()).collect();
                    return Err(WellLogError::PropertyNotFound(format!(
                        "properties not found in well '{}': {}; available: {}",
                        self.name,
                        missing.join(", "),
                        list_or_none(&available)
                    )));
                }
                keyed
                    .into_iter()
                    .filter(|(k, _, p)| include.iter().any(|w| matches(w, k, p)))
                    .collect()
            }
            (None, Some(exclude)) => keyed
                .into_iter()
                .filter(|(k, _, p)| !exclude.iter().any(|w| matches(w, k, p)))
                .collect(),
            (None, None) => keyed,
        };

        let mut columns = Vec::with_capacity(selected.len());
        for (key, source, prop) in selected {
            let values = if prop.depth() == depth.as_slice() {
                prop.values().to_vec()
            } else if options.auto_resample {
                resample_to_grid(prop.depth(), prop.values(), &depth, Method::for_kind(prop.kind()))?
            } else {
                return Err(WellLogError::Well(format!(
                    "property '{key}' is on a different depth grid than the reference; \
                     enable auto_resample or call resample first"
                )));
            };
            columns.push(FrameColumn {
                key,
                source,
                property: prop,
                values,
            });
        }
        Ok(Some((depth, columns)))
    }

    /// All (or the selected) properties as columns on the reference grid.
    ///
    /// Resampling for the frame leaves the stored properties untouched. An
    /// empty well gives an empty frame.
    pub fn to_frame(&self, options: &FrameOptions) -> Result<Frame> {
        let Some((depth, columns)) = self.frame_columns(options)? else {
            return Ok(Frame::new());
        };
        let mut frame = Frame::new();
        frame.push_numeric("DEPT", &depth);
        for col in columns {
            let cells = col.property.cells(&col.values, options.discrete_labels);
            frame.push_column(col.key, cells);
        }
        Ok(frame)
    }

    /// Numeric frame keyed by original curve names, with units and labels,
    /// handed to `writer`.
    pub fn export(&self, writer: &mut dyn LogWriter, options: &ExportOptions) -> Result<()> {
        let frame_options = FrameOptions {
            reference: None,
            include: options.include.clone(),
            exclude: options.exclude.clone(),
            auto_resample: true,
            discrete_labels: false,
        };
        let Some((depth, columns)) = self.frame_columns(&frame_options)? else {
            return Err(WellLogError::Well(format!(
                "well '{}' has no properties to export",
                self.name
            )));
        };

        let mut frame = Frame::new();
        frame.push_numeric("DEPT", &depth);
        let mut units = BTreeMap::from([("DEPT".to_string(), "m".to_string())]);
        let mut kinds = BTreeMap::new();
        let mut labels = BTreeMap::new();
        for col in &columns {
            let prop = col.property;
            let name = if self.is_ambiguous(prop.name()) {
                format!("{}.{}", col.source.name, prop.original_name())
            } else {
                prop.original_name().to_string()
            };
            frame.push_numeric(name.clone(), &col.values);
            units.insert(name.clone(), prop.unit().to_string());
            kinds.insert(name.clone(), prop.kind().to_string());
            if let (true, Some(l)) = (options.store_labels, prop.labels()) {
                labels.insert(name, l.clone());
            }
        }

        writer.write_log(&LogPayload {
            well_name: self.name.clone(),
            frame,
            units,
            kinds,
            labels,
            null_value: options.null_value,
        })?;
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Source-aware statistics
    // ---------------------------------------------------------------------------

    /// Filter `name` by `filters` in every source that has it and evaluate
    /// `leaf` on each filtered property.
    ///
    /// A unique name gives [`SourceResult::Direct`] unless `nested` is set;
    /// an ambiguous one always gives [`SourceResult::BySource`].
    pub fn property_stats<T>(
        &self,
        name: &str,
        filters: &[String],
        options: &StatOptions,
        leaf: impl Fn(&Property) -> StatsNode<T>,
    ) -> Result<SourceResult<T>> {
        let found = self.locate(name);
        if found.is_empty() {
            return Err(WellLogError::PropertyNotFound(format!(
                "property '{name}' not found in well '{}'; available: {}",
                self.name,
                list_or_none(&self.properties())
            )));
        }

        let mut trees = Vec::with_capacity(found.len());
        for &(si, pi) in &found {
            let mut prop = self.sources[si].properties[pi].clone();
            for filter in filters {
                match prop.filter(filter) {
                    Ok(filtered) => prop = filtered,
                    Err(WellLogError::PropertyNotFound(msg)) if options.skip_missing_filters => {
                        warn!("well '{}': skipping filter '{filter}': {msg}", self.name);
                    }
                    Err(e) => return Err(e),
                }
            }
            trees.push((self.sources[si].name.clone(), leaf(&prop)));
        }

        if trees.len() == 1 && !options.nested {
            if let Some((_, tree)) = trees.pop() {
                return Ok(SourceResult::Direct(tree));
            }
        }
        Ok(SourceResult::BySource(trees))
    }
}

impl fmt::Display for Well {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Well('{}', sources={}, properties={})",
            self.name,
            self.sources.len(),
            self.properties().len()
        )
    }
}
