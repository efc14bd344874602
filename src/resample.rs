//! Depth alignment: moving a series onto another depth grid.

use std::fmt;
use std::str::FromStr;

use log::debug;

use crate::error::{Result, WellLogError};
use crate::property::{Property, PropertyKind};

/// Spacing used by [`align_depths`] when a property has fewer than two samples.
pub const FALLBACK_STEP: f64 = 0.1;

// ---------------------------------------------------------------------------
// Interpolation method
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Piecewise linear between bracketing samples (continuous logs).
    Linear,
    /// Value of the closest sample (discrete codes, never blended).
    Nearest,
}

impl Method {
    /// Method appropriate for a property kind: only continuous logs are blended.
    pub fn for_kind(kind: &PropertyKind) -> Self {
        match kind {
            PropertyKind::Continuous => Method::Linear,
            _ => Method::Nearest,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Linear => write!(f, "linear"),
            Method::Nearest => write!(f, "nearest"),
        }
    }
}

impl FromStr for Method {
    type Err = WellLogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(Method::Linear),
            "nearest" => Ok(Method::Nearest),
            other => Err(WellLogError::InvalidArgument(format!(
                "unknown interpolation method '{other}' (expected linear or nearest)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Interpolator
// ---------------------------------------------------------------------------

/// Interpolator over the valid (non-NaN) samples of a series, sorted by depth.
struct Interpolator {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Midpoints between consecutive samples, the nearest-neighbour boundaries.
    mids: Vec<f64>,
    method: Method,
}

impl Interpolator {
    fn new(depth: &[f64], values: &[f64], method: Method) -> Result<Self> {
        if depth.len() != values.len() {
            return Err(WellLogError::DepthAlignment(format!(
                "depth has {} samples but values has {}",
                depth.len(),
                values.len()
            )));
        }

        let mut points: Vec<(f64, f64)> = depth
            .iter()
            .zip(values)
            .filter(|(_, v)| !v.is_nan())
            .map(|(&d, &v)| (d, v))
            .collect();

        if points.iter().any(|(d, _)| !d.is_finite()) {
            return Err(WellLogError::DepthAlignment(
                "source depth contains non-finite values".to_string(),
            ));
        }

        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        // A single point cannot carry a line.
        let method = if points.len() == 1 { Method::Nearest } else { method };

        let (xs, ys): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
        let mids = xs.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
        Ok(Self { xs, ys, mids, method })
    }

    fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if n == 0 || x.is_nan() || x < self.xs[0] || x > self.xs[n - 1] {
            return f64::NAN;
        }
        match self.method {
            Method::Nearest => {
                // An exact tie on a midpoint keeps the shallower sample.
                self.ys[self.mids.partition_point(|&m| m < x)]
            }
            Method::Linear => {
                let hi = self.xs.partition_point(|&d| d < x).clamp(1, n - 1);
                let lo = hi - 1;
                let dx = self.xs[hi] - self.xs[lo];
                if dx == 0.0 {
                    return self.ys[lo];
                }
                let slope = (self.ys[hi] - self.ys[lo]) / dx;
                self.ys[lo] + slope * (x - self.xs[lo])
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Resample `old_values` (sampled at `old_depth`) onto `new_depth`.
///
/// NaN samples are dropped first. With no valid samples the result is all
/// NaN; with one valid sample nearest-neighbour is used whatever `method`
/// says. Targets outside the valid source range are NaN, never extrapolated.
pub fn resample_to_grid(
    old_depth: &[f64],
    old_values: &[f64],
    new_depth: &[f64],
    method: Method,
) -> Result<Vec<f64>> {
    let interp = Interpolator::new(old_depth, old_values, method)?;
    if interp.is_empty() {
        return Ok(vec![f64::NAN; new_depth.len()]);
    }
    debug!(
        "resampling {} valid samples onto {} depths ({})",
        interp.xs.len(),
        new_depth.len(),
        interp.method
    );
    Ok(new_depth.iter().map(|&d| interp.eval(d)).collect())
}

/// Regular grid `start, start + step, ...` strictly below `stop`.
pub fn regular_grid(start: f64, stop: f64, step: f64) -> Result<Vec<f64>> {
    if !(step.is_finite() && step > 0.0) {
        return Err(WellLogError::DepthAlignment(format!(
            "grid step must be positive, got {step}"
        )));
    }
    if !(start.is_finite() && stop.is_finite()) {
        return Err(WellLogError::DepthAlignment(format!(
            "grid bounds must be finite, got [{start}, {stop})"
        )));
    }
    let n = ((stop - start) / step).ceil().max(0.0) as usize;
    Ok((0..n).map(|i| start + i as f64 * step).collect())
}

/// Median spacing of a depth array, or `None` with fewer than two samples.
pub fn median_step(depth: &[f64]) -> Option<f64> {
    if depth.len() < 2 {
        return None;
    }
    let mut diffs: Vec<f64> = depth.windows(2).map(|w| w[1] - w[0]).collect();
    diffs.sort_by(f64::total_cmp);
    let mid = diffs.len() / 2;
    Some(if diffs.len() % 2 == 0 {
        (diffs[mid - 1] + diffs[mid]) / 2.0
    } else {
        diffs[mid]
    })
}

/// Two properties resampled onto their common depth grid.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    pub depth: Vec<f64>,
    pub first: Vec<f64>,
    pub second: Vec<f64>,
}

/// Put `first` and `second` on a shared grid covering their overlap.
///
/// The grid uses the finer of the two median spacings. `first` is resampled
/// linearly unless it is discrete; `second` is always nearest-neighbour.
pub fn align_depths(first: &Property, second: &Property) -> Result<AlignedPair> {
    let (a_min, a_max) = depth_range(first)?;
    let (b_min, b_max) = depth_range(second)?;

    let lo = a_min.max(b_min);
    let hi = a_max.min(b_max);
    if lo >= hi {
        return Err(WellLogError::DepthAlignment(format!(
            "no overlapping depth range between '{}' [{a_min:.2}, {a_max:.2}] and '{}' [{b_min:.2}, {b_max:.2}]",
            first.name(),
            second.name()
        )));
    }

    let step_a = median_step(first.depth()).unwrap_or(FALLBACK_STEP);
    let step_b = median_step(second.depth()).unwrap_or(FALLBACK_STEP);
    let step = step_a.min(step_b);
    let depth = regular_grid(lo, hi + step / 2.0, step)?;

    let first_method = if first.kind() == &PropertyKind::Discrete {
        Method::Nearest
    } else {
        Method::Linear
    };
    let first_values = resample_to_grid(first.depth(), first.values(), &depth, first_method)?;
    let second_values =
        resample_to_grid(second.depth(), second.values(), &depth, Method::Nearest)?;

    Ok(AlignedPair {
        depth,
        first: first_values,
        second: second_values,
    })
}

fn depth_range(prop: &Property) -> Result<(f64, f64)> {
    let depth = prop.depth();
    if depth.is_empty() {
        return Err(WellLogError::DepthAlignment(format!(
            "property '{}' has no samples",
            prop.name()
        )));
    }
    let min = depth.iter().copied().fold(f64::INFINITY, f64::min);
    let max = depth.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok((min, max))
}
