//! Statistics kernels for well-log series.
//!
//! Two families live here. The *weighted* kernels weight each sample by the
//! depth interval it represents (see [`compute_intervals`]), which is what
//! thickness-aware summaries such as net pay need. The *arithmetic* kernels
//! count samples uniformly. Both skip NaN entries and return NaN when too few
//! valid samples remain.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Depth intervals
// ---------------------------------------------------------------------------

/// Thickness represented by each sample, using the midpoint rule.
///
/// Each sample owns the interval from the midpoint with its upper neighbour to
/// the midpoint with its lower neighbour; the end samples own half an interval.
/// A single sample gets an interval of `1.0`.
///
/// ```
/// use welllog::stats::compute_intervals;
/// assert_eq!(compute_intervals(&[1500.0, 1501.0, 1505.0]), vec![0.5, 2.5, 2.0]);
/// ```
pub fn compute_intervals(depth: &[f64]) -> Vec<f64> {
    match depth.len() {
        0 => Vec::new(),
        1 => vec![1.0],
        n => {
            let mut intervals = vec![0.0; n];
            intervals[0] = (depth[1] - depth[0]) / 2.0;
            for i in 1..n - 1 {
                let upper_mid = (depth[i - 1] + depth[i]) / 2.0;
                let lower_mid = (depth[i] + depth[i + 1]) / 2.0;
                intervals[i] = lower_mid - upper_mid;
            }
            intervals[n - 1] = (depth[n - 1] - depth[n - 2]) / 2.0;
            intervals
        }
    }
}

/// (value, weight) pairs where neither side is NaN.
fn valid_pairs(values: &[f64], weights: &[f64]) -> Vec<(f64, f64)> {
    values
        .iter()
        .zip(weights)
        .filter(|(v, w)| !v.is_nan() && !w.is_nan())
        .map(|(&v, &w)| (v, w))
        .collect()
}

fn valid_values(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

// ---------------------------------------------------------------------------
// Weighted kernels
// ---------------------------------------------------------------------------

/// Depth-weighted mean. NaN when nothing is valid or the total weight is zero.
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    let pairs = valid_pairs(values, weights);
    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    if pairs.is_empty() || total == 0.0 {
        return f64::NAN;
    }
    pairs.iter().map(|(v, w)| v * w).sum::<f64>() / total
}

/// Depth-weighted sum; for a 0/1 flag this is the flagged thickness.
pub fn weighted_sum(values: &[f64], weights: &[f64]) -> f64 {
    let pairs = valid_pairs(values, weights);
    if pairs.is_empty() {
        return f64::NAN;
    }
    pairs.iter().map(|(v, w)| v * w).sum()
}

/// Depth-weighted (population) standard deviation. Needs two valid samples.
pub fn weighted_std(values: &[f64], weights: &[f64]) -> f64 {
    let pairs = valid_pairs(values, weights);
    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    if pairs.len() < 2 || total == 0.0 {
        return f64::NAN;
    }
    let mean = pairs.iter().map(|(v, w)| v * w).sum::<f64>() / total;
    let variance = pairs
        .iter()
        .map(|(v, w)| w * (v - mean).powi(2))
        .sum::<f64>()
        / total;
    variance.sqrt()
}

/// Depth-weighted percentile, `percentile` in `0..=100`.
///
/// Samples are sorted by value and each is placed at the centre of its share
/// of the cumulative weight. Targets at or before the first position give the
/// smallest value, at or after the last the largest; anything in between is
/// interpolated linearly between the two bracketing values. With uniform
/// weights the 50th percentile is the ordinary median.
///
/// This departs from interpolating on the raw running totals, where each
/// sample sits at the end of its weight: there a uniform-weight p50 lands on
/// the lower middle sample instead of the median.
pub fn weighted_percentile(values: &[f64], weights: &[f64], percentile: f64) -> f64 {
    let mut pairs = valid_pairs(values, weights);
    if pairs.is_empty() {
        return f64::NAN;
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut positions = Vec::with_capacity(pairs.len());
    let mut cumulative = 0.0;
    for (_, w) in &pairs {
        positions.push(cumulative + w / 2.0);
        cumulative += w;
    }
    let target = percentile / 100.0 * cumulative;

    let n = pairs.len();
    if target <= positions[0] {
        return pairs[0].0;
    }
    if target >= positions[n - 1] {
        return pairs[n - 1].0;
    }

    let idx = positions.partition_point(|&p| p < target);
    let (below, above) = (positions[idx - 1], positions[idx]);
    let (v_below, v_above) = (pairs[idx - 1].0, pairs[idx].0);
    if above == below {
        return v_above;
    }
    let fraction = (target - below) / (above - below);
    v_below + fraction * (v_above - v_below)
}

// ---------------------------------------------------------------------------
// Arithmetic kernels
// ---------------------------------------------------------------------------

pub fn arithmetic_mean(values: &[f64]) -> f64 {
    let valid = valid_values(values);
    if valid.is_empty() {
        return f64::NAN;
    }
    valid.iter().sum::<f64>() / valid.len() as f64
}

pub fn arithmetic_sum(values: &[f64]) -> f64 {
    let valid = valid_values(values);
    if valid.is_empty() {
        return f64::NAN;
    }
    valid.iter().sum()
}

/// Population standard deviation over valid samples; needs at least two.
pub fn arithmetic_std(values: &[f64]) -> f64 {
    let valid = valid_values(values);
    if valid.len() < 2 {
        return f64::NAN;
    }
    population_std(&valid)
}

/// Sample-count percentile with linear interpolation between ranks.
pub fn arithmetic_percentile(values: &[f64], percentile: f64) -> f64 {
    let mut valid = valid_values(values);
    if valid.is_empty() {
        return f64::NAN;
    }
    valid.sort_by(f64::total_cmp);
    let rank = (percentile / 100.0).clamp(0.0, 1.0) * (valid.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    valid[lo] + (rank - lo as f64) * (valid[hi] - valid[lo])
}

fn population_std(valid: &[f64]) -> f64 {
    let n = valid.len() as f64;
    let mean = valid.iter().sum::<f64>() / n;
    (valid.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn min_max(valid: &[f64]) -> (f64, f64) {
    if valid.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    valid
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

// ---------------------------------------------------------------------------
// Bundles
// ---------------------------------------------------------------------------

/// Full descriptive bundle for one (possibly filtered) interval of a property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub weighted_mean: f64,
    pub weighted_sum: f64,
    pub weighted_std: f64,
    pub weighted_p10: f64,
    pub weighted_p50: f64,
    pub weighted_p90: f64,
    pub arithmetic_mean: f64,
    pub arithmetic_sum: f64,
    pub arithmetic_std: f64,
    /// Valid (non-NaN) samples.
    pub count: usize,
    /// All samples, valid or not.
    pub depth_samples: usize,
    /// Summed interval thickness of the valid samples.
    pub depth_thickness: f64,
    pub min: f64,
    pub max: f64,
}

/// Statistics bundle for `values` sampled at `depth`.
pub fn compute_all_statistics(values: &[f64], depth: &[f64]) -> Statistics {
    summarize(values, &compute_intervals(depth))
}

/// Statistics bundle from precomputed interval weights.
///
/// Grouped statistics pass the intervals of the full depth grid, masked to
/// the group, so a sample keeps its own thickness instead of bridging the gap
/// to the next sample of the same group.
pub fn summarize(values: &[f64], intervals: &[f64]) -> Statistics {
    let valid = valid_values(values);
    let depth_thickness = values
        .iter()
        .zip(intervals)
        .filter(|(v, _)| !v.is_nan())
        .map(|(_, w)| w)
        .sum();
    let (min, max) = min_max(&valid);

    Statistics {
        weighted_mean: weighted_mean(values, intervals),
        weighted_sum: weighted_sum(values, intervals),
        weighted_std: weighted_std(values, intervals),
        weighted_p10: weighted_percentile(values, intervals, 10.0),
        weighted_p50: weighted_percentile(values, intervals, 50.0),
        weighted_p90: weighted_percentile(values, intervals, 90.0),
        arithmetic_mean: arithmetic_mean(values),
        arithmetic_sum: arithmetic_sum(values),
        arithmetic_std: arithmetic_std(values),
        count: valid.len(),
        depth_samples: values.len(),
        depth_thickness,
        min,
        max,
    }
}

/// Per-group summary produced by `Property::sums_avg`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub mean: f64,
    pub sum: f64,
    pub count: usize,
    pub depth_samples: usize,
    /// Distance from the shallowest to the deepest selected sample.
    pub depth_thickness: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
}

impl GroupStats {
    /// Summarise the samples selected by `mask`.
    pub fn from_mask(values: &[f64], depth: &[f64], mask: &[bool]) -> Self {
        let selected: Vec<f64> = select(values, mask);
        let selected_depth: Vec<f64> = select(depth, mask);
        let valid = valid_values(&selected);

        let depth_thickness = match selected_depth.as_slice() {
            [first, .., last] => last - first,
            _ => 0.0,
        };
        let (min, max) = min_max(&valid);
        let (mean, sum, std) = if valid.is_empty() {
            (f64::NAN, f64::NAN, f64::NAN)
        } else {
            let sum: f64 = valid.iter().sum();
            (sum / valid.len() as f64, sum, population_std(&valid))
        };

        Self {
            mean,
            sum,
            count: valid.len(),
            depth_samples: selected.len(),
            depth_thickness,
            min,
            max,
            std,
        }
    }
}

/// Elements of `data` where `mask` is set.
pub(crate) fn select(data: &[f64], mask: &[bool]) -> Vec<f64> {
    data.iter()
        .zip(mask)
        .filter(|(_, &keep)| keep)
        .map(|(&v, _)| v)
        .collect()
}

// ---------------------------------------------------------------------------
// Single statistics (multi-well queries)
// ---------------------------------------------------------------------------

/// One scalar statistic, evaluated weighted or arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Statistic {
    Mean,
    Sum,
    Std,
    Min,
    Max,
    Median,
    Percentile(f64),
    /// Number of valid samples.
    Count,
}

impl Statistic {
    /// Evaluate over `values` with their interval `weights`.
    ///
    /// `weights` are ignored when `weighted` is false, and always for the
    /// order statistics `Min`, `Max` and `Count`.
    pub fn evaluate(&self, values: &[f64], weights: &[f64], weighted: bool) -> f64 {
        match (self, weighted) {
            (Statistic::Mean, true) => weighted_mean(values, weights),
            (Statistic::Mean, false) => arithmetic_mean(values),
            (Statistic::Sum, true) => weighted_sum(values, weights),
            (Statistic::Sum, false) => arithmetic_sum(values),
            (Statistic::Std, true) => weighted_std(values, weights),
            (Statistic::Std, false) => arithmetic_std(values),
            (Statistic::Median, true) => weighted_percentile(values, weights, 50.0),
            (Statistic::Median, false) => arithmetic_percentile(values, 50.0),
            (Statistic::Percentile(p), true) => weighted_percentile(values, weights, *p),
            (Statistic::Percentile(p), false) => arithmetic_percentile(values, *p),
            (Statistic::Min, _) => min_max(&valid_values(values)).0,
            (Statistic::Max, _) => min_max(&valid_values(values)).1,
            (Statistic::Count, _) => valid_values(values).len() as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn intervals_follow_midpoint_rule() {
        assert_eq!(compute_intervals(&[1500.0, 1501.0, 1505.0]), vec![0.5, 2.5, 2.0]);
        assert_eq!(compute_intervals(&[42.0]), vec![1.0]);
        assert!(compute_intervals(&[]).is_empty());
    }

    #[test]
    fn intervals_sum_to_depth_span() {
        let depth = [2200.0, 2200.15, 2200.3, 2201.0, 2203.7, 2210.0];
        let total: f64 = compute_intervals(&depth).iter().sum();
        assert!(close(total, 2210.0 - 2200.0));
    }

    #[test]
    fn ntg_scenario_weighted_mean_and_sum() {
        let depth = [1500.0, 1501.0, 1505.0];
        let values = [0.0, 1.0, 0.0];
        let w = compute_intervals(&depth);
        assert!(close(weighted_mean(&values, &w), 0.5));
        assert!(close(weighted_sum(&values, &w), 2.5));
    }

    #[test]
    fn weighted_kernels_skip_nan_and_need_samples() {
        let w = [1.0, 1.0, f64::NAN];
        assert!(close(weighted_mean(&[1.0, 3.0, 100.0], &w), 2.0));
        assert!(weighted_mean(&[f64::NAN], &[1.0]).is_nan());
        assert!(weighted_mean(&[1.0], &[0.0]).is_nan());
        assert!(weighted_sum(&[], &[]).is_nan());
        assert!(weighted_std(&[1.0], &[1.0]).is_nan());
        assert!(close(weighted_std(&[1.0, 3.0], &[1.0, 1.0]), 1.0));
    }

    #[test]
    fn weighted_median_matches_ordinary_median_for_uniform_weights() {
        let odd = [3.0, 1.0, 5.0, 2.0, 4.0];
        assert!(close(weighted_percentile(&odd, &[1.0; 5], 50.0), 3.0));
        let even = [4.0, 1.0, 3.0, 2.0];
        assert!(close(weighted_percentile(&even, &[2.0; 4], 50.0), 2.5));
        assert!(close(arithmetic_percentile(&even, 50.0), 2.5));
    }

    #[test]
    fn weighted_percentile_clamps_to_extremes() {
        let values = [10.0, 20.0, 30.0];
        let w = [1.0, 1.0, 1.0];
        assert!(close(weighted_percentile(&values, &w, 0.0), 10.0));
        assert!(close(weighted_percentile(&values, &w, 100.0), 30.0));
        assert!(close(weighted_percentile(&values, &w, 10.0), 10.0));
        assert!(weighted_percentile(&[f64::NAN], &w, 50.0).is_nan());
    }

    #[test]
    fn weighted_percentile_positions_are_weight_centres() {
        // Centres at 0.5, 1.5, 2.5 of 3.0: p25 targets 0.75.
        let p25 = weighted_percentile(&[10.0, 20.0, 30.0], &[1.0; 3], 25.0);
        assert!(close(p25, 12.5), "got {p25}");
    }

    #[test]
    fn weighted_percentile_favours_thick_samples() {
        // The 0.3 sample represents most of the thickness.
        let p50 = weighted_percentile(&[0.1, 0.3], &[1.0, 9.0], 50.0);
        assert!(p50 > 0.2 && p50 <= 0.3, "got {p50}");
    }

    #[test]
    fn arithmetic_kernels() {
        let values = [1.0, f64::NAN, 3.0];
        assert!(close(arithmetic_mean(&values), 2.0));
        assert!(close(arithmetic_sum(&values), 4.0));
        assert!(close(arithmetic_std(&values), 1.0));
        assert!(arithmetic_std(&[1.0]).is_nan());
        assert!(arithmetic_mean(&[f64::NAN]).is_nan());
    }

    #[test]
    fn bundle_counts_valid_samples_and_thickness() {
        let depth = [1500.0, 1501.0, 1505.0];
        let stats = compute_all_statistics(&[0.0, 1.0, f64::NAN], &depth);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.depth_samples, 3);
        assert!(close(stats.depth_thickness, 3.0));
        assert!(close(stats.min, 0.0));
        assert!(close(stats.max, 1.0));
        assert!(close(stats.weighted_mean, 2.5 / 3.0));
        assert!(close(stats.arithmetic_mean, 0.5));
    }

    #[test]
    fn group_stats_use_masked_span() {
        let depth = [100.0, 101.0, 102.0, 103.0];
        let values = [1.0, 2.0, f64::NAN, 4.0];
        let stats = GroupStats::from_mask(&values, &depth, &[false, true, true, true]);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.depth_samples, 3);
        assert!(close(stats.depth_thickness, 2.0));
        assert!(close(stats.mean, 3.0));
        assert!(close(stats.sum, 6.0));
        assert!(close(stats.std, 1.0));

        let empty = GroupStats::from_mask(&values, &depth, &[false; 4]);
        assert_eq!(empty.count, 0);
        assert!(empty.mean.is_nan());
        assert_eq!(empty.depth_thickness, 0.0);
    }

    #[test]
    fn statistic_dispatch() {
        let values = [1.0, 2.0, 3.0];
        let w = [1.0, 1.0, 2.0];
        assert!(close(Statistic::Mean.evaluate(&values, &w, true), 2.25));
        assert!(close(Statistic::Mean.evaluate(&values, &w, false), 2.0));
        assert!(close(Statistic::Count.evaluate(&[1.0, f64::NAN], &w, true), 1.0));
        assert!(close(Statistic::Max.evaluate(&values, &w, true), 3.0));
        assert!(close(Statistic::Median.evaluate(&values, &w, false), 2.0));
    }
}
