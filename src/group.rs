//! Hierarchical grouping over discrete filter dimensions.
//!
//! A filtered property carries an ordered list of discrete series on its own
//! depth grid. Grouping walks those dimensions in order: at each level the
//! distinct codes present under the current mask split it into sub-masks,
//! and the last level (or a level with no valid codes) becomes a leaf.
//!
//! Codes are compared with exact equality. That is sound because filter
//! series only ever reach a property through nearest-neighbour resampling,
//! which copies source codes verbatim instead of blending them.

use std::collections::BTreeMap;

use log::debug;
use serde::ser::{Serialize, SerializeMap, Serializer};

// ---------------------------------------------------------------------------
// Result tree
// ---------------------------------------------------------------------------

/// Grouped result: a leaf value, or named branches in ascending code order.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsNode<T> {
    Leaf(T),
    Branch(Vec<(String, StatsNode<T>)>),
}

impl<T> StatsNode<T> {
    pub fn leaf(&self) -> Option<&T> {
        match self {
            StatsNode::Leaf(v) => Some(v),
            StatsNode::Branch(_) => None,
        }
    }

    /// Child branch by key.
    pub fn get(&self, key: &str) -> Option<&StatsNode<T>> {
        match self {
            StatsNode::Leaf(_) => None,
            StatsNode::Branch(children) => {
                children.iter().find(|(k, _)| k == key).map(|(_, n)| n)
            }
        }
    }

    /// Follow a path of keys, e.g. `["Upper", "Net"]`.
    pub fn at(&self, path: &[&str]) -> Option<&StatsNode<T>> {
        path.iter().try_fold(self, |node, key| node.get(key))
    }

    pub fn keys(&self) -> Vec<&str> {
        match self {
            StatsNode::Leaf(_) => Vec::new(),
            StatsNode::Branch(children) => children.iter().map(|(k, _)| k.as_str()).collect(),
        }
    }

    /// Number of branch levels above the deepest leaf.
    pub fn depth(&self) -> usize {
        match self {
            StatsNode::Leaf(_) => 0,
            StatsNode::Branch(children) => {
                1 + children.iter().map(|(_, n)| n.depth()).max().unwrap_or(0)
            }
        }
    }

    /// All leaves with their key paths, in tree order.
    pub fn leaves(&self) -> Vec<(Vec<&str>, &T)> {
        let mut out = Vec::new();
        let mut stack: Vec<(Vec<&str>, &StatsNode<T>)> = vec![(Vec::new(), self)];
        while let Some((path, node)) = stack.pop() {
            match node {
                StatsNode::Leaf(v) => out.push((path, v)),
                StatsNode::Branch(children) => {
                    for (key, child) in children.iter().rev() {
                        let mut p = path.clone();
                        p.push(key.as_str());
                        stack.push((p, child));
                    }
                }
            }
        }
        out
    }

    pub fn map<U>(self, f: &impl Fn(T) -> U) -> StatsNode<U> {
        match self {
            StatsNode::Leaf(v) => StatsNode::Leaf(f(v)),
            StatsNode::Branch(children) => StatsNode::Branch(
                children.into_iter().map(|(k, n)| (k, n.map(f))).collect(),
            ),
        }
    }
}

impl<T: Serialize> Serialize for StatsNode<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StatsNode::Leaf(v) => v.serialize(serializer),
            StatsNode::Branch(children) => {
                let mut map = serializer.serialize_map(Some(children.len()))?;
                for (k, v) in children {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Grouping engine
// ---------------------------------------------------------------------------

/// One filter dimension: a discrete series on the grouped property's grid.
#[derive(Debug, Clone, Copy)]
pub struct Dimension<'a> {
    pub name: &'a str,
    pub values: &'a [f64],
    pub labels: Option<&'a BTreeMap<i64, String>>,
}

/// Display key for a code: its label, `{name}_{int}`, or `{name}_{value:.2}`.
pub fn group_key(dim: &Dimension<'_>, value: f64) -> String {
    if value.fract() != 0.0 {
        return format!("{}_{:.2}", dim.name, value);
    }
    // 2^63 itself is out of range, hence the strict upper bound.
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    if in_range {
        let code = value as i64;
        if let Some(label) = dim.labels.and_then(|l| l.get(&code)) {
            return label.clone();
        }
        format!("{}_{}", dim.name, code)
    } else {
        format!("{}_{:.0}", dim.name, value)
    }
}

/// Distinct valid codes of `values` under `mask`, ascending.
fn unique_codes(values: &[f64], mask: &[bool]) -> Vec<f64> {
    let mut codes: Vec<f64> = values
        .iter()
        .zip(mask)
        .filter(|(v, &m)| m && !v.is_nan())
        .map(|(&v, _)| v)
        .collect();
    codes.sort_by(f64::total_cmp);
    codes.dedup();
    codes
}

/// Sub-masks for each code of `dim` present under `mask`; `None` when the
/// dimension has no valid code there.
fn split(dim: &Dimension<'_>, mask: &[bool]) -> Option<Vec<(String, Vec<bool>)>> {
    let codes = unique_codes(dim.values, mask);
    if codes.is_empty() {
        return None;
    }
    let groups = codes
        .into_iter()
        .map(|code| {
            let sub: Vec<bool> = mask
                .iter()
                .zip(dim.values)
                .map(|(&m, &v)| m && v == code)
                .collect();
            (group_key(dim, code), sub)
        })
        .collect();
    Some(groups)
}

/// A branch under construction.
struct Pending<T> {
    level: usize,
    key: Option<String>,
    todo: std::vec::IntoIter<(String, Vec<bool>)>,
    built: Vec<(String, StatsNode<T>)>,
}

/// Insert keeping the last value for a repeated key (two codes sharing a label).
fn insert<T>(built: &mut Vec<(String, StatsNode<T>)>, key: String, node: StatsNode<T>) {
    match built.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = node,
        None => built.push((key, node)),
    }
}

/// Group `mask` by `dims` in order, calling `leaf` on every final mask.
///
/// Runs on an explicit stack, so the chain length is bounded by memory rather
/// than call depth.
pub fn group_by<T>(
    dims: &[Dimension<'_>],
    mask: Vec<bool>,
    mut leaf: impl FnMut(&[bool]) -> T,
) -> StatsNode<T> {
    let Some(first) = dims.first() else {
        return StatsNode::Leaf(leaf(&mask));
    };
    let Some(groups) = split(first, &mask) else {
        debug!("filter '{}' has no valid codes, returning flat statistics", first.name);
        return StatsNode::Leaf(leaf(&mask));
    };

    let mut stack = vec![Pending {
        level: 0,
        key: None,
        todo: groups.into_iter(),
        built: Vec::new(),
    }];

    while let Some(mut top) = stack.pop() {
        if let Some((key, sub)) = top.todo.next() {
            let next = top.level + 1;
            match dims.get(next).and_then(|dim| split(dim, &sub)) {
                Some(groups) => {
                    stack.push(top);
                    stack.push(Pending {
                        level: next,
                        key: Some(key),
                        todo: groups.into_iter(),
                        built: Vec::new(),
                    });
                }
                None => {
                    insert(&mut top.built, key, StatsNode::Leaf(leaf(&sub)));
                    stack.push(top);
                }
            }
            continue;
        }

        let node = StatsNode::Branch(top.built);
        match (stack.last_mut(), top.key) {
            (Some(parent), Some(key)) => insert(&mut parent.built, key, node),
            _ => return node,
        }
    }
    // The root frame always returns above.
    StatsNode::Branch(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn count(mask: &[bool]) -> usize {
        mask.iter().filter(|&&m| m).count()
    }

    #[test]
    fn keys_prefer_labels_then_integers_then_decimals() {
        let labels = BTreeMap::from([(1, "Net".to_string())]);
        let dim = Dimension {
            name: "NTG",
            values: &[],
            labels: Some(&labels),
        };
        assert_eq!(group_key(&dim, 1.0), "Net");
        assert_eq!(group_key(&dim, 0.0), "NTG_0");
        assert_eq!(group_key(&dim, 2.5), "NTG_2.50");
        assert_eq!(group_key(&dim, -3.0), "NTG_-3");
        assert_eq!(group_key(&dim, 1e20), "NTG_100000000000000000000");
        assert_eq!(group_key(&dim, -1e19), "NTG_-10000000000000000000");
    }

    #[test]
    fn no_dimensions_gives_leaf() {
        let node = group_by(&[], vec![true, true, false], count);
        assert_eq!(node, StatsNode::Leaf(2));
    }

    #[test]
    fn nests_in_dimension_order() {
        let zone = [0.0, 0.0, 1.0, 1.0];
        let flag = [0.0, 1.0, 1.0, 1.0];
        let dims = [
            Dimension { name: "Zone", values: &zone, labels: None },
            Dimension { name: "Flag", values: &flag, labels: None },
        ];
        let node = group_by(&dims, vec![true; 4], count);
        assert_eq!(
            node,
            StatsNode::Branch(vec![
                (
                    "Zone_0".to_string(),
                    StatsNode::Branch(vec![
                        ("Flag_0".to_string(), StatsNode::Leaf(1)),
                        ("Flag_1".to_string(), StatsNode::Leaf(1)),
                    ])
                ),
                (
                    "Zone_1".to_string(),
                    StatsNode::Branch(vec![("Flag_1".to_string(), StatsNode::Leaf(2))])
                ),
            ])
        );
        assert_eq!(node.depth(), 2);
        assert_eq!(node.at(&["Zone_1", "Flag_1"]), Some(&StatsNode::Leaf(2)));
    }

    #[test]
    fn all_nan_dimension_stops_early() {
        let zone = [0.0, 1.0, 1.0];
        let flag = [f64::NAN, f64::NAN, 1.0];
        let dims = [
            Dimension { name: "Zone", values: &zone, labels: None },
            Dimension { name: "Flag", values: &flag, labels: None },
        ];
        let node = group_by(&dims, vec![true; 3], count);
        assert_eq!(node.get("Zone_0"), Some(&StatsNode::Leaf(1)));
        assert_eq!(node.at(&["Zone_1", "Flag_1"]), Some(&StatsNode::Leaf(1)));
    }

    #[test]
    fn nan_codes_are_left_out_of_groups() {
        let zone = [0.0, f64::NAN, 0.0];
        let dims = [Dimension { name: "Zone", values: &zone, labels: None }];
        let node = group_by(&dims, vec![true; 3], count);
        assert_eq!(node, StatsNode::Branch(vec![("Zone_0".to_string(), StatsNode::Leaf(2))]));
    }

    #[test]
    fn leaves_and_json_follow_tree_order() {
        let zone = [2.0, 1.0];
        let dims = [Dimension { name: "Zone", values: &zone, labels: None }];
        let node = group_by(&dims, vec![true; 2], count);
        let leaves: Vec<_> = node.leaves().into_iter().map(|(p, v)| (p.join("/"), *v)).collect();
        assert_eq!(leaves, vec![("Zone_1".to_string(), 1), ("Zone_2".to_string(), 1)]);
        assert_eq!(serde_json::to_string(&node).unwrap(), r#"{"Zone_1":1,"Zone_2":1}"#);
    }
}
