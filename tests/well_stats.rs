use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use welllog::data::export::{CsvLogWriter, ParquetLogWriter};
use welllog::data::model::Curve;
use welllog::resample::{align_depths, resample_to_grid, Method};
use welllog::stats::{compute_intervals, weighted_percentile};
use welllog::{
    CurveTable, ExportOptions, Labels, Property, PropertyKind, SourceResult, StatOptions,
    StatsNode, Well, WellDataManager, WellLogError,
};

/// Zone/NTG layout with a known mean for every combination.
///
/// Each (zone, ntg) block holds three samples around the injected mean.
fn zoned_table() -> (CurveTable, [[f64; 2]; 2]) {
    let means = [[0.08, 0.21], [0.11, 0.27]];
    let mut depth = Vec::new();
    let mut phie = Vec::new();
    let mut zone = Vec::new();
    let mut ntg = Vec::new();
    let mut d = 2500.0;
    for (z, row) in means.iter().enumerate() {
        for (n, &mean) in row.iter().enumerate() {
            for offset in [-0.01, 0.0, 0.01] {
                depth.push(d);
                phie.push(mean + offset);
                zone.push(z as f64);
                ntg.push(n as f64);
                d += 0.5;
            }
        }
    }
    let table = CurveTable::new("DEPT", depth)
        .with_well_name("16/2-6")
        .with_curve(Curve::new("PHIE", phie).with_unit("v/v"))
        .with_curve(Curve::new("Zone", zone).with_kind(PropertyKind::Discrete))
        .with_curve(Curve::new("NTG", ntg))
        .with_labels("NTG", Labels::from([(0, "NonNet".to_string()), (1, "Net".to_string())]));
    (table, means)
}

#[test]
fn nested_filters_reproduce_injected_means() {
    let (table, means) = zoned_table();
    let well = Well::new("16/2-6");
    well.borrow_mut().add_source("wireline", table, None).unwrap();
    let well = well.borrow();

    let stats = well
        .get_property("PHIE")
        .unwrap()
        .filter("Zone")
        .unwrap()
        .filter("NTG")
        .unwrap()
        .sums_avg();

    assert_eq!(stats.depth(), 2);
    assert_eq!(stats.keys(), vec!["Zone_0", "Zone_1"]);
    for (z, row) in means.iter().enumerate() {
        for (n, &mean) in row.iter().enumerate() {
            let zone_key = format!("Zone_{z}");
            let ntg_key = if n == 1 { "Net" } else { "NonNet" };
            let leaf = stats.at(&[zone_key.as_str(), ntg_key]).unwrap().leaf().unwrap();
            assert!((leaf.mean - mean).abs() < 1e-9, "{zone_key}/{ntg_key}: {}", leaf.mean);
            assert_eq!(leaf.count, 3);
            assert_eq!(leaf.depth_samples, 3);
            assert!((leaf.depth_thickness - 1.0).abs() < 1e-12);
        }
    }
}

#[test]
fn unfiltered_sums_avg_is_flat_with_all_fields() {
    let (table, _) = zoned_table();
    let well = Well::new("16/2-6");
    well.borrow_mut().add_source("wireline", table, None).unwrap();
    let well = well.borrow();

    let stats = well.get_property("PHIE").unwrap().sums_avg();
    let json = serde_json::to_value(&stats).unwrap();
    let keys: BTreeSet<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        BTreeSet::from(["mean", "sum", "count", "depth_samples", "depth_thickness", "min", "max", "std"])
    );
    assert_eq!(json["count"], 12);
}

#[test]
fn filtering_by_continuous_property_is_a_type_error() {
    let (table, _) = zoned_table();
    let well = Well::new("16/2-6");
    well.borrow_mut().add_source("wireline", table, None).unwrap();
    let well = well.borrow();

    let zone = well.get_property("Zone").unwrap();
    let err = zone.filter("PHIE").unwrap_err();
    assert!(matches!(err, WellLogError::PropertyType(_)), "{err}");
}

#[test]
fn filter_fails_cleanly_once_the_well_is_gone() {
    let (table, _) = zoned_table();
    let well = Well::new("16/2-6");
    well.borrow_mut().add_source("wireline", table, None).unwrap();
    let phie = well.borrow().get_property("PHIE").unwrap().clone();
    drop(well);

    assert!(phie.parent_well().is_none());
    assert!(matches!(phie.filter("Zone"), Err(WellLogError::PropertyNotFound(_))));
    // The property itself is still usable.
    assert_eq!(phie.sums_avg().leaf().unwrap().count, 12);
}

#[test]
fn non_overlapping_ranges_cannot_be_aligned() {
    let shallow = Property::new("GR", vec![1000.0, 1001.0], vec![50.0, 60.0]).unwrap();
    let deep = Property::new("Zone", vec![2000.0, 2001.0], vec![0.0, 1.0]).unwrap();
    assert!(matches!(
        align_depths(&shallow, &deep),
        Err(WellLogError::DepthAlignment(_))
    ));
}

#[test]
fn single_valid_point_resamples_to_its_value() {
    let depth = [10.0, 11.0, 12.0];
    let values = [f64::NAN, 0.3, f64::NAN];
    for method in [Method::Linear, Method::Nearest] {
        let out = resample_to_grid(&depth, &values, &[11.0], method).unwrap();
        assert_eq!(out, vec![0.3]);
    }
}

#[test]
fn kernels_match_reference_scenarios() {
    let intervals = compute_intervals(&[1500.0, 1501.0, 1505.0]);
    assert_eq!(intervals, vec![0.5, 2.5, 2.0]);

    let series = [0.31, 0.12, 0.25, 0.18, 0.22, 0.29, 0.15];
    let p50 = weighted_percentile(&series, &[0.15; 7], 50.0);
    assert!((p50 - 0.22).abs() < 1e-12);
}

fn two_source_manager() -> WellDataManager {
    let mut manager = WellDataManager::new();
    let ambiguous = manager.add_well("25/4-1");
    {
        let mut w = ambiguous.borrow_mut();
        w.add_source(
            "wireline",
            CurveTable::new("DEPT", vec![1800.0, 1800.5, 1801.0])
                .with_curve(Curve::new("PHIE", vec![0.2, 0.22, 0.24])),
            None,
        )
        .unwrap();
        w.add_source(
            "core",
            CurveTable::new("DEPT", vec![1800.2, 1800.9])
                .with_curve(Curve::new("PHIE", vec![0.19, 0.25])),
            None,
        )
        .unwrap();
    }
    let unique = manager.add_well("25/4-2");
    unique
        .borrow_mut()
        .add_source(
            "wireline",
            CurveTable::new("DEPT", vec![1900.0, 1900.5])
                .with_curve(Curve::new("PHIE", vec![0.1, 0.3])),
            None,
        )
        .unwrap();
    manager
}

#[test]
fn ambiguous_property_is_keyed_by_source() {
    let manager = two_source_manager();
    let result = manager.property("PHIE").statistics().unwrap();

    match result.get("25/4-1").unwrap() {
        SourceResult::BySource(trees) => {
            let sources: Vec<&str> = trees.iter().map(|(s, _)| s.as_str()).collect();
            assert_eq!(sources, vec!["wireline", "core"]);
        }
        other => panic!("expected source-keyed result, got {other:?}"),
    }
    match result.get("25/4-2").unwrap() {
        SourceResult::Direct(StatsNode::Leaf(stats)) => assert_eq!(stats.count, 2),
        other => panic!("expected flat result, got {other:?}"),
    }

    let nested = manager.property("PHIE").nested(true).statistics().unwrap();
    assert!(nested.get("25/4-2").unwrap().source("wireline").is_some());

    let well = manager.get_well("25/4-2").unwrap();
    let forced = well
        .borrow()
        .property_stats("PHIE", &[], &StatOptions { nested: true, ..StatOptions::default() }, Property::sums_avg)
        .unwrap();
    assert!(forced.direct().is_none());
}

#[test]
fn written_logs_load_back_into_a_manager() {
    let dir = tempfile::tempdir().unwrap();
    let (table, means) = zoned_table();
    let well = Well::new("16/2-6");
    well.borrow_mut().add_source("wireline", table, None).unwrap();

    let csv_path = dir.path().join("16_2-6 run1.csv");
    let parquet_path = dir.path().join("16_2-6_run2.parquet");
    well.borrow()
        .export(&mut CsvLogWriter::new(&csv_path), &ExportOptions::default())
        .unwrap();
    well.borrow()
        .export(
            &mut ParquetLogWriter::new(&parquet_path),
            &ExportOptions {
                include: Some(vec!["PHIE".to_string(), "Zone".to_string()]),
                ..ExportOptions::default()
            },
        )
        .unwrap();

    let mut manager = WellDataManager::new();
    manager.load_files(&[&csv_path, &parquet_path]).unwrap();
    assert_eq!(manager.wells(), vec!["well_16_2_6"]);

    let loaded = manager.get_well("16/2-6").unwrap();
    let loaded = loaded.borrow();
    assert_eq!(loaded.source_names(), vec!["16_2_6_run1", "16_2_6_run2"]);
    assert!(loaded.is_ambiguous("PHIE"));
    assert!(!loaded.is_ambiguous("NTG"));

    let ntg = loaded.get_property("NTG").unwrap();
    assert_eq!(ntg.kind(), &PropertyKind::Discrete);
    assert_eq!(ntg.labels().unwrap()[&1], "Net");

    let result = manager
        .property("PHIE")
        .filter("Zone")
        .filter("NTG")
        .weighted(false)
        .mean()
        .unwrap();
    let run1 = result.get("16/2-6").unwrap().source("16_2_6_run1").unwrap();
    let net = run1.at(&["Zone_1", "Net"]).unwrap().leaf().unwrap();
    assert!((net - means[1][1]).abs() < 1e-9);
}
