//! Writes deterministic synthetic well logs for trying the CLI.
//!
//! Usage:
//!   cargo run --bin generate_sample -- --out-dir sample_data
//!   cargo run -- stats -f sample_data/*.csv --tops sample_data/tops.csv -p PHIE --filter Zone --filter NTG

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use welllog::data::export::{CsvLogWriter, LogPayload, LogWriter, ParquetLogWriter};
use welllog::data::model::{Cell, Frame};
use welllog::Labels;

/// Synthetic well-log generator.
#[derive(Parser)]
#[command(name = "generate_sample")]
struct Args {
    /// Directory the logs are written to.
    #[arg(long, default_value = "sample_data")]
    out_dir: PathBuf,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Sample spacing of the wireline logs, in metres.
    #[arg(long, default_value_t = 0.15)]
    step: f64,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// A reservoir zone: name, thickness, mean porosity.
struct Zone {
    name: &'static str,
    thickness: f64,
    porosity: f64,
}

const ZONES: [Zone; 3] = [
    Zone { name: "Tarbert", thickness: 35.0, porosity: 0.24 },
    Zone { name: "Ness", thickness: 50.0, porosity: 0.17 },
    Zone { name: "Etive", thickness: 25.0, porosity: 0.27 },
];

const WELLS: [(&str, f64); 3] = [("36/7-5 A", 2150.0), ("36/7-5 B", 2175.5), ("36/7-6", 2098.0)];

/// Porosity cutoff for the net flag.
const NET_CUTOFF: f64 = 0.15;

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// Wireline log for one well: GR, PHIE, SW, Zone and NTG on a regular grid.
fn wireline(well: &str, top: f64, step: f64, rng: &mut SimpleRng) -> LogPayload {
    let total: f64 = ZONES.iter().map(|z| z.thickness).sum();
    let n = (total / step).round() as usize;

    let mut depth = Vec::with_capacity(n);
    let (mut gr, mut phie, mut sw) = (Vec::new(), Vec::new(), Vec::new());
    let (mut zone, mut ntg) = (Vec::new(), Vec::new());

    for i in 0..n {
        let offset = i as f64 * step;
        depth.push(top + offset);

        let mut base = 0.0;
        let mut code = ZONES.len() - 1;
        for (idx, z) in ZONES.iter().enumerate() {
            if offset < base + z.thickness {
                code = idx;
                break;
            }
            base += z.thickness;
        }

        let por = clamp01(rng.gauss(ZONES[code].porosity, 0.04));
        // A short logging gap, written as the null sentinel.
        let gap = rng.next_f64() < 0.01;
        phie.push(if gap { f64::NAN } else { por });
        gr.push(rng.gauss(120.0 - 250.0 * por, 6.0));
        sw.push(clamp01(rng.gauss(0.9 - 2.0 * por, 0.05)));
        zone.push(code as f64);
        ntg.push(if por >= NET_CUTOFF { 1.0 } else { 0.0 });
    }

    let mut frame = Frame::new();
    frame.push_numeric("DEPT", &depth);
    frame.push_numeric("GR", &gr);
    frame.push_numeric("PHIE", &phie);
    frame.push_numeric("SW", &sw);
    frame.push_column("Zone", zone.into_iter().map(Cell::number).collect());
    frame.push_column("NTG", ntg.into_iter().map(Cell::number).collect());

    let zone_labels: Labels = ZONES
        .iter()
        .enumerate()
        .map(|(i, z)| (i as i64, z.name.to_string()))
        .collect();
    let ntg_labels = Labels::from([(0, "NonNet".to_string()), (1, "Net".to_string())]);

    LogPayload {
        well_name: well.to_string(),
        frame,
        units: BTreeMap::from([
            ("DEPT".to_string(), "m".to_string()),
            ("GR".to_string(), "gAPI".to_string()),
            ("PHIE".to_string(), "v/v".to_string()),
            ("SW".to_string(), "v/v".to_string()),
            ("Zone".to_string(), String::new()),
            ("NTG".to_string(), String::new()),
        ]),
        kinds: BTreeMap::from([
            ("Zone".to_string(), "discrete".to_string()),
            ("NTG".to_string(), "discrete".to_string()),
        ]),
        labels: BTreeMap::from([("Zone".to_string(), zone_labels), ("NTG".to_string(), ntg_labels)]),
        null_value: -999.25,
    }
}

/// Sparse core-plug porosity, which makes `PHIE` ambiguous in that well.
fn core_plugs(well: &str, top: f64, rng: &mut SimpleRng) -> LogPayload {
    let depth: Vec<f64> = (0..24).map(|i| top + 2.0 + i as f64 * 4.3).collect();
    let phie: Vec<f64> = depth.iter().map(|_| clamp01(rng.gauss(0.21, 0.05))).collect();

    let mut frame = Frame::new();
    frame.push_numeric("DEPT", &depth);
    frame.push_numeric("PHIE", &phie);
    LogPayload {
        well_name: well.to_string(),
        frame,
        units: BTreeMap::from([
            ("DEPT".to_string(), "m".to_string()),
            ("PHIE".to_string(), "v/v".to_string()),
        ]),
        kinds: BTreeMap::from([("PHIE".to_string(), "sampled".to_string())]),
        labels: BTreeMap::new(),
        null_value: -999.25,
    }
}

fn file_stem(well: &str) -> String {
    well.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let mut tops = csv::Writer::from_path(args.out_dir.join("tops.csv")).context("creating tops.csv")?;
    tops.write_record(["well", "surface", "depth"])?;

    for (i, &(well, top)) in WELLS.iter().enumerate() {
        let stem = file_stem(well);
        let log = wireline(well, top, args.step, &mut rng);

        // Alternate formats so both loaders get exercised.
        if i % 2 == 0 {
            CsvLogWriter::new(args.out_dir.join(format!("{stem}.csv"))).write_log(&log)?;
        } else {
            ParquetLogWriter::new(args.out_dir.join(format!("{stem}.parquet"))).write_log(&log)?;
        }

        if i == 0 {
            let core = core_plugs(well, top, &mut rng);
            CsvLogWriter::new(args.out_dir.join(format!("{stem}_core.csv"))).write_log(&core)?;
        }

        let mut base = top;
        for zone in &ZONES {
            let pick = base + rng.gauss(0.0, 0.3);
            tops.write_record([well.to_string(), format!("Top {}", zone.name), format!("{pick:.2}")])?;
            base += zone.thickness;
        }
    }
    tops.flush().context("flushing tops.csv")?;

    println!(
        "Wrote {} wells (+ core plugs and tops) to {}",
        WELLS.len(),
        args.out_dir.display()
    );
    Ok(())
}
