use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use serde::Serialize;

use welllog::data::export::{CsvLogWriter, LogWriter, ParquetLogWriter};
use welllog::data::loader::load_tops_csv;
use welllog::data::model::DEFAULT_NULL_VALUE;
use welllog::{
    ExportOptions, FrameOptions, MultiWellResult, Property, ResampleGrid, StatOptions, TopsOptions,
    WellDataManager,
};

#[derive(Parser)]
#[command(name = "welllog")]
#[command(about = "Well-log filtering and depth-weighted statistics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

/// Where the wells come from.
#[derive(Args)]
struct Inputs {
    /// Log file to load (.csv with optional .meta.json sidecar, .json, .parquet).
    #[arg(short = 'f', long = "file", required = true)]
    files: Vec<PathBuf>,

    /// Formation tops CSV with well, surface and depth columns.
    #[arg(long)]
    tops: Option<PathBuf>,

    /// Add the tops' X, Y and Z columns as properties too.
    #[arg(long, requires = "tops")]
    tops_coordinates: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Grouped statistics for one property across every well (JSON).
    Stats {
        #[command(flatten)]
        inputs: Inputs,

        #[arg(short, long)]
        property: String,

        /// Discrete property to group by; repeat to nest.
        #[arg(long = "filter")]
        filters: Vec<String>,

        #[arg(long, value_enum, default_value_t = StatKind::SumsAvg)]
        stat: StatKind,

        /// Percentile in 0..=100; overrides --stat.
        #[arg(long)]
        percentile: Option<f64>,

        /// Count samples uniformly instead of weighting by depth interval.
        #[arg(long)]
        arithmetic: bool,

        /// Key results by source even where the property name is unique.
        #[arg(long)]
        nested: bool,
    },

    /// Statistics bundle for every property of every well (JSON).
    Summary {
        #[command(flatten)]
        inputs: Inputs,

        /// Only this well.
        #[arg(long)]
        well: Option<String>,
    },

    /// Print a well as a table on a shared depth grid.
    Show {
        #[command(flatten)]
        inputs: Inputs,

        #[arg(long)]
        well: String,

        /// Property whose depth grid is used.
        #[arg(long)]
        reference: Option<String>,

        #[arg(long, conflicts_with = "exclude")]
        include: Vec<String>,

        #[arg(long)]
        exclude: Vec<String>,

        /// Show discrete codes instead of labels.
        #[arg(long)]
        codes: bool,
    },

    /// Write a well to CSV (+ .meta.json) or Parquet, chosen by extension.
    Export {
        #[command(flatten)]
        inputs: Inputs,

        #[arg(long)]
        well: String,

        #[arg(short, long)]
        out: PathBuf,

        #[arg(long, conflicts_with = "exclude")]
        include: Vec<String>,

        #[arg(long)]
        exclude: Vec<String>,

        /// Resample the whole well onto a regular grid with this step first.
        #[arg(long)]
        step: Option<f64>,

        /// Leave discrete label maps out of the metadata.
        #[arg(long)]
        no_labels: bool,

        #[arg(long, default_value_t = DEFAULT_NULL_VALUE, allow_hyphen_values = true)]
        null_value: f64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatKind {
    SumsAvg,
    Statistics,
    Mean,
    Sum,
    Std,
    Min,
    Max,
    Median,
    Count,
}

fn load_manager(inputs: &Inputs) -> Result<WellDataManager> {
    let mut manager = WellDataManager::new();
    manager.load_files(&inputs.files)?;
    if let Some(path) = &inputs.tops {
        let records = load_tops_csv(path)?;
        let options = TopsOptions {
            include_coordinates: inputs.tops_coordinates,
            ..TopsOptions::default()
        };
        manager.load_tops(&records, &options)?;
    }
    info!("{manager} from {} files", inputs.files.len());
    Ok(manager)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("serialising result")?);
    Ok(())
}

fn print_result<T: Serialize>(property: &str, result: &MultiWellResult<T>) -> Result<()> {
    if result.is_empty() {
        warn!("no well has a property named '{property}'");
    }
    print_json(result)
}

fn non_empty(names: Vec<String>) -> Option<Vec<String>> {
    (!names.is_empty()).then_some(names)
}

fn writer_for(path: &Path) -> Box<dyn LogWriter> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("parquet") | Some("pq") => Box::new(ParquetLogWriter::new(path)),
        _ => Box::new(CsvLogWriter::new(path)),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Stats {
            inputs,
            property,
            filters,
            stat,
            percentile,
            arithmetic,
            nested,
        } => {
            let manager = load_manager(&inputs)?;
            let mut query = manager
                .property(&property)
                .nested(nested)
                .weighted(!arithmetic);
            for filter in &filters {
                query = query.filter(filter);
            }

            if let Some(p) = percentile {
                return print_result(&property, &query.percentile(p)?);
            }
            match stat {
                StatKind::SumsAvg => print_result(&property, &query.sums_avg()?)?,
                StatKind::Statistics => print_result(&property, &query.statistics()?)?,
                StatKind::Mean => print_result(&property, &query.mean()?)?,
                StatKind::Sum => print_result(&property, &query.sum()?)?,
                StatKind::Std => print_result(&property, &query.std()?)?,
                StatKind::Min => print_result(&property, &query.min()?)?,
                StatKind::Max => print_result(&property, &query.max()?)?,
                StatKind::Median => print_result(&property, &query.median()?)?,
                StatKind::Count => print_result(&property, &query.count()?)?,
            }
        }

        Commands::Summary { inputs, well } => {
            let manager = load_manager(&inputs)?;
            let handles = match &well {
                Some(name) => vec![manager.get_well(name)?],
                None => manager.well_handles().cloned().collect(),
            };

            let mut summary = serde_json::Map::new();
            for handle in handles {
                let well = handle.borrow();
                let mut per_property = serde_json::Map::new();
                for name in well.properties() {
                    let stats = well.property_stats(
                        name,
                        &[],
                        &StatOptions::default(),
                        Property::statistics,
                    )?;
                    per_property.insert(name.to_string(), serde_json::to_value(&stats)?);
                }
                summary.insert(well.name().to_string(), per_property.into());
            }
            print_json(&summary)?;
        }

        Commands::Show {
            inputs,
            well,
            reference,
            include,
            exclude,
            codes,
        } => {
            let manager = load_manager(&inputs)?;
            let handle = manager.get_well(&well)?;
            let frame = handle.borrow().to_frame(&FrameOptions {
                reference,
                include: non_empty(include),
                exclude: non_empty(exclude),
                auto_resample: true,
                discrete_labels: !codes,
            })?;
            if frame.is_empty() {
                println!("well '{well}' has no properties");
                return Ok(());
            }
            let batch = frame.to_record_batch()?;
            let table = arrow::util::pretty::pretty_format_batches(&[batch])
                .context("formatting table")?;
            println!("{table}");
        }

        Commands::Export {
            inputs,
            well,
            out,
            include,
            exclude,
            step,
            no_labels,
            null_value,
        } => {
            let manager = load_manager(&inputs)?;
            let handle = manager.get_well(&well)?;
            if let Some(step) = step {
                handle
                    .borrow_mut()
                    .resample(ResampleGrid::Regular { step, range: None })?;
            }
            let mut writer = writer_for(&out);
            handle.borrow().export(
                writer.as_mut(),
                &ExportOptions {
                    include: non_empty(include),
                    exclude: non_empty(exclude),
                    store_labels: !no_labels,
                    null_value,
                },
            )?;
            println!("Wrote {}", out.display());
        }
    }

    Ok(())
}
