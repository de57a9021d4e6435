//! Command-line interface for mdevents.
//!
//! Builds box trees from event files, compares them and evaluates time ROIs.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Args, Parser, Subcommand};

use mdevents_algorithms::{bin_workspace, compare_workspaces, CompareOptions, MdEventWorkspace};
use mdevents_core::{
    BoxControllerConfig, DateAndTime, EventBatch, EventStore, OutOfBoundsPolicy, Progress,
    SplitInto, TimeRoi, WorkspaceDescriptor,
};
use mdevents_io::{
    enforce_memory_budget, read_events_csv, EventFileReader, EventFileWriter, FileEventStore,
    OutOfCoreConfig,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    MdeventsIo(#[from] mdevents_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] mdevents_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    Argument(String),
}

/// Adaptive multidimensional event box-tree tool.
#[derive(Parser)]
#[command(name = "mdevents")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output (debug logging unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Geometry and splitting options shared by `build` and `compare`.
#[derive(Args, Debug, Clone)]
struct TreeArgs {
    /// Lower bound of every dimension, comma separated
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    min: Vec<f64>,

    /// Upper bound of every dimension, comma separated
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    max: Vec<f64>,

    /// Histogram bins per dimension
    #[arg(long, default_value = "10")]
    n_bins: usize,

    /// JSON box-controller configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fan-out per split: one value, or one per dimension ("5" or "5,5,2")
    #[arg(long, value_parser = parse_split_into)]
    split_into: Option<SplitInto>,

    /// Event count above which a leaf splits
    #[arg(long)]
    split_threshold: Option<usize>,

    /// Maximum recursion depth
    #[arg(long)]
    max_depth: Option<usize>,

    /// Split every box down to this depth before inserting
    #[arg(long)]
    min_depth: Option<usize>,

    /// Drop events outside the ranges instead of failing
    #[arg(long)]
    drop_out_of_bounds: bool,

    /// Split sibling boxes in parallel
    #[arg(long)]
    parallel: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a box tree from an event file (.csv or binary)
    Build {
        /// Input event file
        input: PathBuf,

        #[command(flatten)]
        tree: TreeArgs,

        /// Write the tree's events (binary, or CSV for a .csv path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the events binned on the descriptor grid as CSV
        #[arg(long)]
        histogram: Option<PathBuf>,

        /// Spill file for events released out of memory
        #[arg(long)]
        spill: Option<PathBuf>,

        /// Memory budget for resident events, in MiB (requires --spill)
        #[arg(long, requires = "spill")]
        memory_budget_mb: Option<usize>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build two box trees with the same settings and compare them
    Compare {
        /// First event file
        first: PathBuf,

        /// Second event file
        second: PathBuf,

        #[command(flatten)]
        tree: TreeArgs,

        /// Tolerance for box values
        #[arg(long, default_value = "0.0")]
        tolerance: f64,

        /// Skip event-by-event comparison
        #[arg(long)]
        no_events: bool,

        /// Require matching box ids
        #[arg(long)]
        check_box_id: bool,
    },

    /// Evaluate a time region of interest (times in seconds)
    Roi {
        /// Use-intervals as start:stop
        #[arg(long = "use", value_parser = parse_interval, allow_hyphen_values = true)]
        use_intervals: Vec<(f64, f64)>,

        /// Masked intervals as start:stop
        #[arg(long, value_parser = parse_interval, allow_hyphen_values = true)]
        mask: Vec<(f64, f64)>,

        /// Intersect with this interval
        #[arg(long, value_parser = parse_interval, allow_hyphen_values = true)]
        intersect: Vec<(f64, f64)>,

        /// Union with this interval
        #[arg(long, value_parser = parse_interval, allow_hyphen_values = true)]
        union: Vec<(f64, f64)>,
    },
}

fn parse_split_into(text: &str) -> std::result::Result<SplitInto, String> {
    SplitInto::parse(text).map_err(|e| e.to_string())
}

fn parse_interval(text: &str) -> std::result::Result<(f64, f64), String> {
    let (start, stop) = text
        .split_once(':')
        .ok_or_else(|| format!("expected start:stop, got {text:?}"))?;
    let start = start.trim().parse::<f64>().map_err(|e| e.to_string())?;
    let stop = stop.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Ok((start, stop))
}

impl TreeArgs {
    fn controller_config(&self) -> Result<BoxControllerConfig> {
        let mut config = match &self.config {
            Some(path) => BoxControllerConfig::from_file(path)?,
            None => BoxControllerConfig::default(),
        };
        if let Some(split_into) = &self.split_into {
            config = config.with_split_into(split_into.clone());
        }
        if let Some(threshold) = self.split_threshold {
            config = config.with_split_threshold(threshold);
        }
        if let Some(depth) = self.max_depth {
            config = config.with_max_depth(depth);
        }
        if let Some(depth) = self.min_depth {
            config = config.with_min_depth(depth);
        }
        if self.drop_out_of_bounds {
            config = config.with_out_of_bounds(OutOfBoundsPolicy::Drop);
        }
        if self.parallel {
            config = config.with_parallel(true);
        }
        Ok(config)
    }

    fn descriptor(&self) -> Result<WorkspaceDescriptor> {
        let mut descriptor = WorkspaceDescriptor::from_ranges(&self.min, &self.max, self.n_bins)?;
        descriptor.build_dim_names();
        Ok(descriptor)
    }

    fn workspace(&self) -> Result<MdEventWorkspace> {
        Ok(MdEventWorkspace::new(self.descriptor()?, self.controller_config()?)?)
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

fn read_events(path: &Path) -> Result<EventBatch> {
    if is_csv(path) {
        Ok(read_events_csv(path)?)
    } else {
        Ok(EventFileReader::open(path)?.read_batch()?)
    }
}

fn load(path: &Path, tree: &TreeArgs) -> Result<MdEventWorkspace> {
    let mut workspace = tree.workspace()?;
    let events = read_events(path)?;
    if events.num_dims() != workspace.num_dims() && !events.is_empty() {
        return Err(CliError::Argument(format!(
            "{} holds {}-dimensional events but {} ranges were given",
            path.display(),
            events.num_dims(),
            workspace.num_dims()
        )));
    }
    let progress = Progress::new(events.len()).with_callback(|done, total| {
        log::debug!("inserted {done}/{total} events");
    });
    workspace.add_events(&events, &progress)?;
    Ok(workspace)
}

fn seconds(value: f64) -> DateAndTime {
    DateAndTime::from_seconds(value)
}

fn roi_of(intervals: &[(f64, f64)]) -> Result<TimeRoi> {
    let mut roi = TimeRoi::new();
    for &(start, stop) in intervals {
        roi.add_roi(seconds(start), seconds(stop))?;
    }
    Ok(roi)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Build {
            input,
            tree,
            output,
            histogram,
            spill,
            memory_budget_mb,
            json,
        } => {
            let start = Instant::now();
            let mut workspace = tree.workspace()?;
            if let Some(path) = &spill {
                let store: Arc<dyn EventStore> = Arc::new(FileEventStore::create(path)?);
                workspace = workspace.with_store(store);
            }
            let events = read_events(&input)?;
            let progress = Progress::new(events.len()).with_callback(|done, total| {
                log::debug!("inserted {done}/{total} events");
            });
            workspace.add_events(&events, &progress)?;
            drop(events);

            if let Some(mb) = memory_budget_mb {
                let config = OutOfCoreConfig::default().with_memory_budget_bytes(mb * 1024 * 1024);
                enforce_memory_budget(workspace.tree(), &config)?;
            }
            let elapsed = start.elapsed().as_secs_f64();

            let tree_ref = workspace.tree();
            if json {
                let summary = serde_json::json!({
                    "input": input.display().to_string(),
                    "dimensions": workspace.num_dims(),
                    "events": tree_ref.n_points(),
                    "dropped": tree_ref.dropped_events(),
                    "boxes": tree_ref.box_count(),
                    "leaves": tree_ref.leaves().len(),
                    "max_depth": tree_ref.max_depth_reached(),
                    "total_signal": tree_ref.total_signal(),
                    "resident_events": tree_ref.resident_events(),
                    "seconds": elapsed,
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Events:     {}", tree_ref.n_points());
                println!("Dropped:    {}", tree_ref.dropped_events());
                println!("Boxes:      {} ({} leaves)", tree_ref.box_count(), tree_ref.leaves().len());
                println!("Max depth:  {}", tree_ref.max_depth_reached());
                println!("Signal:     {}", tree_ref.total_signal());
                println!("Resident:   {}", tree_ref.resident_events());
                println!("Time:       {:.3}s", elapsed);
            }

            if let Some(path) = output {
                let events = tree_ref.collect_events()?;
                let mut writer = EventFileWriter::create(&path)?;
                if is_csv(&path) {
                    writer.write_events_csv(&events)?;
                } else {
                    writer.write_events_binary(&events)?;
                }
                log::info!("wrote {} events to {}", events.len(), path.display());
            }
            if let Some(path) = histogram {
                let histo = bin_workspace(&workspace)?;
                EventFileWriter::create(&path)?.write_histo_csv(histo.grid())?;
                log::info!("wrote {} bins to {}", histo.grid().len(), path.display());
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Compare {
            first,
            second,
            tree,
            tolerance,
            no_events,
            check_box_id,
        } => {
            let a = load(&first, &tree)?;
            let b = load(&second, &tree)?;
            let options = CompareOptions::new()
                .with_tolerance(tolerance)
                .with_check_events(!no_events)
                .with_ignore_box_id(!check_box_id);
            let outcome = compare_workspaces(&a, &b, &options);
            println!("{}", outcome.message);
            Ok(if outcome.equals {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }

        Commands::Roi {
            use_intervals,
            mask,
            intersect,
            union,
        } => {
            let mut roi = roi_of(&use_intervals)?;
            for &(start, stop) in &mask {
                roi.add_mask(seconds(start), seconds(stop))?;
            }
            if !intersect.is_empty() {
                roi.update_intersection(&roi_of(&intersect)?);
            }
            if !union.is_empty() {
                roi.update_union(&roi_of(&union)?);
            }
            roi.remove_redundant_entries();

            print!("{roi}");
            for (start, stop) in roi.to_rois() {
                match stop {
                    Some(stop) => println!("use [{}, {})", start.seconds(), stop.seconds()),
                    None => println!("use [{}, ...)", start.seconds()),
                }
            }
            println!("Duration: {} s", roi.duration_in_seconds());
            Ok(ExitCode::SUCCESS)
        }
    }
}
