//! Command-line parsing for the confocal position optimizer.
//!
//! Argument parsing and command dispatch stay separate from the optimizer
//! core: everything here only produces plain values for `app`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub mod keys;

pub use keys::KeyWatcher;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "optimize", version, about = "Confocal position optimizer (x, y, z peak search)")]
pub struct Cli {
    /// Log level for the log file (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Directory for log files.
    #[arg(long, global = true, default_value = "logs")]
    pub log_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one x, y, z optimization and print the result (default).
    Run(RunArgs),
    /// Watch the count rate and re-optimize whenever it drops below the threshold.
    Track(TrackArgs),
    /// Re-render a saved run JSON.
    Show(ShowArgs),
    /// Print the per-axis position history.
    History(HistoryArgs),
}

/// Optimizer settings and their command-line overrides.
#[derive(Debug, Args, Clone, Default)]
pub struct SettingsArgs {
    /// Settings JSON file (flat object with `Range_Vx`, `Scan_points`, ...).
    ///
    /// Defaults to `$OPTIMIZER_SETTINGS` (also read from `.env`).
    #[arg(long, value_name = "JSON")]
    pub settings: Option<PathBuf>,

    /// Scan range on x (V), overrides `Range_Vx`.
    #[arg(long)]
    pub range_x: Option<f64>,

    /// Scan range on y (V), overrides `Range_Vy`.
    #[arg(long)]
    pub range_y: Option<f64>,

    /// Scan range on z (V), overrides `Range_Vz`.
    #[arg(long)]
    pub range_z: Option<f64>,

    /// Points per axis scan, overrides `Scan_points`.
    #[arg(short = 'n', long)]
    pub points: Option<usize>,

    /// Integration time per point in ms, overrides `Count_time`.
    #[arg(long)]
    pub count_time: Option<f64>,

    /// Re-optimization threshold as a fraction of the last peak, overrides `Threshold_fraction`.
    #[arg(long)]
    pub threshold: Option<f64>,
}

/// Simulated instrument parameters.
#[derive(Debug, Args, Clone)]
pub struct SimArgs {
    /// Initially applied voltages `x,y,z`.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, default_value = "0,0,0")]
    pub start: Vec<f64>,

    /// Spot position `x,y,z` (V).
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, default_value = "0.012,-0.008,0.02")]
    pub spot: Vec<f64>,

    /// Spot standard deviation `x,y,z` (V).
    #[arg(long, value_delimiter = ',', default_value = "0.05,0.05,0.12")]
    pub sigma: Vec<f64>,

    /// Spot drift per acquisition `x,y,z` (V).
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, default_value = "0,0,0")]
    pub drift: Vec<f64>,

    /// Count rate at the spot center (counts/s).
    #[arg(long, default_value_t = 60_000.0)]
    pub peak_rate: f64,

    /// Background count rate (counts/s).
    #[arg(long, default_value_t = 2_000.0)]
    pub background_rate: f64,

    /// Random seed for shot noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Disable Poisson shot noise.
    #[arg(long)]
    pub no_noise: bool,
}

/// Options for a single optimization.
#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(flatten)]
    pub sim: SimArgs,

    /// Render ASCII plots of every axis scan (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the terminal plots.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 72)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 16)]
    pub height: usize,

    /// Export the run (config, scans, fits) to JSON.
    #[arg(long = "export-run", value_name = "JSON")]
    pub export_run: Option<PathBuf>,

    /// Export every scan point to CSV.
    #[arg(long = "export-scan", value_name = "CSV")]
    pub export_scan: Option<PathBuf>,

    /// Append the applied voltages to this position history file.
    #[arg(long, value_name = "JSON")]
    pub history: Option<PathBuf>,

    /// Cancel with `q`/`Esc` while the run is in progress.
    #[arg(long)]
    pub watch_keys: bool,
}

/// Options for tracking mode.
#[derive(Debug, Args, Clone)]
pub struct TrackArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(flatten)]
    pub sim: SimArgs,

    /// Number of measure/re-optimize cycles.
    #[arg(long, default_value_t = 10)]
    pub cycles: usize,

    /// Append applied voltages to this position history file.
    #[arg(long, value_name = "JSON")]
    pub history: Option<PathBuf>,

    /// Cancel with `q`/`Esc` while tracking.
    #[arg(long)]
    pub watch_keys: bool,
}

/// Options for re-rendering a saved run.
#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Run JSON produced by `optimize run --export-run`.
    #[arg(long, value_name = "JSON")]
    pub run: PathBuf,

    /// Disable the terminal plots.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 72)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 16)]
    pub height: usize,
}

/// Options for printing the position history.
#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// History JSON file.
    #[arg(long, value_name = "JSON")]
    pub file: PathBuf,

    /// Only show the most recent N entries per axis.
    #[arg(long)]
    pub last: Option<usize>,
}
