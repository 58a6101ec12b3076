//! Shared optimization pipeline used by the `run` and `track` commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! settings -> validated config -> simulated instrument -> 3-axis run
//!
//! The commands can then focus on presentation and persistence.

use std::path::PathBuf;

use log::debug;

use crate::cli::{SettingsArgs, SimArgs};
use crate::domain::{Axis, OptimizationRun, OptimizerConfig};
use crate::error::AppError;
use crate::instrument::{Instrument, SimulationConfig};
use crate::optimize::{InstrumentChange, Optimizer3D, OptimizerEvent, RunControl};
use crate::settings::{JsonSettings, MemorySettings, settings_path_from_env};

/// Read settings (file or defaults), apply CLI overrides and validate.
pub fn load_config(args: &SettingsArgs) -> Result<OptimizerConfig, AppError> {
    let path: Option<PathBuf> = args.settings.clone().or_else(settings_path_from_env);
    let mut config = match &path {
        Some(path) => {
            debug!("reading settings from {}", path.display());
            OptimizerConfig::from_store(&JsonSettings::load(path)?)?
        }
        None => OptimizerConfig::from_store(&MemorySettings::new())?,
    };

    for (axis, range) in Axis::ALL.into_iter().zip([args.range_x, args.range_y, args.range_z]) {
        if let Some(range) = range {
            config.ranges[axis.index()] = range;
        }
    }
    if let Some(points) = args.points {
        config.scan_points = points;
    }
    if let Some(ms) = args.count_time {
        config.count_time_ms = ms;
    }
    if let Some(fraction) = args.threshold {
        config.threshold_fraction = fraction;
    }

    config.validate()?;
    Ok(config)
}

/// Build the simulated instrument parameters from CLI values.
pub fn simulation_config(args: &SimArgs) -> Result<SimulationConfig, AppError> {
    let sim = SimulationConfig {
        start: triplet(&args.start, "--start")?,
        spot_center: triplet(&args.spot, "--spot")?,
        spot_sigma: triplet(&args.sigma, "--sigma")?,
        drift: triplet(&args.drift, "--drift")?,
        peak_rate: args.peak_rate,
        background_rate: args.background_rate,
        shot_noise: !args.no_noise,
        seed: args.seed,
        ..SimulationConfig::default()
    };

    if sim.spot_sigma.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
        return Err(AppError::config("--sigma values must be finite and > 0."));
    }
    if !(sim.peak_rate.is_finite() && sim.peak_rate >= 0.0)
        || !(sim.background_rate.is_finite() && sim.background_rate >= 0.0)
    {
        return Err(AppError::config("Count rates must be finite and >= 0."));
    }
    Ok(sim)
}

fn triplet(values: &[f64], name: &str) -> Result<[f64; 3], AppError> {
    match values {
        &[x, y, z] if x.is_finite() && y.is_finite() && z.is_finite() => Ok([x, y, z]),
        _ => Err(AppError::config(format!(
            "{name} expects three finite values 'x,y,z' (got {values:?})."
        ))),
    }
}

/// Execute one 3-axis optimization.
pub fn run_optimization<I: Instrument + ?Sized>(
    config: &OptimizerConfig,
    instrument: &mut I,
    control: &mut dyn RunControl,
) -> Result<OptimizationRun, AppError> {
    let mut optimizer = Optimizer3D::new(config.clone())?;
    optimizer.subscribe(|event| match event {
        OptimizerEvent::StateChanged(state) => debug!("state -> {state:?}"),
        OptimizerEvent::InstrumentChanged(InstrumentChange::AcquisitionPrepared { count_time }) => {
            debug!("acquisition prepared ({count_time:?})")
        }
        _ => {}
    });
    let run = optimizer.run(instrument, control)?;
    Ok(run)
}
