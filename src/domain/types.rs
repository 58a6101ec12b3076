//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during a run
//! - exported to JSON for later inspection
//! - reloaded for re-rendering plots and summaries

use chrono::{DateTime, Local};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Minimum number of scan points (three free parameters in the peak model).
pub const MIN_SCAN_POINTS: usize = 3;

/// One of the three voltage-controlled actuation directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Optimization order used by a full run.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }

    /// Settings key holding this axis's scan range.
    pub fn range_key(self) -> &'static str {
        match self {
            Axis::X => "Range_Vx",
            Axis::Y => "Range_Vy",
            Axis::Z => "Range_Vz",
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.label())
    }
}

/// Scan configuration for one axis.
///
/// `range` is the configured range value. The scan covers
/// `[center - range/2, center + range/2]`, so the actual span equals `range`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    pub axis: Axis,
    pub center: f64,
    pub range: f64,
    pub points: usize,
}

impl AxisConfig {
    pub fn new(axis: Axis, center: f64, range: f64, points: usize) -> Result<Self, AppError> {
        if !center.is_finite() {
            return Err(AppError::config(format!(
                "Axis {axis}: center voltage must be finite (got {center})."
            )));
        }
        if !(range.is_finite() && range >= 0.0) {
            return Err(AppError::config(format!(
                "Axis {axis}: range must be finite and >= 0 (got {range})."
            )));
        }
        if points < MIN_SCAN_POINTS {
            return Err(AppError::config(format!(
                "Axis {axis}: scan needs at least {MIN_SCAN_POINTS} points (got {points})."
            )));
        }
        Ok(Self {
            axis,
            center,
            range,
            points,
        })
    }

    pub fn v_min(&self) -> f64 {
        self.center - self.range / 2.0
    }

    pub fn v_max(&self) -> f64 {
        self.center + self.range / 2.0
    }
}

/// Raw scan data for one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub axis: Axis,
    /// Voltage the scan was centered on (the pre-scan voltage).
    pub center: f64,
    /// Requested lower bound.
    pub v_min: f64,
    /// Requested upper bound.
    pub v_max: f64,
    pub voltages: Vec<f64>,
    pub counts: Vec<u64>,
    pub cancelled: bool,
}

impl ScanResult {
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Counts as floats, in scan order.
    pub fn counts_f64(&self) -> Vec<f64> {
        self.counts.iter().map(|&c| c as f64).collect()
    }

    pub fn mean_count(&self) -> Option<f64> {
        if self.counts.is_empty() {
            return None;
        }
        Some(self.counts.iter().map(|&c| c as f64).sum::<f64>() / self.counts.len() as f64)
    }

    /// Bounds actually covered by the collected points.
    pub fn observed_bounds(&self) -> Option<(f64, f64)> {
        let first = *self.voltages.first()?;
        let last = *self.voltages.last()?;
        Some((first.min(last), first.max(last)))
    }
}

/// Inverted-parabola parameters: `height - ((v - center) / width)^2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakParams {
    pub center: f64,
    pub width: f64,
    pub height: f64,
}

impl PeakParams {
    pub fn to_array(self) -> [f64; 3] {
        [self.center, self.width, self.height]
    }

    pub fn from_slice(p: &[f64]) -> Self {
        Self {
            center: p[0],
            width: p[1],
            height: p[2],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.center.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// Why a fit was rejected. The fitter records this instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitFailure {
    #[error("insufficient data: {points} points for {params} parameters")]
    InsufficientData { points: usize, params: usize },
    #[error("flat signal: all counts are equal")]
    FlatSignal,
    #[error("degenerate initial guess: {reason}")]
    DegenerateGuess { reason: String },
    #[error("solver did not converge after {evaluations} evaluations")]
    NotConverged { evaluations: usize },
    #[error("numerical error: {reason}")]
    Numerical { reason: String },
}

/// Which scan bound the fitted center was clamped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClampSide {
    Min,
    Max,
}

/// Fit outcome status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FitStatus {
    Converged {
        params: PeakParams,
        evaluations: usize,
        rmse: f64,
        clamped: Option<ClampSide>,
    },
    Failed {
        failure: FitFailure,
    },
}

/// Peak fit output for one scan.
///
/// `chosen_voltage` always lies inside the scan bounds: it is either the
/// clamped fitted center or the pre-scan voltage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub status: FitStatus,
    pub chosen_voltage: f64,
    pub initial_guess: PeakParams,
}

impl FitResult {
    pub fn success(&self) -> bool {
        matches!(self.status, FitStatus::Converged { .. })
    }

    pub fn params(&self) -> Option<PeakParams> {
        match &self.status {
            FitStatus::Converged { params, .. } => Some(*params),
            FitStatus::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FitFailure> {
        match &self.status {
            FitStatus::Failed { failure } => Some(failure),
            FitStatus::Converged { .. } => None,
        }
    }
}

/// Result of optimizing a single axis.
///
/// `fit` is absent when the scan was cancelled: no fit is attempted and no
/// voltage is applied in that case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisOutcome {
    pub axis: Axis,
    pub scan: ScanResult,
    pub fit: Option<FitResult>,
}

impl AxisOutcome {
    /// Voltage applied at the end of this axis, if any.
    pub fn applied_voltage(&self) -> Option<f64> {
        self.fit.as_ref().map(|f| f.chosen_voltage)
    }
}

/// One optimization run over up to three axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRun {
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub outcomes: Vec<AxisOutcome>,
    pub cancelled: bool,
}

impl OptimizationRun {
    pub fn new() -> Self {
        Self {
            started_at: Local::now(),
            finished_at: None,
            outcomes: Vec::with_capacity(Axis::ALL.len()),
            cancelled: false,
        }
    }

    pub fn outcome(&self, axis: Axis) -> Option<&AxisOutcome> {
        self.outcomes.iter().find(|o| o.axis == axis)
    }

    /// Fitted peak height of the last axis whose fit converged.
    pub fn last_peak_height(&self) -> Option<f64> {
        self.outcomes
            .iter()
            .rev()
            .filter_map(|o| o.fit.as_ref().and_then(FitResult::params))
            .map(|p| p.height)
            .next()
    }

    pub(crate) fn finish(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
        self.finished_at = Some(Local::now());
    }
}

impl Default for OptimizationRun {
    fn default() -> Self {
        Self::new()
    }
}

/// Optimizer state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running(Axis),
    Cancelled,
}

/// Validated optimizer configuration, read once at run start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Scan range per axis, indexed by `Axis::index`.
    pub ranges: [f64; 3],
    pub scan_points: usize,
    /// Integration time per count, in milliseconds.
    pub count_time_ms: f64,
    /// Re-optimize when counts fall below this fraction of the last peak.
    pub threshold_fraction: f64,
}

impl OptimizerConfig {
    pub const DEFAULT_RANGE: f64 = 0.1;
    pub const DEFAULT_SCAN_POINTS: usize = 25;
    pub const DEFAULT_COUNT_TIME_MS: f64 = 50.0;
    pub const DEFAULT_THRESHOLD_FRACTION: f64 = 0.95;

    pub fn range(&self, axis: Axis) -> f64 {
        self.ranges[axis.index()]
    }

    pub fn count_time(&self) -> std::time::Duration {
        std::time::Duration::from_nanos((self.count_time_ms * 1e6).round() as u64)
    }

    /// Build the scan configuration for `axis` centered on `center`.
    pub fn axis_config(&self, axis: Axis, center: f64) -> Result<AxisConfig, AppError> {
        AxisConfig::new(axis, center, self.range(axis), self.scan_points)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for axis in Axis::ALL {
            let range = self.range(axis);
            if !(range.is_finite() && range >= 0.0) {
                return Err(AppError::config(format!(
                    "{} must be finite and >= 0 (got {range}).",
                    axis.range_key()
                )));
            }
        }
        if self.scan_points < MIN_SCAN_POINTS {
            return Err(AppError::config(format!(
                "Scan_points must be >= {MIN_SCAN_POINTS} (got {}).",
                self.scan_points
            )));
        }
        if !(self.count_time_ms.is_finite() && self.count_time_ms > 0.0) {
            return Err(AppError::config(format!(
                "Count_time must be finite and > 0 ms (got {}).",
                self.count_time_ms
            )));
        }
        if !(self.threshold_fraction.is_finite() && self.threshold_fraction > 0.0) {
            return Err(AppError::config(format!(
                "Threshold_fraction must be finite and > 0 (got {}).",
                self.threshold_fraction
            )));
        }
        Ok(())
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            ranges: [Self::DEFAULT_RANGE; 3],
            scan_points: Self::DEFAULT_SCAN_POINTS,
            count_time_ms: Self::DEFAULT_COUNT_TIME_MS,
            threshold_fraction: Self::DEFAULT_THRESHOLD_FRACTION,
        }
    }
}
