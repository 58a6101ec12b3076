//! Peak fitting for a single scan.
//!
//! Given the scan's `(voltage, count)` series and the pre-scan voltage:
//! - seed the inverted-parabola model with the endpoint heuristic
//! - refine it by Levenberg–Marquardt
//! - clamp the fitted center into the scanned bounds
//!
//! Every failure (too few points, flat data, solver trouble) is recorded on the
//! result and the pre-scan voltage is chosen instead, so a fit never blocks a
//! run.

use log::{debug, warn};

use crate::domain::{ClampSide, FitFailure, FitResult, FitStatus, PeakParams, ScanResult};
use crate::math::{LmError, LmOptions, levenberg_marquardt};
use crate::models::{InvertedParabola, initial_guess};

/// Fitting options.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FitOptions {
    pub solver: LmOptions,
}

/// Fit the peak model to `scan` and pick the voltage to apply.
pub fn fit_peak(scan: &ScanResult, center_hint: f64, opts: &FitOptions) -> FitResult {
    let voltages = &scan.voltages;
    let counts = scan.counts_f64();
    let guess = initial_guess(voltages, &counts, center_hint);

    let (v_min, v_max) = scan.observed_bounds().unwrap_or((scan.v_min, scan.v_max));

    match try_fit(voltages, &counts, &guess, opts) {
        Ok((params, evaluations, rmse)) => {
            let (chosen_voltage, clamped) = clamp_center(params.center, v_min, v_max);
            match clamped {
                Some(side) => warn!(
                    "fit {}: center {:.6} V outside [{v_min:.6}, {v_max:.6}], using {side:?} bound",
                    scan.axis, params.center
                ),
                None => debug!(
                    "fit {}: center={:.6} width={:.6} height={:.2} ({evaluations} evaluations)",
                    scan.axis, params.center, params.width, params.height
                ),
            }
            FitResult {
                status: FitStatus::Converged {
                    params,
                    evaluations,
                    rmse,
                    clamped,
                },
                chosen_voltage,
                initial_guess: guess,
            }
        }
        Err(failure) => {
            let (chosen_voltage, _) = clamp_center(center_hint, v_min, v_max);
            warn!(
                "fit {}: {failure}; keeping pre-scan voltage {chosen_voltage:.6} V",
                scan.axis
            );
            FitResult {
                status: FitStatus::Failed { failure },
                chosen_voltage,
                initial_guess: guess,
            }
        }
    }
}

fn try_fit(
    voltages: &[f64],
    counts: &[f64],
    guess: &PeakParams,
    opts: &FitOptions,
) -> Result<(PeakParams, usize, f64), FitFailure> {
    let n = voltages.len().min(counts.len());
    let model = InvertedParabola;
    let params_len = 3;
    if n < params_len {
        return Err(FitFailure::InsufficientData {
            points: n,
            params: params_len,
        });
    }

    let first = counts[0];
    if counts[..n].iter().all(|&c| c == first) {
        return Err(FitFailure::FlatSignal);
    }

    if !guess.is_finite() {
        return Err(FitFailure::DegenerateGuess {
            reason: "non-finite starting parameters".to_string(),
        });
    }
    if guess.width == 0.0 {
        return Err(FitFailure::DegenerateGuess {
            reason: "zero voltage span".to_string(),
        });
    }

    let report = levenberg_marquardt(
        &model,
        &voltages[..n],
        &counts[..n],
        &guess.to_array(),
        &opts.solver,
    )
    .map_err(|e| match e {
        LmError::Underdetermined { points, params } => FitFailure::InsufficientData { points, params },
        LmError::NonFinite { stage } => FitFailure::Numerical {
            reason: format!("non-finite residuals at {stage}"),
        },
        LmError::NotConverged { evaluations } => FitFailure::NotConverged { evaluations },
    })?;

    let mut params = PeakParams::from_slice(report.params.as_slice());
    params.width = params.width.abs();
    if !params.is_finite() || params.width == 0.0 {
        return Err(FitFailure::Numerical {
            reason: format!(
                "degenerate parameters (center={}, width={}, height={})",
                params.center, params.width, params.height
            ),
        });
    }

    let rmse = (report.sse / n as f64).sqrt();
    Ok((params, report.evaluations, rmse))
}

/// Restrict `v` to `[v_min, v_max]`, reporting which bound was hit.
pub fn clamp_center(v: f64, v_min: f64, v_max: f64) -> (f64, Option<ClampSide>) {
    if v > v_max {
        (v_max, Some(ClampSide::Max))
    } else if v < v_min {
        (v_min, Some(ClampSide::Min))
    } else {
        (v, None)
    }
}
