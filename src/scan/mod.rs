//! Single-axis voltage sweep.
//!
//! The scanner owns nothing: it generates the voltage grid, calls `acquire` once
//! per point in ascending order, and checks the run control before each
//! acquisition.

use log::{debug, warn};

use crate::domain::{AxisConfig, ScanResult};
use crate::optimize::RunControl;

/// `n` evenly spaced values over `[min, max]`, both endpoints included exactly.
pub fn linspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let step = (max - min) / (n as f64 - 1.0);
            let mut out: Vec<f64> = (0..n).map(|i| min + step * i as f64).collect();
            out[n - 1] = max;
            out
        }
    }
}

/// Voltage grid for `config`.
pub fn scan_voltages(config: &AxisConfig) -> Vec<f64> {
    linspace(config.v_min(), config.v_max(), config.points)
}

/// Sweep one axis.
///
/// `acquire` applies the voltage and blocks until a count is available. Any
/// error it returns aborts the scan and is passed through unchanged.
///
/// When the control reports cancellation, the scan stops before the next
/// acquisition and returns the points collected so far, marked cancelled.
pub fn scan<E, A>(
    config: &AxisConfig,
    mut acquire: A,
    control: &mut dyn RunControl,
) -> Result<ScanResult, E>
where
    A: FnMut(f64) -> Result<u64, E>,
{
    let grid = scan_voltages(config);
    let mut voltages = Vec::with_capacity(grid.len());
    let mut counts = Vec::with_capacity(grid.len());
    let mut cancelled = false;

    for v in grid {
        if control.cancelled() {
            warn!("scan {} cancelled after {} points", config.axis, voltages.len());
            cancelled = true;
            break;
        }
        let count = acquire(v)?;
        debug!("scan {}: V={v:.6} counts={count}", config.axis);
        voltages.push(v);
        counts.push(count);
        control.yield_now();
    }

    Ok(ScanResult {
        axis: config.axis,
        center: config.center,
        v_min: config.v_min(),
        v_max: config.v_max(),
        voltages,
        counts,
        cancelled,
    })
}
