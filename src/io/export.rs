//! Export per-point scan data to CSV.
//!
//! One row per acquired point, with the fitted and initial-guess model values
//! alongside, so scans can be inspected in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::OptimizationRun;
use crate::error::{AppError, EXIT_INTERNAL};
use crate::models::evaluate_params;

/// Write every scan point of `run` to a CSV file.
pub fn write_scan_csv(path: &Path, run: &OptimizationRun) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(EXIT_INTERNAL, format!("Failed to create scan CSV '{}': {e}", path.display()))
    })?;
    let mut out = BufWriter::new(file);
    write_scan_rows(&mut out, run)?;
    out.flush()
        .map_err(|e| AppError::new(EXIT_INTERNAL, format!("Failed to write scan CSV: {e}")))
}

fn write_scan_rows<W: Write>(out: &mut W, run: &OptimizationRun) -> Result<(), AppError> {
    writeln!(out, "axis,index,voltage,counts,fit_counts,guess_counts,chosen_voltage")
        .map_err(|e| AppError::new(EXIT_INTERNAL, format!("Failed to write scan CSV header: {e}")))?;

    for o in &run.outcomes {
        let params = o.fit.as_ref().and_then(|f| f.params());
        let guess = o.fit.as_ref().map(|f| f.initial_guess);
        for (i, (&v, &c)) in o.scan.voltages.iter().zip(&o.scan.counts).enumerate() {
            writeln!(
                out,
                "{},{},{:.9},{},{},{},{}",
                o.axis,
                i,
                v,
                c,
                params.map(|p| format!("{:.4}", evaluate_params(v, &p))).unwrap_or_default(),
                guess.map(|p| format!("{:.4}", evaluate_params(v, &p))).unwrap_or_default(),
                o.applied_voltage().map(|x| format!("{x:.9}")).unwrap_or_default(),
            )
            .map_err(|e| AppError::new(EXIT_INTERNAL, format!("Failed to write scan CSV row: {e}")))?;
        }
    }

    Ok(())
}
