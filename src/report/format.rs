//! Formatted terminal output for runs and position history.
//!
//! Formatting lives here so the optimizer core stays free of presentation and
//! output changes stay localized.

use crate::domain::{AxisOutcome, ClampSide, FitFailure, FitStatus, OptimizationRun, OptimizerConfig};
use crate::io::history::PositionHistory;
use crate::report::axis_shifts;

/// Format the run summary: timing, configuration and one row per axis.
pub fn format_run_summary(run: &OptimizationRun, config: &OptimizerConfig) -> String {
    let mut out = String::new();

    out.push_str("=== optimize - confocal position optimization ===\n");
    out.push_str(&format!("Started: {}\n", run.started_at.format("%Y-%m-%d %H:%M:%S")));
    match run.finished_at {
        Some(end) => {
            let elapsed = (end - run.started_at).num_milliseconds() as f64 / 1e3;
            out.push_str(&format!(
                "Finished: {} ({elapsed:.2}s){}\n",
                end.format("%Y-%m-%d %H:%M:%S"),
                if run.cancelled { " [cancelled]" } else { "" }
            ));
        }
        None => out.push_str("Finished: -\n"),
    }
    out.push_str(&format!(
        "Ranges: x={} y={} z={} V | points={} | count time={} ms\n",
        config.ranges[0], config.ranges[1], config.ranges[2], config.scan_points, config.count_time_ms
    ));
    out.push('\n');

    out.push_str(&format_outcome_table(&run.outcomes));

    let shifts = axis_shifts(run);
    if !shifts.is_empty() {
        out.push('\n');
        let parts: Vec<String> = shifts
            .iter()
            .map(|s| format!("{}{:+.6}", s.axis, s.delta()))
            .collect();
        out.push_str(&format!("Shifts (V): {}\n", parts.join(" ")));
    }

    out
}

/// One row per optimized axis.
pub fn format_outcome_table(outcomes: &[AxisOutcome]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<4} {:>10} {:>21} {:>6} {:>10} {:>12} {:>10} {:<}\n",
            "axis", "center", "scan", "points", "chosen", "height", "width", "fit"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<4} {:-<10} {:-<21} {:-<6} {:-<10} {:-<12} {:-<10} {:-<16}\n",
            "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for o in outcomes {
        let scan = &o.scan;
        let params = o.fit.as_ref().and_then(|f| f.params());
        out.push_str(
            format!(
                "{:<4} {:>10.6} {:>21} {:>6} {:>10} {:>12} {:>10} {}\n",
                o.axis,
                scan.center,
                format!("[{:.4}, {:.4}]", scan.v_min, scan.v_max),
                scan.len(),
                o.applied_voltage()
                    .map(|v| format!("{v:.6}"))
                    .unwrap_or_else(|| "-".to_string()),
                params
                    .map(|p| format!("{:.1}", p.height))
                    .unwrap_or_else(|| "-".to_string()),
                params
                    .map(|p| format!("{:.6}", p.width))
                    .unwrap_or_else(|| "-".to_string()),
                format_fit_status(o),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Short human-readable fit status for one axis.
pub fn format_fit_status(outcome: &AxisOutcome) -> String {
    let Some(fit) = &outcome.fit else {
        return "cancelled".to_string();
    };
    match &fit.status {
        FitStatus::Converged {
            clamped: None, rmse, ..
        } => format!("ok (rmse {rmse:.2})"),
        FitStatus::Converged {
            clamped: Some(side), ..
        } => match side {
            ClampSide::Min => "ok, clamped to min".to_string(),
            ClampSide::Max => "ok, clamped to max".to_string(),
        },
        FitStatus::Failed { failure } => format!("failed: {}", failure_label(failure)),
    }
}

fn failure_label(failure: &FitFailure) -> &'static str {
    match failure {
        FitFailure::InsufficientData { .. } => "insufficient data",
        FitFailure::FlatSignal => "flat signal",
        FitFailure::DegenerateGuess { .. } => "degenerate guess",
        FitFailure::NotConverged { .. } => "not converged",
        FitFailure::Numerical { .. } => "numerical error",
    }
}

/// Format the per-axis position history, most recent last.
pub fn format_history(history: &PositionHistory, last: Option<usize>) -> String {
    let mut out = String::new();
    for (axis, entries) in history.axes() {
        out.push_str(&format!("Axis {axis} ({} entries)\n", entries.len()));
        if entries.is_empty() {
            continue;
        }
        out.push_str(format!("{:>6} {:>12} {:<}\n", "index", "voltage", "timestamp").trim_end());
        out.push('\n');
        let skip = last.map_or(0, |n| entries.len().saturating_sub(n));
        for e in entries.iter().skip(skip) {
            out.push_str(&format!(
                "{:>6} {:>12.6} {}\n",
                e.index,
                e.voltage,
                e.timestamp.format("%Y-%m-%d %H:%M:%S")
            ));
        }
    }
    out
}
