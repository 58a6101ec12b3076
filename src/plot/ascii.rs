//! ASCII plotting of one axis scan for terminal output.
//!
//! Fixed-size character grid with deterministic output (golden-tested).
//!
//! Plot elements:
//! - scan data: `o`
//! - fitted model: `-` line
//! - initial guess: `.` line
//! - chosen voltage: `*` (at the fitted height, or the mean count when the fit failed)

use crate::domain::{AxisOutcome, FitResult, OptimizationRun, PeakParams, ScanResult};
use crate::models::evaluate_params;

/// Render every axis of a run, one plot per axis.
pub fn render_run_plots(run: &OptimizationRun, width: usize, height: usize) -> String {
    run.outcomes
        .iter()
        .map(|o| render_axis_plot(o, width, height))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the scan of one axis with its fit overlays.
pub fn render_axis_plot(outcome: &AxisOutcome, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);
    let scan = &outcome.scan;

    let (v_min, v_max) = voltage_range(scan);
    let data: Vec<(f64, f64)> = scan
        .voltages
        .iter()
        .zip(&scan.counts)
        .map(|(&v, &c)| (v, c as f64))
        .collect();
    let fitted = outcome
        .fit
        .as_ref()
        .and_then(FitResult::params)
        .map(|p| sample_model(&p, v_min, v_max, width));
    let guess = outcome
        .fit
        .as_ref()
        .map(|f| sample_model(&f.initial_guess, v_min, v_max, width));
    let chosen = outcome.fit.as_ref().and_then(|f| chosen_point(f, scan));

    let (y_min, y_max) = y_range(&data, fitted.as_deref(), chosen).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curves first so points overlay them; the fit wins over the guess.
    if let Some(curve) = &fitted {
        draw_curve(&mut grid, curve, v_min, v_max, y_min, y_max, '-');
    }
    if let Some(curve) = &guess {
        draw_curve(&mut grid, curve, v_min, v_max, y_min, y_max, '.');
    }

    for &(v, c) in &data {
        let x = map_x(v, v_min, v_max, width);
        let y = map_y(c, y_min, y_max, height);
        grid[y][x] = 'o';
    }

    if let Some((v, c)) = chosen {
        let x = map_x(v, v_min, v_max, width);
        let y = map_y(c, y_min, y_max, height);
        grid[y][x] = '*';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Axis {}: V=[{v_min:.4}, {v_max:.4}] | counts=[{y_min:.1}, {y_max:.1}]\n",
        scan.axis
    ));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn chosen_point(fit: &FitResult, scan: &ScanResult) -> Option<(f64, f64)> {
    let y = match fit.params() {
        Some(p) => p.height,
        None => scan.mean_count()?,
    };
    Some((fit.chosen_voltage, y))
}

fn voltage_range(scan: &ScanResult) -> (f64, f64) {
    match scan.observed_bounds() {
        Some((lo, hi)) if hi > lo => (lo, hi),
        _ if scan.v_max > scan.v_min => (scan.v_min, scan.v_max),
        _ => (scan.center - 0.5, scan.center + 0.5),
    }
}

fn sample_model(params: &PeakParams, v_min: f64, v_max: f64, n: usize) -> Vec<(f64, f64)> {
    let n = n.max(2);
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let u = i as f64 / (n as f64 - 1.0);
        let v = v_min + u * (v_max - v_min);
        out.push((v, evaluate_params(v, params)));
    }
    out
}

/// Vertical extent of the data, the fitted curve and the chosen point.
///
/// The initial guess is left out; it is clipped to the frame instead.
fn y_range(data: &[(f64, f64)], fitted: Option<&[(f64, f64)]>, chosen: Option<(f64, f64)>) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    let fitted = fitted.unwrap_or(&[]);
    for &(_, y) in data.iter().chain(fitted).chain(chosen.iter()) {
        if y.is_finite() {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }

    if !(min_y.is_finite() && max_y.is_finite()) {
        None
    } else if max_y > min_y {
        Some((min_y, max_y))
    } else {
        Some((min_y - 0.5, max_y + 0.5))
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(v: f64, v_min: f64, v_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((v - v_min) / (v_max - v_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(
    grid: &mut [Vec<char>],
    curve: &[(f64, f64)],
    v_min: f64,
    v_max: f64,
    y_min: f64,
    y_max: f64,
    ch: char,
) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(v, y) in curve {
        let x = map_x(v, v_min, v_max, width);
        let yy = map_y(y, y_min, y_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, yy, ch);
        } else if grid[yy][x] == ' ' {
            grid[yy][x] = ch;
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham-ish). Only fills blank cells.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Axis, FitFailure, FitStatus};

    fn scan(counts: Vec<u64>) -> ScanResult {
        ScanResult {
            axis: Axis::X,
            center: 0.0,
            v_min: -0.1,
            v_max: 0.1,
            voltages: vec![-0.1, -0.05, 0.0, 0.05, 0.1],
            counts,
            cancelled: false,
        }
    }

    #[test]
    fn plot_golden_snapshot_small() {
        let params = PeakParams {
            center: 0.0,
            width: 0.01,
            height: 1000.0,
        };
        let outcome = AxisOutcome {
            axis: Axis::X,
            scan: scan(vec![900, 975, 1000, 975, 900]),
            fit: Some(FitResult {
                status: FitStatus::Converged {
                    params,
                    evaluations: 4,
                    rmse: 0.0,
                    clamped: None,
                },
                chosen_voltage: 0.0,
                initial_guess: PeakParams { width: 0.02, ..params },
            }),
        };

        let txt = render_axis_plot(&outcome, 10, 5);
        let expected = concat!(
            "Axis x: V=[-0.1000, 0.1000] | counts=[895.0, 1005.0]\n",
            "  ..-*..  \n",
            "..o-  -o..\n",
            " -      - \n",
            " -       -\n",
            "o        o\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn failed_fit_marks_chosen_at_mean_count() {
        let outcome = AxisOutcome {
            axis: Axis::Y,
            scan: scan(vec![500; 5]),
            fit: Some(FitResult {
                status: FitStatus::Failed {
                    failure: FitFailure::FlatSignal,
                },
                chosen_voltage: 0.0,
                initial_guess: PeakParams {
                    center: 0.0,
                    width: 0.1,
                    height: 500.0,
                },
            }),
        };

        let txt = render_axis_plot(&outcome, 11, 5);
        assert!(txt.starts_with("Axis y: "));
        let rows: Vec<&str> = txt.lines().skip(1).collect();
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| !r.contains('-')));
        assert_eq!(rows[2].chars().nth(5), Some('*'));
        assert_eq!(rows[2].matches('o').count(), 4);
    }

    #[test]
    fn cancelled_scan_plots_data_only() {
        let mut s = scan(vec![10, 20]);
        s.voltages.truncate(2);
        s.cancelled = true;
        let outcome = AxisOutcome {
            axis: Axis::Z,
            scan: s,
            fit: None,
        };
        let txt = render_axis_plot(&outcome, 10, 5);
        let body: String = txt.lines().skip(1).collect();
        assert!(!body.contains('*'));
        assert_eq!(body.matches('o').count(), 2);
    }
}
