//! Levenberg–Marquardt nonlinear least squares.
//!
//! Minimizes `Σ (y_i - f(x_i; p))^2` for a model implementing
//! [`LeastSquaresModel`]. Each iteration solves the damped normal equations in
//! their augmented form
//!
//! ```text
//! [ J            ]       [ r ]
//! [ sqrt(λ D)    ] δ  ≈  [ 0 ]
//! ```
//!
//! with `D = diag(JᵀJ)` (Marquardt scaling), so parameters with very different
//! magnitudes (volts vs. counts) are damped evenly. Successful steps shrink `λ`,
//! rejected steps grow it.

use nalgebra::{DMatrix, DVector};

use crate::math::solve_least_squares;

/// A model that can be fitted by [`levenberg_marquardt`].
pub trait LeastSquaresModel {
    /// Number of free parameters.
    fn param_len(&self) -> usize;
    /// Model value at `x`.
    fn value(&self, x: f64, p: &[f64]) -> f64;
    /// Partial derivatives of the model value with respect to each parameter.
    fn gradient(&self, x: f64, p: &[f64], out: &mut [f64]);
}

/// Solver tolerances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmOptions {
    /// Relative reduction of the sum of squares below which we stop.
    pub ftol: f64,
    /// Relative step size below which we stop, applied to each parameter.
    pub xtol: f64,
    /// Maximum number of model evaluations over the whole data set.
    pub max_evaluations: usize,
    pub initial_lambda: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        // Tolerances and evaluation budget follow the usual MINPACK defaults
        // (sqrt(machine eps), 200 * (n_params + 1)).
        Self {
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            max_evaluations: 800,
            initial_lambda: 1e-3,
        }
    }
}

/// Converged solution.
#[derive(Debug, Clone)]
pub struct LmReport {
    pub params: DVector<f64>,
    pub sse: f64,
    pub evaluations: usize,
    pub iterations: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LmError {
    #[error("{points} data points cannot determine {params} parameters")]
    Underdetermined { points: usize, params: usize },
    #[error("non-finite residuals at {stage}")]
    NonFinite { stage: &'static str },
    #[error("no convergence after {evaluations} evaluations")]
    NotConverged { evaluations: usize },
}

const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;

/// Fit `model` to `(x, y)` starting from `p0`.
pub fn levenberg_marquardt<M: LeastSquaresModel>(
    model: &M,
    x: &[f64],
    y: &[f64],
    p0: &[f64],
    opts: &LmOptions,
) -> Result<LmReport, LmError> {
    let m = model.param_len();
    let n = x.len().min(y.len());
    if n < m || p0.len() != m {
        return Err(LmError::Underdetermined { points: n, params: m });
    }

    let mut p = DVector::from_column_slice(p0);
    let mut r = residuals(model, &x[..n], &y[..n], p.as_slice());
    let mut sse = r.norm_squared();
    let mut evaluations = 1;
    if !sse.is_finite() {
        return Err(LmError::NonFinite { stage: "initial guess" });
    }

    // Residuals this small relative to the data are an exact fit.
    let scale = y[..n].iter().map(|v| v * v).sum::<f64>().max(f64::MIN_POSITIVE);
    let exact = scale * 1e-28;

    let mut lambda = opts.initial_lambda;
    let mut iterations = 0;

    loop {
        if sse <= exact {
            return Ok(LmReport { params: p, sse, evaluations, iterations });
        }
        iterations += 1;

        let jac = jacobian(model, &x[..n], p.as_slice());
        let diag = damping_diagonal(&jac);

        // Inner loop: raise λ until a step reduces the sum of squares.
        loop {
            if evaluations >= opts.max_evaluations {
                return Err(LmError::NotConverged { evaluations });
            }

            let mut a = DMatrix::<f64>::zeros(n + m, m);
            let mut b = DVector::<f64>::zeros(n + m);
            a.view_mut((0, 0), (n, m)).copy_from(&jac);
            b.rows_mut(0, n).copy_from(&r);
            for j in 0..m {
                a[(n + j, j)] = (lambda * diag[j]).sqrt();
            }

            let Some(delta) = solve_least_squares(&a, &b) else {
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    return Err(LmError::NotConverged { evaluations });
                }
                continue;
            };

            let step_small = step_is_small(&delta, &p, opts.xtol);
            let p_new = &p + &delta;
            let r_new = residuals(model, &x[..n], &y[..n], p_new.as_slice());
            let sse_new = r_new.norm_squared();
            evaluations += 1;

            if sse_new.is_finite() && sse_new < sse {
                let reduction = sse - sse_new;
                p = p_new;
                r = r_new;
                sse = sse_new;
                lambda = (lambda / 10.0).max(LAMBDA_MIN);

                if reduction <= opts.ftol * (sse + reduction) || step_small || sse <= exact {
                    return Ok(LmReport { params: p, sse, evaluations, iterations });
                }
                break;
            }

            // No nearby point improves the fit: the current point is the minimum
            // at the requested resolution.
            if step_small {
                return Ok(LmReport { params: p, sse, evaluations, iterations });
            }

            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                return Err(LmError::NotConverged { evaluations });
            }
        }
    }
}

/// Parameters carry different units (volts, counts), so each one must have
/// stopped moving relative to its own magnitude.
fn step_is_small(delta: &DVector<f64>, p: &DVector<f64>, xtol: f64) -> bool {
    delta
        .iter()
        .zip(p.iter())
        .all(|(d, p)| d.abs() <= xtol * (p.abs() + xtol))
}

fn residuals<M: LeastSquaresModel>(model: &M, x: &[f64], y: &[f64], p: &[f64]) -> DVector<f64> {
    DVector::from_iterator(
        x.len(),
        x.iter().zip(y.iter()).map(|(&xi, &yi)| yi - model.value(xi, p)),
    )
}

fn jacobian<M: LeastSquaresModel>(model: &M, x: &[f64], p: &[f64]) -> DMatrix<f64> {
    let m = model.param_len();
    let mut jac = DMatrix::<f64>::zeros(x.len(), m);
    let mut row = vec![0.0; m];
    for (i, &xi) in x.iter().enumerate() {
        model.gradient(xi, p, &mut row);
        for j in 0..m {
            jac[(i, j)] = row[j];
        }
    }
    jac
}

/// Column sums of squares of the Jacobian, floored so that a parameter the data
/// does not constrain is still damped.
fn damping_diagonal(jac: &DMatrix<f64>) -> Vec<f64> {
    let cols: Vec<f64> = jac.column_iter().map(|c| c.norm_squared()).collect();
    let max = cols.iter().copied().filter(|v| v.is_finite()).fold(0.0, f64::max);
    let floor = if max > 0.0 { max * 1e-12 } else { 1.0 };
    cols.into_iter()
        .map(|v| if v.is_finite() { v.max(floor) } else { floor })
        .collect()
}
