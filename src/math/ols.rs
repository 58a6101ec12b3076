//! Linear least-squares solver.
//!
//! Each Levenberg–Marquardt iteration solves a small, tall linear system
//!
//! ```text
//! minimize | A δ - b |^2
//! ```
//!
//! where `A` stacks the Jacobian on top of the damping rows.
//!
//! Implementation choices:
//! - We use SVD so that tall (more rows than columns) and near-singular systems
//!   are handled without panicking. (Nalgebra's `QR::solve` is intended for
//!   square systems.)
//! - The parameter dimension is tiny (three columns), so SVD cost is negligible
//!   next to an instrument acquisition.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.nrows() != y.len() || x.ncols() == 0 {
        return None;
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return None;
    }

    let svd = x.clone().svd(true, true);

    // Singular values below the tolerance are treated as zero. Try progressively
    // looser tolerances if the strict solve yields a non-finite solution.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}
