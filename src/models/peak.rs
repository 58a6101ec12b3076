//! Inverted-parabola peak model.
//!
//! `count(v) = height - ((v - center) / width)^2`
//!
//! The maximum `height` sits at `v = center`; `width` is the voltage offset at
//! which the model has dropped by one count. The model is symmetric in the sign
//! of `width`.

use crate::domain::PeakParams;
use crate::math::LeastSquaresModel;

/// Evaluate the model at `voltage`.
pub fn evaluate(voltage: f64, center: f64, width: f64, height: f64) -> f64 {
    let u = (voltage - center) / width;
    height - u * u
}

/// Evaluate the model for a parameter set.
pub fn evaluate_params(voltage: f64, params: &PeakParams) -> f64 {
    evaluate(voltage, params.center, params.width, params.height)
}

/// Heuristic starting point for the nonlinear fit.
///
/// - `height` is the mean count.
/// - `width` comes from each endpoint via
///   `(v_end - center_hint) / sqrt(|height - count_end|)`, keeping the larger of
///   the two estimates.
///
/// An endpoint whose count equals the mean carries no curvature information and
/// is skipped. If neither endpoint gives a usable estimate, the width falls back
/// to half the scanned span (zero when the span is zero).
pub fn initial_guess(voltages: &[f64], counts: &[f64], center_hint: f64) -> PeakParams {
    let n = voltages.len().min(counts.len());
    if n == 0 {
        return PeakParams {
            center: center_hint,
            width: 0.0,
            height: 0.0,
        };
    }

    let height = counts[..n].iter().sum::<f64>() / n as f64;

    let endpoint = |i: usize| -> Option<f64> {
        let dy = (height - counts[i]).abs();
        if !(dy.is_finite() && dy > 0.0) {
            return None;
        }
        let w = (voltages[i] - center_hint) / dy.sqrt();
        if w.is_finite() { Some(w) } else { None }
    };

    let width = match (endpoint(n - 1), endpoint(0)) {
        (Some(right), Some(left)) => right.max(left),
        (Some(w), None) | (None, Some(w)) => w,
        (None, None) => 0.0,
    };

    let width = if width != 0.0 {
        width
    } else {
        (voltages[n - 1] - voltages[0]).abs() / 2.0
    };

    PeakParams {
        center: center_hint,
        width,
        height,
    }
}

/// The peak model as a least-squares model over `[center, width, height]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvertedParabola;

impl LeastSquaresModel for InvertedParabola {
    fn param_len(&self) -> usize {
        3
    }

    fn value(&self, x: f64, p: &[f64]) -> f64 {
        evaluate(x, p[0], p[1], p[2])
    }

    fn gradient(&self, x: f64, p: &[f64], out: &mut [f64]) {
        let d = x - p[0];
        let w = p[1];
        let w2 = w * w;
        out[0] = 2.0 * d / w2;
        out[1] = 2.0 * d * d / (w2 * w);
        out[2] = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_peaks_at_center() {
        assert_eq!(evaluate(0.3, 0.3, 0.1, 500.0), 500.0);
        assert!((evaluate(0.4, 0.3, 0.1, 500.0) - 499.0).abs() < 1e-9);
        assert!((evaluate(0.2, 0.3, 0.1, 500.0) - 499.0).abs() < 1e-9);
    }

    #[test]
    fn initial_guess_takes_larger_endpoint_estimate() {
        let voltages = [-0.1, -0.05, 0.0, 0.05, 0.1];
        let counts: Vec<f64> = voltages.iter().map(|v| 1000.0 - 5000.0 * v * v).collect();
        let guess = initial_guess(&voltages, &counts, 0.0);

        assert_eq!(guess.center, 0.0);
        assert!((guess.height - 975.0).abs() < 1e-9);
        // |975 - 950| = 25 -> 0.1 / 5 = 0.02 on the right, -0.02 on the left.
        assert!((guess.width - 0.02).abs() < 1e-12);
    }

    #[test]
    fn initial_guess_survives_endpoint_equal_to_mean() {
        // Mean is 2.0, equal to both endpoints.
        let voltages = [0.0, 0.5, 1.0, 1.5, 2.0];
        let counts = [2.0, 1.0, 4.0, 1.0, 2.0];
        let guess = initial_guess(&voltages, &counts, 1.0);
        assert!(guess.width.is_finite());
        assert!((guess.width - 1.0).abs() < 1e-12);
    }

    #[test]
    fn initial_guess_on_flat_zero_span_is_zero_width() {
        let guess = initial_guess(&[0.5, 0.5, 0.5], &[10.0, 10.0, 10.0], 0.5);
        assert_eq!(guess.width, 0.0);
        assert_eq!(guess.height, 10.0);
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let model = InvertedParabola;
        let p = [0.02, 0.015, 900.0];
        let x = 0.05;
        let mut g = [0.0; 3];
        model.gradient(x, &p, &mut g);

        for j in 0..3 {
            let h = 1e-7 * p[j].abs().max(1e-3);
            let mut up = p;
            let mut dn = p;
            up[j] += h;
            dn[j] -= h;
            let fd = (model.value(x, &up) - model.value(x, &dn)) / (2.0 * h);
            let scale = g[j].abs().max(1.0);
            assert!((fd - g[j]).abs() / scale < 1e-5, "param {j}: fd={fd} analytic={}", g[j]);
        }
    }
}
