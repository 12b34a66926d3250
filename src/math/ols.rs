//! Weighted least squares and polynomial fitting.
//!
//! Calibration fitting repeatedly solves small regression problems of the form:
//!
//! ```text
//! minimize Σ w_i (y_i - x_i^T β)^2
//! ```
//!
//! (indicator vs. color within one cluster, primordial and depletion-boundary
//! curves vs. color). The parameter dimension is tiny (2-4 polynomial
//! coefficients), so a robust SVD solve is cheap.
//!
//! Implementation choices:
//! - Rows are scaled by `sqrt(w_i)` and an ordinary least-squares problem is
//!   solved.
//! - SVD handles tall matrices and the near-collinear columns that Vandermonde
//!   designs produce for narrow color windows.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Fit a polynomial `y = c0 + c1 x + ... + c_d x^d` by weighted least squares.
///
/// Coefficients are returned lowest order first. The requested degree is
/// capped at `n - 1` so underdetermined fits degrade to lower-order
/// polynomials instead of failing. Returns `None` on empty input or an
/// unsolvable system.
pub fn polyfit(x: &[f64], y: &[f64], w: Option<&[f64]>, degree: usize) -> Option<Vec<f64>> {
    let n = x.len();
    if n == 0 || y.len() != n {
        return None;
    }
    let degree = degree.min(n - 1);
    let p = degree + 1;

    let mut xw = DMatrix::<f64>::zeros(n, p);
    let mut yw = DVector::<f64>::zeros(n);
    for i in 0..n {
        let sw = w.map_or(1.0, |w| w[i].max(0.0).sqrt());
        let mut pow = 1.0;
        for j in 0..p {
            xw[(i, j)] = pow * sw;
            pow *= x[i];
        }
        yw[i] = y[i] * sw;
    }

    let beta = solve_least_squares(&xw, &yw)?;
    Some(beta.iter().copied().collect())
}

/// Evaluate a lowest-order-first polynomial at `x` (Horner).
pub fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}
