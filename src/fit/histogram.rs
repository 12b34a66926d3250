//! Empirical residual distribution.
//!
//! The likelihood does not assume Gaussian residuals: it evaluates the
//! density/cumulative pair fit to a histogram of calibration residuals
//! (observed minus predicted, standardized for calcium, log-EW offsets for
//! lithium). The fit is persisted as JSON next to the grid files so repeat
//! queries never refit the histogram.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::{interp1, normalize, trapezoid};

/// Minimum residual count for a meaningful histogram.
const MIN_RESIDUALS: usize = 8;

/// Histogram-derived density/cumulative pair over the residual axis.
///
/// Both callables are piecewise linear over the bin centers; the density is
/// zero outside the observed residual range, the cumulative saturates at 0/1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidualDist {
    centers: Vec<f64>,
    pdf: Vec<f64>,
    cdf: Vec<f64>,
}

impl ResidualDist {
    /// Fit the pair from raw calibration residuals.
    pub fn fit(residuals: &[f64]) -> Result<Self, AppError> {
        let clean: Vec<f64> = residuals.iter().copied().filter(|v| v.is_finite()).collect();
        if clean.len() < MIN_RESIDUALS {
            return Err(AppError::insufficient(format!(
                "Need at least {MIN_RESIDUALS} calibration residuals to fit one; got {}.",
                clean.len()
            )));
        }

        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for &v in &clean {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        // Pad the range so edge residuals do not sit on a zero-density bin wall.
        let pad = 0.1 * (hi - lo).max(1e-6);
        let (lo, hi) = (lo - pad, hi + pad);

        let n_bins = ((clean.len() as f64).sqrt().round() as usize).clamp(8, 40);
        let width = (hi - lo) / n_bins as f64;

        let mut counts = vec![0usize; n_bins];
        for &v in &clean {
            let idx = (((v - lo) / width) as usize).min(n_bins - 1);
            counts[idx] += 1;
        }

        let centers: Vec<f64> = (0..n_bins).map(|i| lo + (i as f64 + 0.5) * width).collect();
        let mut pdf: Vec<f64> = counts
            .iter()
            .map(|&c| c as f64 / (clean.len() as f64 * width))
            .collect();
        if !normalize(&centers, &mut pdf) {
            return Err(AppError::internal("Residual histogram has zero area."));
        }

        // Cumulative trapezoid, rescaled so the last point is exactly 1.
        let mut cdf = vec![0.0; n_bins];
        for i in 1..n_bins {
            cdf[i] = cdf[i - 1] + 0.5 * (pdf[i] + pdf[i - 1]) * (centers[i] - centers[i - 1]);
        }
        let total = cdf[n_bins - 1];
        if total > 0.0 {
            for v in cdf.iter_mut() {
                *v /= total;
            }
        }

        Ok(Self { centers, pdf, cdf })
    }

    /// Density at `x`; zero outside the fitted range.
    pub fn pdf_at(&self, x: f64) -> f64 {
        if x < self.centers[0] || x > self.centers[self.centers.len() - 1] {
            return 0.0;
        }
        interp1(&self.centers, &self.pdf, x).max(0.0)
    }

    /// Cumulative probability at `x`; saturates at 0 below and 1 above.
    pub fn cdf_at(&self, x: f64) -> f64 {
        if x <= self.centers[0] {
            return 0.0;
        }
        if x >= self.centers[self.centers.len() - 1] {
            return 1.0;
        }
        interp1(&self.centers, &self.cdf, x).clamp(0.0, 1.0)
    }

    /// Persist as JSON. Fails hard; a half-written distribution is worse than
    /// none.
    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let file = File::create(path).map_err(|e| {
            AppError::input(format!("Failed to create residual file '{}': {e}", path.display()))
        })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| AppError::input(format!("Failed to write residual file: {e}")))
    }

    /// Load a persisted pair. Missing or malformed files are fatal.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path).map_err(|e| {
            AppError::input(format!("Failed to open residual file '{}': {e}", path.display()))
        })?;
        let dist: Self = serde_json::from_reader(file).map_err(|e| {
            AppError::input(format!("Invalid residual file '{}': {e}", path.display()))
        })?;
        if dist.centers.len() < 2
            || dist.centers.len() != dist.pdf.len()
            || dist.centers.len() != dist.cdf.len()
        {
            return Err(AppError::input(format!(
                "Residual file '{}' has inconsistent array lengths.",
                path.display()
            )));
        }
        Ok(dist)
    }

    /// Trapezoidal area of the density (diagnostic; ~1 by construction).
    pub fn area(&self) -> f64 {
        trapezoid(&self.centers, &self.pdf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_like_residuals() -> Vec<f64> {
        // Deterministic pseudo-Gaussian spread via inverse-CDF-ish spacing.
        (0..200)
            .map(|i| {
                let u = (i as f64 + 0.5) / 200.0;
                // crude logit stretch, symmetric around 0
                0.4 * (u / (1.0 - u)).ln()
            })
            .collect()
    }

    #[test]
    fn fitted_pdf_has_unit_area_and_nonnegative_values() {
        let dist = ResidualDist::fit(&gaussian_like_residuals()).unwrap();
        assert!((dist.area() - 1.0).abs() < 1e-9);
        for i in 0..200 {
            let x = -3.0 + 0.03 * i as f64;
            assert!(dist.pdf_at(x) >= 0.0);
        }
    }

    #[test]
    fn cdf_is_monotone_and_saturates() {
        let dist = ResidualDist::fit(&gaussian_like_residuals()).unwrap();
        assert_eq!(dist.cdf_at(-100.0), 0.0);
        assert_eq!(dist.cdf_at(100.0), 1.0);
        let mut prev = -1.0;
        for i in 0..100 {
            let x = -4.0 + 0.08 * i as f64;
            let c = dist.cdf_at(x);
            assert!(c >= prev);
            prev = c;
        }
        // Symmetric input: median near zero.
        assert!((dist.cdf_at(0.0) - 0.5).abs() < 0.1);
    }

    #[test]
    fn refuses_tiny_samples() {
        let err = ResidualDist::fit(&[0.1, -0.2, 0.3]).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn save_load_round_trip() {
        let dist = ResidualDist::fit(&gaussian_like_residuals()).unwrap();
        let dir = std::env::temp_dir().join("stellar_ages_residual_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("calcium_residual.json");
        dist.save(&path).unwrap();
        let loaded = ResidualDist::load(&path).unwrap();
        assert_eq!(dist.centers, loaded.centers);
        assert_eq!(dist.pdf, loaded.pdf);
        assert_eq!(dist.cdf, loaded.cdf);
    }

    #[test]
    fn missing_residual_file_is_fatal() {
        let err = ResidualDist::load(Path::new("/nonexistent/residual.json")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
