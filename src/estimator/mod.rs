//! Bayesian age inference.
//!
//! An `AgeEstimator` owns one calibration grid (median + scatter surfaces)
//! plus the empirical residual distribution fit alongside it, and turns star
//! measurements into posterior age distributions:
//!
//! - **calcium**: the measurement is compared against every color bin of the
//!   grid (log(R'HK) carries little color dependence, so the bins act as an
//!   implicit color marginalization)
//! - **lithium**: color uncertainty is marginalized explicitly over a
//!   Gaussian-weighted window of color bins, and measurement uncertainty is
//!   integrated over the equivalent-width axis
//! - **upper limits** (lithium only): the residual CDF replaces the PDF, and
//!   the result carries one-sided lower-limit ages
//!
//! Posteriors for multiple stars combine multiplicatively in log space.

use std::time::Instant;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

use crate::domain::{
    Cluster, EstimatorConfig, IndicatorBundle, IndicatorKind, Measurement, Posterior,
};
use crate::error::AppError;
use crate::fit::ResidualDist;
use crate::grid::{CalibrationGrid, GridBuild};
use crate::math::{gaussian_at, normalize, trapezoid};
use crate::math::{desample, resample, stats};

/// Color-uncertainty window half-width, in sigmas.
const BV_WINDOW_SIGMAS: f64 = 4.0;

/// Measurement-uncertainty integration window half-width, in sigmas.
const EW_WINDOW_SIGMAS: f64 = 5.0;

/// Initial per-star cost estimate (seconds) for progress reporting, refined
/// by an exponential moving average as stars complete.
const INITIAL_SECS_PER_STAR: f64 = 0.5;
const SECS_EMA_WEIGHT: f64 = 0.1;

/// Receives progress while a multi-star posterior product is computed.
pub trait ProgressObserver {
    fn star_done(&mut self, completed: usize, total: usize, secs_remaining: f64);
}

/// Observer that discards all progress events.
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn star_done(&mut self, _completed: usize, _total: usize, _secs_remaining: f64) {}
}

/// One indicator's fitted calibration, ready for inference.
pub struct AgeEstimator {
    kind: IndicatorKind,
    bundle: IndicatorBundle,
    grid: CalibrationGrid,
    residual: ResidualDist,
}

impl AgeEstimator {
    /// Assemble an estimator from an already-built grid and residual fit.
    pub fn from_parts(grid: CalibrationGrid, residual: ResidualDist) -> Self {
        let kind = grid.kind;
        Self {
            kind,
            bundle: kind.bundle(),
            grid,
            residual,
        }
    }

    /// Fit an estimator from calibration clusters.
    pub fn build(
        kind: IndicatorKind,
        clusters: &[Cluster],
        omit_cluster: Option<usize>,
    ) -> Result<Self, AppError> {
        let GridBuild { grid, residuals } = CalibrationGrid::build(kind, clusters, omit_cluster)?;
        Ok(Self::from_parts(grid, residuals))
    }

    /// Reload an estimator from a saved grid-set configuration.
    pub fn load(config: &EstimatorConfig) -> Result<Self, AppError> {
        let grid =
            CalibrationGrid::load(config.indicator, &config.median_grid, &config.sigma_grid)?;
        let residual = ResidualDist::load(&config.residual_dist)?;
        Ok(Self::from_parts(grid, residual))
    }

    pub fn kind(&self) -> IndicatorKind {
        self.kind
    }

    pub fn grid(&self) -> &CalibrationGrid {
        &self.grid
    }

    /// The age grid the posterior densities are aligned to.
    pub fn ages(&self) -> &[f64] {
        &self.grid.ages
    }

    /// Posterior age distribution for one star.
    pub fn posterior(&self, measurement: &Measurement) -> Result<Posterior, AppError> {
        self.validate(measurement)?;
        let mut density = self.likelihood(measurement);
        self.apply_age_prior(&mut density, measurement.max_age);

        let mut unconstrained = false;
        if !normalize(&self.grid.ages, &mut density) {
            // Degenerate likelihood: substitute a flat density so downstream
            // statistics stay defined, and flag the result.
            unconstrained = true;
            density = vec![1.0; self.grid.ages.len()];
            self.apply_age_prior(&mut density, measurement.max_age);
            if !normalize(&self.grid.ages, &mut density) {
                return Err(AppError::internal(
                    "Posterior collapsed to zero even under the flat fallback.",
                ));
            }
        }

        let stats = stats(&self.grid.ages, &density, measurement.upper_limit);
        Ok(Posterior {
            density,
            stats,
            upper_limit: measurement.upper_limit,
            unconstrained,
        })
    }

    /// Combined posterior for a population of coeval stars.
    ///
    /// Per-star posteriors are multiplied in log space with max-subtraction
    /// before exponentiating, so long products cannot underflow to zero.
    pub fn posterior_product(
        &self,
        measurements: &[Measurement],
        observer: &mut dyn ProgressObserver,
    ) -> Result<Posterior, AppError> {
        if measurements.is_empty() {
            return Err(AppError::insufficient("Posterior product needs at least one star."));
        }
        for m in measurements {
            self.validate(m)?;
        }

        let n = self.grid.ages.len();
        let mut ln_sum = vec![0.0f64; n];
        let mut secs_per_star = INITIAL_SECS_PER_STAR;

        for (i, m) in measurements.iter().enumerate() {
            let started = Instant::now();
            let density = self.normalized_density(m);
            for (acc, d) in ln_sum.iter_mut().zip(&density) {
                *acc += d.ln();
            }
            let elapsed = started.elapsed().as_secs_f64();
            secs_per_star += SECS_EMA_WEIGHT * (elapsed - secs_per_star);
            let remaining = secs_per_star * (measurements.len() - i - 1) as f64;
            observer.star_done(i + 1, measurements.len(), remaining);
        }

        let product = exp_ln_product(&ln_sum);
        self.finish_product(product)
    }

    /// Bootstrap combination: repeatedly subsample the population, perturb the
    /// chosen stars by their measurement noise, and average the resulting
    /// posterior products. Smooths out over-tight products from large samples.
    pub fn resample_posterior_product<R: Rng>(
        &self,
        measurements: &[Measurement],
        sample_size: usize,
        iterations: usize,
        rng: &mut R,
    ) -> Result<Posterior, AppError> {
        if measurements.is_empty() {
            return Err(AppError::insufficient("Posterior product needs at least one star."));
        }
        for m in measurements {
            self.validate(m)?;
        }

        let averaged = resample(
            |indices, rng| {
                let n = self.grid.ages.len();
                let mut ln_sum = vec![0.0f64; n];
                for &idx in indices {
                    let jittered = self.jitter(&measurements[idx], rng);
                    let density = self.normalized_density(&jittered);
                    for (acc, d) in ln_sum.iter_mut().zip(&density) {
                        *acc += d.ln();
                    }
                }
                exp_ln_product(&ln_sum)
            },
            measurements.len(),
            sample_size,
            iterations,
            rng,
        );

        self.finish_product(averaged)
    }

    /// Normalize a combined density and wrap it into a `Posterior`.
    fn finish_product(&self, mut density: Vec<f64>) -> Result<Posterior, AppError> {
        let mut unconstrained = false;
        if !normalize(&self.grid.ages, &mut density) {
            unconstrained = true;
            density = vec![1.0; self.grid.ages.len()];
            normalize(&self.grid.ages, &mut density);
        }
        let stats = stats(&self.grid.ages, &density, false);
        Ok(Posterior {
            density,
            stats,
            upper_limit: false,
            unconstrained,
        })
    }

    /// A normalized per-star density (flat fallback on degenerate input).
    ///
    /// Callers have already validated the measurement.
    fn normalized_density(&self, measurement: &Measurement) -> Vec<f64> {
        let mut density = self.likelihood(measurement);
        self.apply_age_prior(&mut density, measurement.max_age);
        if !normalize(&self.grid.ages, &mut density) {
            density = vec![1.0; self.grid.ages.len()];
            normalize(&self.grid.ages, &mut density);
        }
        density
    }

    fn likelihood(&self, measurement: &Measurement) -> Vec<f64> {
        match self.kind {
            IndicatorKind::Calcium => self.calcium_likelihood(measurement),
            IndicatorKind::Lithium => self.lithium_likelihood(measurement),
        }
    }

    /// Hard prior: zero density strictly above the age bound.
    fn apply_age_prior(&self, density: &mut [f64], max_age: Option<f64>) {
        if let Some(bound) = max_age {
            for (d, &age) in density.iter_mut().zip(&self.grid.ages) {
                if age > bound {
                    *d = 0.0;
                }
            }
        }
    }

    /// Calcium likelihood: standardized residual density summed over every
    /// color bin of the grid.
    fn calcium_likelihood(&self, measurement: &Measurement) -> Vec<f64> {
        let ages = &self.grid.ages;
        let mut like = vec![0.0; ages.len()];
        for (mu_row, sg_row) in self.grid.median.iter().zip(&self.grid.sigma) {
            for a in 0..ages.len() {
                let z = (measurement.indicator - mu_row[a]) / sg_row[a];
                like[a] += self.residual.pdf_at(z) / sg_row[a];
            }
        }
        like
    }

    /// Lithium likelihood: marginalize color uncertainty over a Gaussian
    /// window of color bins, integrating the measurement Gaussian against the
    /// residual density along the equivalent-width axis.
    fn lithium_likelihood(&self, measurement: &Measurement) -> Vec<f64> {
        let bv_err = measurement.bv_err.unwrap_or(self.bundle.bv_uncertainty);
        let (bv_samples, bv_weights) = self.color_window(measurement.bv, bv_err);

        let ew = measurement.indicator;
        let ew_err = measurement.indicator_err.unwrap_or(self.bundle.measure_err);
        let ew_axis = self.measurement_axis(ew, ew_err);

        let ages = &self.grid.ages;
        let mu_rows: Vec<Vec<f64>> = bv_samples
            .iter()
            .map(|&bv| self.grid.median_at_color(bv))
            .collect();

        like_over_ages(ages.len(), |a| {
            let mut total = 0.0;
            for (mu_row, &w) in mu_rows.iter().zip(&bv_weights) {
                let mu = mu_row[a];
                if measurement.upper_limit {
                    total += w * self.residual.cdf_at(ew.log10() - mu);
                } else if let Some(axis) = &ew_axis {
                    // Integrate p(EW_true | measured) * p(log10 EW_true | age).
                    let integrand: Vec<f64> = axis
                        .iter()
                        .map(|&e| {
                            gaussian_at(e, ew, ew_err) * self.residual.pdf_at(e.log10() - mu) / e
                        })
                        .collect();
                    total += w * trapezoid(axis, &integrand);
                } else {
                    total += w * self.residual.pdf_at(ew.log10() - mu) / ew;
                }
            }
            total
        })
    }

    /// Color bins within the measurement's uncertainty window, with Gaussian
    /// weights, desampled to the bundle's point count.
    fn color_window(&self, bv: f64, bv_err: f64) -> (Vec<f64>, Vec<f64>) {
        let lo = bv - BV_WINDOW_SIGMAS * bv_err;
        let hi = bv + BV_WINDOW_SIGMAS * bv_err;
        let window: Vec<f64> = self
            .grid
            .colors
            .iter()
            .copied()
            .filter(|&c| c >= lo && c <= hi)
            .collect();
        if window.len() < 2 {
            return (vec![bv], vec![1.0]);
        }
        let weights: Vec<f64> = window.iter().map(|&c| gaussian_at(c, bv, bv_err)).collect();
        let (xs, mut ws) = desample(&window, &weights, self.bundle.num_bv_points);
        let total: f64 = ws.iter().sum();
        if total > 0.0 {
            for w in ws.iter_mut() {
                *w /= total;
            }
        }
        (xs, ws)
    }

    /// Equivalent-width grid restricted to the measurement's 5-sigma window.
    ///
    /// `None` when fewer than two positive points remain; the caller then
    /// evaluates at the measured value directly.
    fn measurement_axis(&self, ew: f64, ew_err: f64) -> Option<Vec<f64>> {
        let lo = ew - EW_WINDOW_SIGMAS * ew_err;
        let hi = ew + EW_WINDOW_SIGMAS * ew_err;
        let axis: Vec<f64> = self
            .bundle
            .indicator_axis()
            .into_iter()
            .filter(|&e| e > 0.0 && e >= lo && e <= hi)
            .collect();
        if axis.len() < 2 { None } else { Some(axis) }
    }

    /// Perturb a detection by its measurement noise, clamped to the
    /// calibrated range. Upper limits pass through untouched.
    fn jitter<R: Rng>(&self, measurement: &Measurement, rng: &mut R) -> Measurement {
        if measurement.upper_limit {
            return measurement.clone();
        }
        let err = measurement.indicator_err.unwrap_or(self.bundle.measure_err);
        let mut out = measurement.clone();
        if let Ok(noise) = Normal::new(0.0, err) {
            let (lo, hi) = self.bundle.indicator_range;
            out.indicator = (measurement.indicator + noise.sample(rng)).clamp(lo, hi);
        }
        out
    }

    fn validate(&self, measurement: &Measurement) -> Result<(), AppError> {
        match self.kind {
            IndicatorKind::Calcium => {
                let (lo, hi) = self.bundle.bv_range;
                if !(measurement.bv >= lo && measurement.bv <= hi) {
                    return Err(AppError::input(format!(
                        "B-V color {} is outside the calibrated range [{lo}, {hi}].",
                        measurement.bv
                    )));
                }
                let (lo, hi) = self.bundle.indicator_range;
                if !(measurement.indicator >= lo && measurement.indicator <= hi) {
                    return Err(AppError::input(format!(
                        "Calcium log(R'HK) {} is outside the calibrated range [{lo}, {hi}].",
                        measurement.indicator
                    )));
                }
                if measurement.upper_limit {
                    return Err(AppError::input(
                        "Upper limits are only supported for lithium measurements.",
                    ));
                }
            }
            IndicatorKind::Lithium => {
                let (lo, hi) = self.bundle.bv_range;
                if !(measurement.bv >= lo && measurement.bv <= hi) {
                    return Err(AppError::input(format!(
                        "B-V color {} is outside the calibrated range [{lo}, {hi}].",
                        measurement.bv
                    )));
                }
                if !(measurement.indicator > 0.0) {
                    return Err(AppError::input(format!(
                        "Lithium EW must be positive mA; got {}.",
                        measurement.indicator
                    )));
                }
            }
        }
        if let Some(err) = measurement.bv_err {
            if !(err > 0.0) {
                return Err(AppError::input(format!(
                    "B-V uncertainty must be positive; got {err}."
                )));
            }
        }
        if let Some(err) = measurement.indicator_err {
            if !(err > 0.0) {
                return Err(AppError::input(format!(
                    "Measurement uncertainty must be positive; got {err}."
                )));
            }
        }
        if let Some(bound) = measurement.max_age {
            if !(bound > self.grid.ages[0]) {
                return Err(AppError::input(format!(
                    "Age bound {bound} Myr must exceed the grid start ({} Myr).",
                    self.grid.ages[0]
                )));
            }
        }
        Ok(())
    }
}

/// Evaluate a per-age closure in parallel.
fn like_over_ages<F>(n: usize, f: F) -> Vec<f64>
where
    F: Fn(usize) -> f64 + Send + Sync,
{
    (0..n).into_par_iter().map(f).collect()
}

/// Exponentiate accumulated log densities with max-subtraction.
///
/// A non-finite maximum (every age had zero density for some star) yields an
/// all-zero array for the caller's fallback to catch.
fn exp_ln_product(ln_sum: &[f64]) -> Vec<f64> {
    let max = ln_sum.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return vec![0.0; ln_sum.len()];
    }
    ln_sum.iter().map(|&v| (v - max).exp()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic_clusters;
    use crate::domain::AgeStats;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn calcium_estimator() -> AgeEstimator {
        let clusters = synthetic_clusters(IndicatorKind::Calcium, 11);
        AgeEstimator::build(IndicatorKind::Calcium, &clusters, None)
            .unwrap()
    }

    fn lithium_estimator() -> AgeEstimator {
        let clusters = synthetic_clusters(IndicatorKind::Lithium, 11);
        AgeEstimator::build(IndicatorKind::Lithium, &clusters, None)
            .unwrap()
    }

    #[test]
    fn calcium_posterior_is_normalized_and_age_sensitive() {
        let est = calcium_estimator();
        let active = est.posterior(&Measurement::detection(0.65, -4.2)).unwrap();
        let quiet = est.posterior(&Measurement::detection(0.65, -4.9)).unwrap();
        assert!((trapezoid(est.ages(), &active.density) - 1.0).abs() < 1e-9);
        let AgeStats::TwoSided { median: young, .. } = active.stats else {
            panic!("expected two-sided stats");
        };
        let AgeStats::TwoSided { median: old, .. } = quiet.stats else {
            panic!("expected two-sided stats");
        };
        // More active chromospheres are younger.
        assert!(young < old);
        assert!(!active.unconstrained);
    }

    #[test]
    fn lithium_posterior_prefers_young_ages_for_high_ew() {
        let est = lithium_estimator();
        let rich = est.posterior(&Measurement::detection(0.65, 250.0)).unwrap();
        let poor = est.posterior(&Measurement::detection(0.65, 8.0)).unwrap();
        let AgeStats::TwoSided { median: young, .. } = rich.stats else {
            panic!("expected two-sided stats");
        };
        let AgeStats::TwoSided { median: old, .. } = poor.stats else {
            panic!("expected two-sided stats");
        };
        assert!(young < old);
    }

    #[test]
    fn upper_limit_yields_lower_limit_stats() {
        let est = lithium_estimator();
        let mut m = Measurement::detection(0.65, 12.0);
        m.upper_limit = true;
        let post = est.posterior(&m).unwrap();
        assert!(post.upper_limit);
        let AgeStats::LowerLimit { sigma3, sigma2, sigma1 } = post.stats else {
            panic!("expected lower-limit stats");
        };
        assert!(sigma3 <= sigma2 && sigma2 <= sigma1);
    }

    #[test]
    fn max_age_prior_zeroes_density_above_the_bound() {
        let est = lithium_estimator();
        let mut m = Measurement::detection(0.65, 100.0);
        m.max_age = Some(2000.0);
        let post = est.posterior(&m).unwrap();
        for (&age, &d) in est.ages().iter().zip(&post.density) {
            if age > 2000.0 {
                assert_eq!(d, 0.0);
            }
        }
        assert!((trapezoid(est.ages(), &post.density) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_color_is_rejected_with_range_in_message() {
        let est = lithium_estimator();
        let err = est.posterior(&Measurement::detection(2.5, 100.0)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("0.35"));
        assert!(err.to_string().contains("1.9"));
    }

    #[test]
    fn calcium_rejects_out_of_range_color() {
        let est = calcium_estimator();
        let err = est.posterior(&Measurement::detection(2.5, -4.5)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("0.45"));
        assert!(err.to_string().contains("0.9"));
    }

    #[test]
    fn calcium_rejects_upper_limits() {
        let est = calcium_estimator();
        let mut m = Measurement::detection(0.65, -4.5);
        m.upper_limit = true;
        assert_eq!(est.posterior(&m).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn posterior_product_tightens_the_interval() {
        let est = calcium_estimator();
        let stars: Vec<Measurement> = (0..8)
            .map(|i| Measurement::detection(0.6 + 0.02 * i as f64, -4.45 + 0.01 * i as f64))
            .collect();
        let single = est.posterior(&stars[0]).unwrap();
        let product = est
            .posterior_product(&stars, &mut NullObserver)
            .unwrap();
        let AgeStats::TwoSided { lo68: s_lo, hi68: s_hi, .. } = single.stats else {
            panic!("expected two-sided stats");
        };
        let AgeStats::TwoSided { lo68: p_lo, hi68: p_hi, .. } = product.stats else {
            panic!("expected two-sided stats");
        };
        assert!(p_hi - p_lo < s_hi - s_lo);
        assert!((trapezoid(est.ages(), &product.density) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn posterior_product_reports_progress() {
        struct Counter(usize);
        impl ProgressObserver for Counter {
            fn star_done(&mut self, completed: usize, total: usize, secs: f64) {
                self.0 = completed;
                assert!(completed <= total);
                assert!(secs >= 0.0);
            }
        }
        let est = calcium_estimator();
        let stars = vec![Measurement::detection(0.65, -4.5); 3];
        let mut counter = Counter(0);
        est.posterior_product(&stars, &mut counter).unwrap();
        assert_eq!(counter.0, 3);
    }

    #[test]
    fn resampled_product_stays_near_the_plain_product() {
        let est = calcium_estimator();
        let stars = vec![
            Measurement::detection(0.6, -4.45),
            Measurement::detection(0.65, -4.5),
            Measurement::detection(0.7, -4.48),
            Measurement::detection(0.75, -4.52),
        ];
        let plain = est.posterior_product(&stars, &mut NullObserver).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let boot = est
            .resample_posterior_product(&stars, 3, 20, &mut rng)
            .unwrap();
        let AgeStats::TwoSided { median: m_plain, .. } = plain.stats else {
            panic!("expected two-sided stats");
        };
        let AgeStats::TwoSided { median: m_boot, .. } = boot.stats else {
            panic!("expected two-sided stats");
        };
        // Same data, so the bootstrap median lands in the same neighborhood.
        assert!((m_plain - m_boot).abs() / m_plain < 0.5);
        assert!((trapezoid(est.ages(), &boot.density) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn calcium_scenario_has_monotone_five_point_stats() {
        let est = calcium_estimator();
        let post = est.posterior(&Measurement::detection(0.65, -4.5)).unwrap();
        let values = post.stats.values();
        assert_eq!(values.len(), 5);
        assert!(values.windows(2).all(|w| w[1] >= w[0]));
        assert!((trapezoid(est.ages(), &post.density) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn calcium_result_does_not_depend_on_color() {
        // The calcium likelihood sums over every color bin instead of
        // marginalizing around the star's color, so B-V is inert here.
        let est = calcium_estimator();
        let a = est.posterior(&Measurement::detection(0.5, -4.5)).unwrap();
        let b = est.posterior(&Measurement::detection(0.8, -4.5)).unwrap();
        for (x, y) in a.density.iter().zip(&b.density) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn lithium_result_depends_on_color() {
        let est = lithium_estimator();
        let a = est.posterior(&Measurement::detection(0.5, 100.0)).unwrap();
        let b = est.posterior(&Measurement::detection(1.2, 100.0)).unwrap();
        let diff: f64 = a
            .density
            .iter()
            .zip(&b.density)
            .map(|(x, y)| (x - y).abs())
            .sum();
        assert!(diff > 1e-6);
    }

    #[test]
    fn upper_limit_with_max_age_truncates_support_exactly() {
        let est = lithium_estimator();
        let mut m = Measurement::detection(0.65, 20.0);
        m.upper_limit = true;
        m.max_age = Some(5000.0);
        let post = est.posterior(&m).unwrap();
        for (&age, &d) in est.ages().iter().zip(&post.density) {
            if age > 5000.0 {
                assert_eq!(d, 0.0);
            }
        }
        assert!((trapezoid(est.ages(), &post.density) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn identical_stars_sharpen_without_moving_the_median() {
        let est = calcium_estimator();
        let star = Measurement::detection(0.65, -4.5);
        let single = est.posterior(&star).unwrap();
        let stars = vec![star; 9];
        let product = est.posterior_product(&stars, &mut NullObserver).unwrap();
        let AgeStats::TwoSided { lo68: s_lo, median: s_med, hi68: s_hi, .. } = single.stats else {
            panic!("expected two-sided stats");
        };
        let AgeStats::TwoSided { lo68: p_lo, median: p_med, hi68: p_hi, .. } = product.stats else {
            panic!("expected two-sided stats");
        };
        assert!(p_hi - p_lo < s_hi - s_lo);
        // Repeating one measurement concentrates the product at that
        // measurement's most likely age, so the combined median stays inside
        // the single star's 68% interval even when the density is skewed.
        assert!(
            p_med > s_lo && p_med < s_hi,
            "median {p_med} left [{s_lo}, {s_hi}], single median {s_med}"
        );
    }

    #[test]
    fn more_resampling_iterations_stabilize_the_combination() {
        let est = calcium_estimator();
        let stars: Vec<Measurement> = (0..10)
            .map(|i| Measurement::detection(0.55 + 0.03 * i as f64, -4.5 + 0.015 * i as f64))
            .collect();

        let run = |iterations: usize, seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            est.resample_posterior_product(&stars, 4, iterations, &mut rng)
                .unwrap()
                .density
        };
        let l1 = |a: &[f64], b: &[f64]| -> f64 {
            a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
        };

        // Two independent short runs disagree more than two long runs.
        let d_few = l1(&run(4, 1), &run(4, 2));
        let d_many = l1(&run(64, 3), &run(64, 4));
        assert!(d_many < d_few);
    }

    #[test]
    fn empty_population_is_insufficient_data() {
        let est = calcium_estimator();
        assert_eq!(
            est.posterior_product(&[], &mut NullObserver).unwrap_err().exit_code(),
            3
        );
    }
}
