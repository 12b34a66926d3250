//! Operations on discretized probability arrays over a fixed grid.
//!
//! Every density in this crate lives on an ordered grid (usually the age
//! grid) and integrates via the trapezoidal rule. Keeping these primitives in
//! one place means normalization and quantile conventions cannot drift
//! between the calcium and lithium paths.

use rand::Rng;
use rand::seq::index::sample as index_sample;

use crate::domain::AgeStats;

/// Cumulative probabilities of the two-sided 5-point statistics.
const TWO_SIDED_PROBS: [f64; 5] = [0.025, 0.16, 0.5, 0.84, 0.975];

/// Cumulative probabilities of the one-sided lower-limit ages, ascending:
/// 3-sigma, 2-sigma, 1-sigma. An upper-limit measurement bounds the age from
/// below, so these are taken directly from the CDF rather than inverted
/// around the median.
const LOWER_LIMIT_PROBS: [f64; 3] = [0.002_7, 0.045_5, 0.317_3];

/// Trapezoidal integral of `y` over `x`.
///
/// `x` must be ordered; the two slices must have equal length.
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    let mut sum = 0.0;
    for i in 1..x.len() {
        sum += 0.5 * (y[i] + y[i - 1]) * (x[i] - x[i - 1]);
    }
    sum
}

/// Rescale `values` in place so its trapezoidal integral over `grid` is 1.
///
/// Returns `false` without touching `values` when the integral is zero or
/// non-finite; the caller decides how to recover (see the estimator's
/// uniform-fallback policy).
pub fn normalize(grid: &[f64], values: &mut [f64]) -> bool {
    let area = trapezoid(grid, values);
    if !(area.is_finite() && area > 0.0) {
        return false;
    }
    for v in values.iter_mut() {
        *v /= area;
    }
    true
}

/// Gaussian density at a single point. `sigma` must be positive.
pub fn gaussian_at(x: f64, mean: f64, sigma: f64) -> f64 {
    debug_assert!(sigma > 0.0, "gaussian sigma must be positive");
    let z = (x - mean) / sigma;
    (-0.5 * z * z).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
}

/// Elementwise Gaussian density over `x`. `sigma` must be positive.
pub fn gaussian(x: &[f64], mean: f64, sigma: f64) -> Vec<f64> {
    x.iter().map(|&v| gaussian_at(v, mean, sigma)).collect()
}

/// Compute posterior summary statistics by inverting the cumulative
/// distribution of `density` over `grid`.
///
/// The density need not be pre-normalized; a normalized copy is used
/// internally. A zero-area density yields statistics of a uniform
/// distribution, matching the estimator's degenerate-input fallback.
pub fn stats(grid: &[f64], density: &[f64], upper_limit: bool) -> AgeStats {
    let mut work = density.to_vec();
    if !normalize(grid, &mut work) {
        work = vec![1.0; grid.len()];
        normalize(grid, &mut work);
    }

    // Cumulative trapezoid, clamped monotone against float noise.
    let mut cdf = vec![0.0; grid.len()];
    for i in 1..grid.len() {
        let step = 0.5 * (work[i] + work[i - 1]) * (grid[i] - grid[i - 1]);
        cdf[i] = (cdf[i - 1] + step).min(1.0);
    }

    if upper_limit {
        let ages: Vec<f64> = LOWER_LIMIT_PROBS
            .iter()
            .map(|&p| invert_cdf(grid, &cdf, p))
            .collect();
        AgeStats::LowerLimit {
            sigma3: ages[0],
            sigma2: ages[1],
            sigma1: ages[2],
        }
    } else {
        let ages: Vec<f64> = TWO_SIDED_PROBS
            .iter()
            .map(|&p| invert_cdf(grid, &cdf, p))
            .collect();
        AgeStats::TwoSided {
            lo95: ages[0],
            lo68: ages[1],
            median: ages[2],
            hi68: ages[3],
            hi95: ages[4],
        }
    }
}

/// Linearly invert a monotone CDF at cumulative probability `p`.
fn invert_cdf(grid: &[f64], cdf: &[f64], p: f64) -> f64 {
    if p <= cdf[0] {
        return grid[0];
    }
    for i in 1..cdf.len() {
        if cdf[i] >= p {
            let span = cdf[i] - cdf[i - 1];
            if span <= 0.0 {
                return grid[i];
            }
            let u = (p - cdf[i - 1]) / span;
            return grid[i - 1] + u * (grid[i] - grid[i - 1]);
        }
    }
    grid[grid.len() - 1]
}

/// Reduce an oversampled curve to approximately `target` points while
/// preserving its trapezoidal integral.
///
/// Used to cap the cost of 2-D interpolation over the color-uncertainty
/// window: strided subsampling keeps the endpoints, then the retained values
/// are rescaled so the integral matches the input exactly.
pub fn desample(x: &[f64], y: &[f64], target: usize) -> (Vec<f64>, Vec<f64>) {
    debug_assert_eq!(x.len(), y.len());
    let target = target.max(2);
    if x.len() <= target {
        return (x.to_vec(), y.to_vec());
    }

    let area_in = trapezoid(x, y);
    let stride = x.len().div_ceil(target);

    let mut xs = Vec::with_capacity(target + 1);
    let mut ys = Vec::with_capacity(target + 1);
    let mut i = 0;
    while i < x.len() {
        xs.push(x[i]);
        ys.push(y[i]);
        i += stride;
    }
    if *xs.last().unwrap() < x[x.len() - 1] {
        xs.push(x[x.len() - 1]);
        ys.push(y[y.len() - 1]);
    }

    let area_out = trapezoid(&xs, &ys);
    if area_out > 0.0 && area_in.is_finite() && area_in > 0.0 {
        let scale = area_in / area_out;
        for v in ys.iter_mut() {
            *v *= scale;
        }
    }
    (xs, ys)
}

/// Bootstrap-style combination over a star population.
///
/// For each of `iterations` draws, `sample_size` distinct star indices are
/// chosen and handed to `posterior_of_subset` (which perturbs the chosen
/// stars by their measurement noise and returns a posterior-product array).
/// The per-iteration arrays are averaged. The average of an all-zero set of
/// iterations is itself zero and must be handled by the caller's
/// normalize-or-flatten fallback.
pub fn resample<R, F>(
    mut posterior_of_subset: F,
    population: usize,
    sample_size: usize,
    iterations: usize,
    rng: &mut R,
) -> Vec<f64>
where
    R: Rng,
    F: FnMut(&[usize], &mut R) -> Vec<f64>,
{
    let sample_size = sample_size.min(population).max(1);
    let mut accum: Option<Vec<f64>> = None;

    for _ in 0..iterations.max(1) {
        let indices: Vec<usize> = index_sample(rng, population, sample_size).into_vec();
        let post = posterior_of_subset(&indices, rng);
        match accum.as_mut() {
            Some(acc) => {
                for (a, p) in acc.iter_mut().zip(post.iter()) {
                    *a += p;
                }
            }
            None => accum = Some(post),
        }
    }

    let mut out = accum.unwrap_or_default();
    let denom = iterations.max(1) as f64;
    for v in out.iter_mut() {
        *v /= denom;
    }
    out
}
