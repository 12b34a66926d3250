//! Fits from raw cluster calibration data.
//!
//! Grid construction asks, for each color bin: "what is the expected
//! indicator value and its scatter as a function of age?" The answers come
//! from the calibration clusters:
//!
//! - within one cluster, the indicator is fit against color (small weighted
//!   polynomial), giving a median and a residual scatter at any color
//! - across clusters, those per-cluster values become piecewise-linear curves
//!   in age, with flat extrapolation beyond the youngest/oldest cluster
//! - lithium additionally anchors the young end with a primordial
//!   (zero-age) abundance relation, the old end with a depletion-boundary
//!   relation, and replaces per-cluster scatter with a two-regime model
//!   (lithium depletion scatter is empirically bimodal across color)
//!
//! Every entry point accepts `omit_cluster` for leave-one-out validation.

use crate::domain::{Cluster, GALAXY_AGE, IndicatorKind, linspace};
use crate::error::AppError;
use crate::math::{interp1, polyfit, polyval};

/// Polynomial degree of the per-cluster indicator-vs-color fit.
const COLOR_FIT_DEGREE: usize = 2;

/// Scatter floor (grid units) so sigma grids stay strictly positive.
const MIN_SCATTER: f64 = 0.02;

/// Age assigned to the primordial-lithium anchor (Myr).
const PRIMORDIAL_AGE: f64 = 1.0;

/// Candidate transition points evaluated by the two-regime scatter search.
const TRANSITION_STEPS: usize = 40;

/// Convert a raw indicator value into grid space.
///
/// Calcium grids hold log(R'HK) directly; lithium grids hold log10(EW/mA).
pub fn grid_value(kind: IndicatorKind, indicator: f64) -> f64 {
    match kind {
        IndicatorKind::Calcium => indicator,
        IndicatorKind::Lithium => indicator.max(1e-3).log10(),
    }
}

/// A polynomial in color, clamped to the color window it was fit on.
#[derive(Debug, Clone)]
pub struct ColorPolyFit {
    coeffs: Vec<f64>,
    bv_lo: f64,
    bv_hi: f64,
}

impl ColorPolyFit {
    pub fn eval(&self, bv: f64) -> f64 {
        polyval(&self.coeffs, bv.clamp(self.bv_lo, self.bv_hi))
    }
}

/// Median indicator value and residual scatter as functions of age, for one
/// color bin. Piecewise linear through the cluster anchors; flat beyond them.
#[derive(Debug, Clone)]
pub struct AgeCurve {
    ages: Vec<f64>,
    values: Vec<f64>,
}

impl AgeCurve {
    pub fn new(ages: Vec<f64>, values: Vec<f64>) -> Self {
        debug_assert_eq!(ages.len(), values.len());
        debug_assert!(ages.windows(2).all(|w| w[1] > w[0]));
        Self { ages, values }
    }

    pub fn eval(&self, age: f64) -> f64 {
        interp1(&self.ages, &self.values, age)
    }
}

/// Two-regime lithium scatter: distinct scatter above/below a log-EW
/// transition, blended linearly across a small window so sigma grids stay
/// continuous in age.
#[derive(Debug, Clone)]
pub struct TwoRegimeScatter {
    pub transition: f64,
    pub below: f64,
    pub above: f64,
    pub blend: f64,
}

impl TwoRegimeScatter {
    pub fn eval(&self, log_ew: f64) -> f64 {
        let half = self.blend.max(1e-6);
        if log_ew <= self.transition - half {
            self.below
        } else if log_ew >= self.transition + half {
            self.above
        } else {
            let u = (log_ew - (self.transition - half)) / (2.0 * half);
            self.below + u * (self.above - self.below)
        }
    }
}

/// Lithium-only calibration pieces shared across all color bins.
#[derive(Debug, Clone)]
pub struct LithiumExtras {
    /// Zero-age (primordial) log-EW vs color.
    pub primordial: ColorPolyFit,
    /// Lower boundary (depletion floor) log-EW vs color.
    pub depletion: ColorPolyFit,
    pub scatter: TwoRegimeScatter,
}

/// Fit the indicator (grid space) against color within one cluster.
///
/// Lithium upper limits are excluded; they bound the indicator rather than
/// measure it, so they would bias the median downward.
pub fn indicator_vs_color_fit(
    cluster: &Cluster,
    kind: IndicatorKind,
) -> Result<ColorPolyFit, AppError> {
    let mut bvs = Vec::new();
    let mut vals = Vec::new();
    for p in &cluster.points {
        if p.upper_limit {
            continue;
        }
        bvs.push(p.bv);
        vals.push(grid_value(kind, p.indicator));
    }
    if bvs.len() < 2 {
        return Err(AppError::insufficient(format!(
            "Cluster '{}' has {} usable detections; need at least 2 for a color fit.",
            cluster.name,
            bvs.len()
        )));
    }

    let coeffs = polyfit(&bvs, &vals, None, COLOR_FIT_DEGREE).ok_or_else(|| {
        AppError::internal(format!(
            "Color fit failed for cluster '{}' (ill-conditioned system).",
            cluster.name
        ))
    })?;

    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for &bv in &bvs {
        lo = lo.min(bv);
        hi = hi.max(bv);
    }
    Ok(ColorPolyFit {
        coeffs,
        bv_lo: lo,
        bv_hi: hi,
    })
}

/// Residual scatter of one cluster's detections around its color fit.
pub fn cluster_scatter(cluster: &Cluster, kind: IndicatorKind, fit: &ColorPolyFit) -> f64 {
    let residuals: Vec<f64> = cluster
        .points
        .iter()
        .filter(|p| !p.upper_limit)
        .map(|p| grid_value(kind, p.indicator) - fit.eval(p.bv))
        .collect();
    std_dev(&residuals).max(MIN_SCATTER)
}

/// Anchor set for one color: cluster ages with the median and scatter each
/// cluster implies at that color, sorted by age.
#[derive(Debug, Clone)]
pub struct ClusterAnchors {
    pub ages: Vec<f64>,
    pub medians: Vec<f64>,
    pub scatters: Vec<f64>,
}

fn anchors_at_color(
    bv: f64,
    clusters: &[Cluster],
    fits: &[ColorPolyFit],
    scatters: &[f64],
    omit_cluster: Option<usize>,
) -> Result<ClusterAnchors, AppError> {
    let mut entries: Vec<(f64, f64, f64)> = Vec::new();
    for (i, cluster) in clusters.iter().enumerate() {
        if omit_cluster == Some(i) {
            continue;
        }
        entries.push((cluster.age, fits[i].eval(bv), scatters[i]));
    }
    entries.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    // Clusters sharing one age collapse into a single averaged anchor so the
    // age axis stays strictly increasing.
    let mut merged: Vec<(f64, f64, f64)> = Vec::with_capacity(entries.len());
    let mut i = 0;
    while i < entries.len() {
        let age = entries[i].0;
        let mut j = i + 1;
        while j < entries.len() && entries[j].0 == age {
            j += 1;
        }
        let n = (j - i) as f64;
        let median = entries[i..j].iter().map(|e| e.1).sum::<f64>() / n;
        let scatter = entries[i..j].iter().map(|e| e.2).sum::<f64>() / n;
        merged.push((age, median, scatter));
        i = j;
    }
    let entries = merged;

    if entries.len() < 2 {
        return Err(AppError::insufficient(
            "Fewer than 2 distinct cluster ages remain; cannot fit age curves."
        ));
    }

    Ok(ClusterAnchors {
        ages: entries.iter().map(|e| e.0).collect(),
        medians: entries.iter().map(|e| e.1).collect(),
        scatters: entries.iter().map(|e| e.2).collect(),
    })
}

/// Per-cluster color fits and scatters, computed once and shared by every
/// color bin during grid construction.
pub fn per_cluster_fits(
    clusters: &[Cluster],
    kind: IndicatorKind,
) -> Result<(Vec<ColorPolyFit>, Vec<f64>), AppError> {
    let mut fits = Vec::with_capacity(clusters.len());
    let mut scatters = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        let fit = indicator_vs_color_fit(cluster, kind)?;
        scatters.push(cluster_scatter(cluster, kind, &fit));
        fits.push(fit);
    }
    Ok((fits, scatters))
}

/// Build the median-vs-age and scatter-vs-age curves for one color bin.
///
/// Lithium anchors the young end at the primordial relation and the old end
/// at the depletion boundary, and takes its scatter from the two-regime model
/// evaluated at the local median.
pub fn vs_age_curves(
    bv: f64,
    clusters: &[Cluster],
    fits: &[ColorPolyFit],
    scatters: &[f64],
    kind: IndicatorKind,
    extras: Option<&LithiumExtras>,
    omit_cluster: Option<usize>,
) -> Result<(AgeCurve, AgeCurve), AppError> {
    let anchors = anchors_at_color(bv, clusters, fits, scatters, omit_cluster)?;

    match (kind, extras) {
        (IndicatorKind::Calcium, _) => {
            let median = AgeCurve::new(anchors.ages.clone(), anchors.medians.clone());
            let scatter = AgeCurve::new(anchors.ages, anchors.scatters);
            Ok((median, scatter))
        }
        (IndicatorKind::Lithium, Some(extras)) => {
            let mut ages = Vec::with_capacity(anchors.ages.len() + 2);
            let mut medians = Vec::with_capacity(anchors.ages.len() + 2);

            let primordial = extras.primordial.eval(bv);
            if anchors.ages[0] > PRIMORDIAL_AGE {
                ages.push(PRIMORDIAL_AGE);
                medians.push(primordial);
            }
            for (&age, &median) in anchors.ages.iter().zip(anchors.medians.iter()) {
                // Depletion is monotone; never let a cluster anchor exceed the
                // primordial abundance.
                ages.push(age);
                medians.push(median.min(primordial));
            }
            let floor = extras.depletion.eval(bv);
            if *ages.last().unwrap() < GALAXY_AGE {
                ages.push(GALAXY_AGE);
                medians.push(floor.min(*medians.last().unwrap()));
            }

            let sigma: Vec<f64> = medians.iter().map(|&m| extras.scatter.eval(m)).collect();
            Ok((AgeCurve::new(ages.clone(), medians), AgeCurve::new(ages, sigma)))
        }
        (IndicatorKind::Lithium, None) => Err(AppError::internal(
            "Lithium age curves require the primordial/depletion/scatter extras.",
        )),
    }
}

/// Fit the primordial (zero-age) log-EW vs color relation from the youngest
/// cluster's detections.
pub fn primordial_fit(
    clusters: &[Cluster],
    omit_cluster: Option<usize>,
) -> Result<ColorPolyFit, AppError> {
    let youngest = clusters
        .iter()
        .enumerate()
        .filter(|(i, _)| omit_cluster != Some(*i))
        .min_by(|a, b| a.1.age.partial_cmp(&b.1.age).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, c)| c)
        .ok_or_else(|| AppError::insufficient("No calibration clusters for the primordial fit."))?;
    indicator_vs_color_fit(youngest, IndicatorKind::Lithium)
}

/// Fit the depletion boundary: the lower envelope of log-EW vs color.
///
/// Per color bin, take the minimum detected log-EW across all clusters, then
/// smooth the bin minima with a quadratic.
pub fn depletion_boundary_fit(
    clusters: &[Cluster],
    omit_cluster: Option<usize>,
) -> Result<ColorPolyFit, AppError> {
    let mut all: Vec<(f64, f64)> = Vec::new();
    for (i, cluster) in clusters.iter().enumerate() {
        if omit_cluster == Some(i) {
            continue;
        }
        for p in &cluster.points {
            if !p.upper_limit {
                all.push((p.bv, grid_value(IndicatorKind::Lithium, p.indicator)));
            }
        }
    }
    if all.len() < 4 {
        return Err(AppError::insufficient(
            "Too few lithium detections for a depletion-boundary fit.",
        ));
    }

    let (mut bv_lo, mut bv_hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(bv, _) in &all {
        bv_lo = bv_lo.min(bv);
        bv_hi = bv_hi.max(bv);
    }

    // Bin minima over ~10 color bins (envelope knots), then smooth.
    let n_bins = 10usize;
    let edges = linspace(bv_lo, bv_hi, n_bins + 1);
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for b in 0..n_bins {
        let (lo, hi) = (edges[b], edges[b + 1]);
        let mut min_val = f64::INFINITY;
        for &(bv, v) in &all {
            if bv >= lo && (bv < hi || (b == n_bins - 1 && bv <= hi)) {
                min_val = min_val.min(v);
            }
        }
        if min_val.is_finite() {
            xs.push(0.5 * (lo + hi));
            ys.push(min_val);
        }
    }

    let coeffs = polyfit(&xs, &ys, None, 2)
        .ok_or_else(|| {
            AppError::internal("Depletion-boundary fit failed (ill-conditioned system).")
        })?;
    Ok(ColorPolyFit {
        coeffs,
        bv_lo,
        bv_hi,
    })
}

/// Fit the two-regime lithium scatter model.
///
/// Residuals of every detection around its cluster's color fit are paired
/// with the fitted log-EW level; a 1-D grid search over candidate transition
/// points picks the split that minimizes the pooled two-regime SSE.
pub fn fit_two_regime_scatter(
    clusters: &[Cluster],
    fits: &[ColorPolyFit],
    omit_cluster: Option<usize>,
) -> Result<TwoRegimeScatter, AppError> {
    let mut levels = Vec::new();
    let mut residuals = Vec::new();
    for (i, cluster) in clusters.iter().enumerate() {
        if omit_cluster == Some(i) {
            continue;
        }
        for p in &cluster.points {
            if p.upper_limit {
                continue;
            }
            let fitted = fits[i].eval(p.bv);
            levels.push(fitted);
            residuals.push(grid_value(IndicatorKind::Lithium, p.indicator) - fitted);
        }
    }
    if levels.len() < 8 {
        return Err(AppError::insufficient(
            "Too few lithium detections for the two-regime scatter fit.",
        ));
    }

    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for &l in &levels {
        lo = lo.min(l);
        hi = hi.max(l);
    }
    if !(hi > lo) {
        return Err(AppError::internal("Degenerate lithium level range in scatter fit."));
    }

    // Deterministic grid search; ties break toward the lower transition.
    let candidates = linspace(lo, hi, TRANSITION_STEPS);
    let mut best: Option<(f64, f64, f64, f64)> = None; // (sse, transition, below, above)
    for &t in &candidates {
        let below: Vec<f64> = residuals
            .iter()
            .zip(levels.iter())
            .filter(|&(_, &l)| l < t)
            .map(|(&r, _)| r)
            .collect();
        let above: Vec<f64> = residuals
            .iter()
            .zip(levels.iter())
            .filter(|&(_, &l)| l >= t)
            .map(|(&r, _)| r)
            .collect();
        if below.len() < 3 || above.len() < 3 {
            continue;
        }
        let s_below = std_dev(&below).max(MIN_SCATTER);
        let s_above = std_dev(&above).max(MIN_SCATTER);
        let sse: f64 = below.iter().map(|r| (r / s_below).powi(2)).sum::<f64>()
            + above.iter().map(|r| (r / s_above).powi(2)).sum::<f64>()
            + 2.0 * (below.len() as f64 * s_below.ln() + above.len() as f64 * s_above.ln());
        if best.is_none_or(|(b, _, _, _)| sse < b) {
            best = Some((sse, t, s_below, s_above));
        }
    }

    match best {
        Some((_, transition, below, above)) => Ok(TwoRegimeScatter {
            transition,
            below,
            above,
            blend: 0.1,
        }),
        // No candidate split leaves both regimes populated; fall back to a
        // single pooled scatter.
        None => {
            let pooled = std_dev(&residuals).max(MIN_SCATTER);
            Ok(TwoRegimeScatter {
                transition: 0.5 * (lo + hi),
                below: pooled,
                above: pooled,
                blend: 0.1,
            })
        }
    }
}

/// Assemble all lithium extras.
pub fn lithium_extras(
    clusters: &[Cluster],
    fits: &[ColorPolyFit],
    omit_cluster: Option<usize>,
) -> Result<LithiumExtras, AppError> {
    Ok(LithiumExtras {
        primordial: primordial_fit(clusters, omit_cluster)?,
        depletion: depletion_boundary_fit(clusters, omit_cluster)?,
        scatter: fit_two_regime_scatter(clusters, fits, omit_cluster)?,
    })
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}
