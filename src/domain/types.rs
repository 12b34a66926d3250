//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during grid construction and inference
//! - exported to JSON/CSV
//! - reloaded later for follow-up queries without refitting

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which activity indicator a grid/estimator is calibrated for.
///
/// Calcium works in log(R'HK) space; lithium works in equivalent-width
/// milli-angstroms (linear input, log10 internally on the grid surface).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    Calcium,
    Lithium,
}

impl IndicatorKind {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            IndicatorKind::Calcium => "calcium",
            IndicatorKind::Lithium => "lithium",
        }
    }

    /// Unit label of raw measurements for this indicator.
    pub fn unit_label(self) -> &'static str {
        match self {
            IndicatorKind::Calcium => "log(R'HK)",
            IndicatorKind::Lithium => "mA",
        }
    }

    /// Calibration constants bundle for this indicator.
    ///
    /// Selected once at estimator construction; replaces any string-based
    /// dispatch on indicator names.
    pub fn bundle(self) -> IndicatorBundle {
        match self {
            IndicatorKind::Calcium => IndicatorBundle {
                kind: self,
                bv_range: (0.45, 0.9),
                indicator_range: (-5.5, -3.5),
                num_colors: 21,
                bv_uncertainty: 0.01,
                measure_err: 0.1,
                num_bv_points: 30,
            },
            IndicatorKind::Lithium => IndicatorBundle {
                kind: self,
                bv_range: (0.35, 1.9),
                indicator_range: (0.5, 1500.0),
                num_colors: 150,
                bv_uncertainty: 0.01,
                measure_err: 15.0,
                num_bv_points: 30,
            },
        }
    }
}

/// Age of the galaxy in Myr; upper end of every age grid.
pub const GALAXY_AGE: f64 = 13000.0;

/// Number of points on the age grid.
pub const NUM_AGE_POINTS: usize = 1000;

/// Calibration constants for one indicator.
///
/// Immutable after construction; an `AgeEstimator` owns a copy and derives its
/// age/color grids from it.
#[derive(Debug, Clone)]
pub struct IndicatorBundle {
    pub kind: IndicatorKind,
    /// Valid (B-V)o range of the calibration.
    pub bv_range: (f64, f64),
    /// Valid indicator range: log(R'HK) for calcium, linear EW mA for lithium.
    pub indicator_range: (f64, f64),
    /// Number of color bins on the calibration grid.
    pub num_colors: usize,
    /// Default B-V uncertainty when a measurement supplies none.
    pub bv_uncertainty: f64,
    /// Default indicator uncertainty when a measurement supplies none
    /// (log(R'HK) dex for calcium, mA for lithium).
    pub measure_err: f64,
    /// Target point count after desampling the color-uncertainty window.
    pub num_bv_points: usize,
}

impl IndicatorBundle {
    /// The shared age grid: `NUM_AGE_POINTS` linearly spaced ages in Myr,
    /// 1 Myr to the galaxy age. Strictly increasing.
    pub fn age_grid(&self) -> Vec<f64> {
        linspace(1.0, GALAXY_AGE, NUM_AGE_POINTS)
    }

    /// The color grid: `num_colors` linearly spaced B-V bins over `bv_range`.
    pub fn color_grid(&self) -> Vec<f64> {
        linspace(self.bv_range.0, self.bv_range.1, self.num_colors)
    }

    /// Linear indicator axis used for measurement-uncertainty integration
    /// (lithium only; calcium never integrates over the indicator axis).
    pub fn indicator_axis(&self) -> Vec<f64> {
        linspace(self.indicator_range.0, self.indicator_range.1, 1000)
    }
}

/// Evenly spaced grid including both endpoints.
pub fn linspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    let n = n.max(2);
    let step = (max - min) / (n as f64 - 1.0);
    (0..n).map(|i| min + step * i as f64).collect()
}

/// One star's indicator measurement, supplied per query.
#[derive(Debug, Clone)]
pub struct Measurement {
    /// Corrected (B-V)o color.
    pub bv: f64,
    /// Optional B-V uncertainty (bundle default when `None`).
    pub bv_err: Option<f64>,
    /// Indicator value: log(R'HK) for calcium, EW mA for lithium.
    pub indicator: f64,
    /// Optional indicator uncertainty (bundle default when `None`).
    pub indicator_err: Option<f64>,
    /// The indicator reading is a detection upper limit, not a detection.
    pub upper_limit: bool,
    /// Optional hard prior bound on age (Myr).
    pub max_age: Option<f64>,
}

impl Measurement {
    /// A plain detection with default uncertainties.
    pub fn detection(bv: f64, indicator: f64) -> Self {
        Self {
            bv,
            bv_err: None,
            indicator,
            indicator_err: None,
            upper_limit: false,
            max_age: None,
        }
    }
}

/// Posterior summary statistics.
///
/// Two-sided for detections; one-sided lower-limit ages for upper-limit
/// measurements (an EW upper limit only bounds the age from below).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AgeStats {
    /// `[95%-low, 68%-low, median, 68%-high, 95%-high]` in Myr.
    TwoSided {
        lo95: f64,
        lo68: f64,
        median: f64,
        hi68: f64,
        hi95: f64,
    },
    /// Lower-limit ages at 3/2/1 sigma confidence, ascending.
    LowerLimit { sigma3: f64, sigma2: f64, sigma1: f64 },
}

impl AgeStats {
    /// The five (or three) ages in storage order, ascending.
    pub fn values(&self) -> Vec<f64> {
        match *self {
            AgeStats::TwoSided {
                lo95,
                lo68,
                median,
                hi68,
                hi95,
            } => vec![lo95, lo68, median, hi68, hi95],
            AgeStats::LowerLimit {
                sigma3,
                sigma2,
                sigma1,
            } => vec![sigma3, sigma2, sigma1],
        }
    }
}

/// A normalized posterior age distribution aligned to the age grid.
///
/// Immutable once computed; consumed by reporting, plotting, and export.
#[derive(Debug, Clone)]
pub struct Posterior {
    /// Probability density per age-grid point; trapezoidal integral is 1
    /// (the degenerate-input fallback normalizes a uniform array instead).
    pub density: Vec<f64>,
    pub stats: AgeStats,
    pub upper_limit: bool,
    /// Set when the likelihood-prior product was identically zero and a
    /// uniform array was substituted; the result is not well constrained.
    pub unconstrained: bool,
}

/// One calibration-cluster member star.
#[derive(Debug, Clone)]
pub struct ClusterPoint {
    pub bv: f64,
    /// Indicator value in the kind's raw units (log(R'HK) or EW mA).
    pub indicator: f64,
    /// Lithium non-detections enter the fits only through scatter handling.
    pub upper_limit: bool,
}

/// A star cluster of known age used for calibration.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub name: String,
    /// Cluster age in Myr.
    pub age: f64,
    pub points: Vec<ClusterPoint>,
}

/// Pointers to a persisted grid set, the "save configuration" value object.
///
/// Replaces any notion of process-wide mutable default-grid paths: defaults are
/// whatever config file the caller passes to the estimator constructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub indicator: IndicatorKind,
    pub median_grid: PathBuf,
    pub sigma_grid: PathBuf,
    pub residual_dist: PathBuf,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Corrected (B-V)o color (optional for calcium-only queries).
    pub bv: Option<f64>,
    /// Calcium log(R'HK) measurement.
    pub rhk: Option<f64>,
    /// Lithium EW measurement (mA; values in (0, 3) are log10(mA)).
    pub li: Option<f64>,
    pub bv_err: Option<f64>,
    pub li_err: Option<f64>,
    pub upper_limit: bool,
    pub max_age: f64,

    /// Optional saved grid-set configs; synthetic default grids otherwise.
    pub calcium_config: Option<PathBuf>,
    pub lithium_config: Option<PathBuf>,
    /// Seed for the synthetic calibration sample when no config is given.
    pub sample_seed: u64,

    pub file_stem: String,
    pub save_csv: bool,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_grid_is_strictly_increasing_with_expected_endpoints() {
        let grid = IndicatorKind::Calcium.bundle().age_grid();
        assert_eq!(grid.len(), NUM_AGE_POINTS);
        assert!((grid[0] - 1.0).abs() < 1e-12);
        assert!((grid[grid.len() - 1] - GALAXY_AGE).abs() < 1e-9);
        assert!(grid.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn color_grids_cover_calibrated_ranges() {
        for kind in [IndicatorKind::Calcium, IndicatorKind::Lithium] {
            let bundle = kind.bundle();
            let colors = bundle.color_grid();
            assert!((colors[0] - bundle.bv_range.0).abs() < 1e-12);
            assert!((colors[colors.len() - 1] - bundle.bv_range.1).abs() < 1e-12);
            assert!(colors.windows(2).all(|w| w[1] > w[0]));
        }
    }
}
