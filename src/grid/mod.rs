//! Calibration grid model.
//!
//! Two 2-D surfaces (median indicator value and scatter) indexed by
//! (color bin, age point). Built once from calibration clusters, or reloaded
//! from persisted array files; strictly read-only during inference.

use std::path::Path;

use rayon::prelude::*;

use crate::domain::{Cluster, IndicatorBundle, IndicatorKind};
use crate::error::AppError;
use crate::fit::{LithiumExtras, ResidualDist, lithium_extras, per_cluster_fits, vs_age_curves};
use crate::io::grid_file::{grid_pair_paths, read_array, write_array};
use crate::math::{bilinear, interpolate_rows};

/// The (median, sigma) calibration surfaces plus their axes.
#[derive(Debug, Clone)]
pub struct CalibrationGrid {
    pub kind: IndicatorKind,
    pub colors: Vec<f64>,
    pub ages: Vec<f64>,
    /// Expected indicator value (grid space) per (color, age) cell.
    pub median: Vec<Vec<f64>>,
    /// Scatter per cell; strictly positive.
    pub sigma: Vec<Vec<f64>>,
}

/// Grid construction output: the surfaces plus the residual distribution fit
/// from the same calibration pass.
#[derive(Debug)]
pub struct GridBuild {
    pub grid: CalibrationGrid,
    pub residuals: ResidualDist,
}

impl CalibrationGrid {
    /// Build both surfaces from calibration clusters.
    ///
    /// Color bins are independent, so rows are fit in parallel.
    /// `omit_cluster` removes one cluster for leave-one-out validation.
    pub fn build(
        kind: IndicatorKind,
        clusters: &[Cluster],
        omit_cluster: Option<usize>,
    ) -> Result<GridBuild, AppError> {
        if let Some(i) = omit_cluster {
            if i >= clusters.len() {
                return Err(AppError::input(format!(
                    "Cannot omit cluster {i}; only {} clusters supplied.",
                    clusters.len()
                )));
            }
        }

        let bundle = kind.bundle();
        let colors = bundle.color_grid();
        let ages = bundle.age_grid();

        let (fits, scatters) = per_cluster_fits(clusters, kind)?;
        let extras: Option<LithiumExtras> = match kind {
            IndicatorKind::Calcium => None,
            IndicatorKind::Lithium => Some(lithium_extras(clusters, &fits, omit_cluster)?),
        };

        let rows: Vec<(Vec<f64>, Vec<f64>)> = colors
            .par_iter()
            .map(|&bv| {
                let (median, sigma) = vs_age_curves(
                    bv,
                    clusters,
                    &fits,
                    &scatters,
                    kind,
                    extras.as_ref(),
                    omit_cluster,
                )?;
                let median_row: Vec<f64> = ages.iter().map(|&a| median.eval(a)).collect();
                let sigma_row: Vec<f64> = ages.iter().map(|&a| sigma.eval(a)).collect();
                Ok::<_, AppError>((median_row, sigma_row))
            })
            .collect::<Result<_, _>>()?;

        let grid = CalibrationGrid {
            kind,
            colors,
            ages,
            median: rows.iter().map(|(m, _)| m.clone()).collect(),
            sigma: rows.into_iter().map(|(_, s)| s).collect(),
        };
        grid.validate()?;

        let residuals = ResidualDist::fit(&grid.calibration_residuals(clusters, omit_cluster))?;
        Ok(GridBuild { grid, residuals })
    }

    /// Standardized residuals of the calibration detections against the grid.
    ///
    /// Calcium residuals are standardized by the local sigma (the likelihood
    /// divides by sigma again at query time); lithium residuals are raw
    /// log-EW offsets, matching the log-space evaluation of the lithium
    /// likelihood.
    fn calibration_residuals(&self, clusters: &[Cluster], omit_cluster: Option<usize>) -> Vec<f64> {
        let mut out = Vec::new();
        for (i, cluster) in clusters.iter().enumerate() {
            if omit_cluster == Some(i) {
                continue;
            }
            for p in &cluster.points {
                if p.upper_limit {
                    continue;
                }
                let bv = p.bv.clamp(self.colors[0], self.colors[self.colors.len() - 1]);
                let mu = bilinear(&self.colors, &self.ages, &self.median, bv, cluster.age);
                match self.kind {
                    IndicatorKind::Calcium => {
                        let sig = bilinear(&self.colors, &self.ages, &self.sigma, bv, cluster.age);
                        if sig > 0.0 {
                            out.push((p.indicator - mu) / sig);
                        }
                    }
                    IndicatorKind::Lithium => {
                        out.push(p.indicator.max(1e-3).log10() - mu);
                    }
                }
            }
        }
        out
    }

    /// Median surface interpolated at `bv`, one value per age-grid point.
    pub fn median_at_color(&self, bv: f64) -> Vec<f64> {
        interpolate_rows(&self.colors, &self.median, bv)
    }

    /// Sigma surface interpolated at `bv`, one value per age-grid point.
    pub fn sigma_at_color(&self, bv: f64) -> Vec<f64> {
        interpolate_rows(&self.colors, &self.sigma, bv)
    }

    /// Structural invariants: matching shapes, increasing axes, positive sigma.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.median.len() != self.colors.len() || self.sigma.len() != self.colors.len() {
            return Err(AppError::internal("Grid row count does not match the color grid."));
        }
        for row in self.median.iter().chain(self.sigma.iter()) {
            if row.len() != self.ages.len() {
                return Err(AppError::internal("Grid column count does not match the age grid."));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(AppError::internal("Grid contains non-finite values."));
            }
        }
        if !self.colors.windows(2).all(|w| w[1] > w[0])
            || !self.ages.windows(2).all(|w| w[1] > w[0])
        {
            return Err(AppError::internal("Grid axes must be strictly increasing."));
        }
        if self.sigma.iter().flatten().any(|&s| s <= 0.0) {
            return Err(AppError::internal("Sigma grid must be strictly positive."));
        }
        Ok(())
    }

    /// Persist as the conventional `<stem>_median.grid` / `<stem>_sigma.grid`
    /// pair. Round-trips bit-exactly.
    pub fn save(&self, stem: &Path) -> Result<(), AppError> {
        let (median_path, sigma_path) = grid_pair_paths(stem);
        write_array(&median_path, &self.median)?;
        write_array(&sigma_path, &self.sigma)
    }

    /// Load a persisted pair, validating shape against the indicator's grids.
    pub fn load(
        kind: IndicatorKind,
        median_path: &Path,
        sigma_path: &Path,
    ) -> Result<Self, AppError> {
        let bundle: IndicatorBundle = kind.bundle();
        let colors = bundle.color_grid();
        let ages = bundle.age_grid();

        let median = read_array(median_path)?;
        let sigma = read_array(sigma_path)?;

        let grid = CalibrationGrid {
            kind,
            colors,
            ages,
            median,
            sigma,
        };
        grid.validate().map_err(|e| {
            AppError::input(format!(
                    "Grid files '{}'/'{}' do not match the {} calibration shape: {e}",
                    median_path.display(),
                    sigma_path.display(),
                    kind.display_name()
                ),
            )
        })?;
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic_clusters;
    use std::path::PathBuf;

    fn temp_stem(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stellar_ages_grid_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn calcium_grid_declines_with_age() {
        let clusters = synthetic_clusters(IndicatorKind::Calcium, 42);
        let build = CalibrationGrid::build(IndicatorKind::Calcium, &clusters, None).unwrap();
        let row = build.grid.median_at_color(0.65);
        // Activity fades: the median at 50 Myr exceeds the median at 5000 Myr.
        let ages = &build.grid.ages;
        let at = |target: f64| {
            let i = ages.partition_point(|&a| a < target);
            row[i.min(row.len() - 1)]
        };
        assert!(at(50.0) > at(5000.0));
    }

    #[test]
    fn sigma_grid_is_positive_everywhere() {
        let clusters = synthetic_clusters(IndicatorKind::Lithium, 42);
        let build = CalibrationGrid::build(IndicatorKind::Lithium, &clusters, None).unwrap();
        assert!(build.grid.sigma.iter().flatten().all(|&s| s > 0.0));
        let row = build.grid.sigma_at_color(1.1);
        assert_eq!(row.len(), build.grid.ages.len());
        assert!(row.iter().all(|&s| s > 0.0));
    }

    #[test]
    fn save_load_round_trip_is_bit_exact() {
        let clusters = synthetic_clusters(IndicatorKind::Calcium, 42);
        let build = CalibrationGrid::build(IndicatorKind::Calcium, &clusters, None).unwrap();
        let stem = temp_stem("roundtrip");
        build.grid.save(&stem).unwrap();

        let (median_path, sigma_path) = grid_pair_paths(&stem);
        let loaded =
            CalibrationGrid::load(IndicatorKind::Calcium, &median_path, &sigma_path).unwrap();

        for (a, b) in build.grid.median.iter().zip(loaded.median.iter()) {
            for (x, y) in a.iter().zip(b.iter()) {
                assert_eq!(x.to_bits(), y.to_bits());
            }
        }
        for (a, b) in build.grid.sigma.iter().zip(loaded.sigma.iter()) {
            for (x, y) in a.iter().zip(b.iter()) {
                assert_eq!(x.to_bits(), y.to_bits());
            }
        }
    }

    #[test]
    fn omitting_a_cluster_changes_the_grid() {
        let clusters = synthetic_clusters(IndicatorKind::Calcium, 42);
        let full = CalibrationGrid::build(IndicatorKind::Calcium, &clusters, None).unwrap();
        let loo = CalibrationGrid::build(IndicatorKind::Calcium, &clusters, Some(1)).unwrap();
        let diff: f64 = full
            .grid
            .median
            .iter()
            .flatten()
            .zip(loo.grid.median.iter().flatten())
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(diff > 0.0);
    }

    #[test]
    fn omit_out_of_range_is_rejected() {
        let clusters = synthetic_clusters(IndicatorKind::Calcium, 42);
        let err = CalibrationGrid::build(IndicatorKind::Calcium, &clusters, Some(99)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
