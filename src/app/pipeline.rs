//! Shared estimation pipeline used by the CLI front-end.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! estimator setup -> per-indicator posterior -> combined posterior
//!
//! The CLI can then focus on presentation (printing, plotting, exports).

use crate::data::synthetic_clusters;
use crate::domain::{IndicatorKind, Measurement, Posterior, RunConfig};
use crate::error::AppError;
use crate::estimator::AgeEstimator;
use crate::io::config::load_config;
use crate::math::{normalize, stats};

/// One indicator's query and result.
#[derive(Debug)]
pub struct IndicatorRun {
    pub kind: IndicatorKind,
    pub measurement: Measurement,
    pub posterior: Posterior,
    /// Age grid the posterior density is aligned to.
    pub ages: Vec<f64>,
}

/// All computed outputs of a single `stellar-age estimate` run.
#[derive(Debug)]
pub struct RunOutput {
    pub runs: Vec<IndicatorRun>,
    /// Product of the per-indicator posteriors when more than one ran.
    pub combined: Option<Posterior>,
}

impl RunOutput {
    /// The posterior to plot/export as "the" answer: combined when present.
    pub fn final_posterior(&self) -> &Posterior {
        self.combined
            .as_ref()
            .unwrap_or(&self.runs[self.runs.len() - 1].posterior)
    }
}

/// Execute the full estimation pipeline and return the computed outputs.
pub fn run_estimate(config: &RunConfig) -> Result<RunOutput, AppError> {
    let mut runs = Vec::new();

    if let Some(rhk) = config.rhk {
        let estimator = make_estimator(
            IndicatorKind::Calcium,
            config.calcium_config.as_deref(),
            config.sample_seed,
        )?;
        let mut m = Measurement::detection(config.bv.unwrap_or(0.65), rhk);
        m.bv_err = config.bv_err;
        m.max_age = Some(config.max_age);
        let posterior = estimator.posterior(&m)?;
        runs.push(IndicatorRun {
            kind: IndicatorKind::Calcium,
            measurement: m,
            posterior,
            ages: estimator.ages().to_vec(),
        });
    }

    if let Some(li) = config.li {
        let bv = config.bv.ok_or_else(|| {
            AppError::input("Lithium queries require a B-V color (--bv).")
        })?;
        let estimator = make_estimator(
            IndicatorKind::Lithium,
            config.lithium_config.as_deref(),
            config.sample_seed,
        )?;
        let mut m = Measurement::detection(bv, li);
        m.bv_err = config.bv_err;
        m.indicator_err = config.li_err;
        m.upper_limit = config.upper_limit;
        m.max_age = Some(config.max_age);
        let posterior = estimator.posterior(&m)?;
        runs.push(IndicatorRun {
            kind: IndicatorKind::Lithium,
            measurement: m,
            posterior,
            ages: estimator.ages().to_vec(),
        });
    }

    if runs.is_empty() {
        return Err(AppError::input("At least one indicator is required: --rhk and/or --li."));
    }

    let combined = if runs.len() > 1 {
        Some(combine_posteriors(&runs)?)
    } else {
        None
    };

    Ok(RunOutput { runs, combined })
}

/// Build an estimator from a saved grid-set config, or fit one from the
/// embedded synthetic calibration sample.
pub fn make_estimator(
    kind: IndicatorKind,
    config_path: Option<&std::path::Path>,
    seed: u64,
) -> Result<AgeEstimator, AppError> {
    match config_path {
        Some(path) => {
            let config = load_config(path)?;
            if config.indicator != kind {
                return Err(AppError::input(format!(
                    "Config '{}' is for {}, not {}.",
                    path.display(),
                    config.indicator.display_name(),
                    kind.display_name()
                )));
            }
            AgeEstimator::load(&config)
        }
        None => AgeEstimator::build(kind, &synthetic_clusters(kind, seed), None),
    }
}

/// Multiply per-indicator posteriors in log space.
///
/// Both indicators share the same age grid, so the densities align pointwise.
fn combine_posteriors(runs: &[IndicatorRun]) -> Result<Posterior, AppError> {
    let ages = &runs[0].ages;
    let mut ln_sum = vec![0.0f64; ages.len()];
    for run in runs {
        if run.ages.len() != ages.len() {
            return Err(AppError::internal("Indicator age grids are misaligned."));
        }
        for (acc, &d) in ln_sum.iter_mut().zip(&run.posterior.density) {
            *acc += d.ln();
        }
    }

    let max = ln_sum.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut density: Vec<f64> = if max.is_finite() {
        ln_sum.iter().map(|&v| (v - max).exp()).collect()
    } else {
        vec![0.0; ages.len()]
    };

    let mut unconstrained = false;
    if !normalize(ages, &mut density) {
        unconstrained = true;
        density = vec![1.0; ages.len()];
        normalize(ages, &mut density);
    }
    let stats = stats(ages, &density, false);
    Ok(Posterior {
        density,
        stats,
        upper_limit: false,
        unconstrained,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgeStats, GALAXY_AGE};

    fn base_config() -> RunConfig {
        RunConfig {
            bv: Some(0.65),
            rhk: None,
            li: None,
            bv_err: None,
            li_err: None,
            upper_limit: false,
            max_age: GALAXY_AGE,
            calcium_config: None,
            lithium_config: None,
            sample_seed: 11,
            file_stem: "out".to_string(),
            save_csv: false,
            plot: false,
            plot_width: 80,
            plot_height: 20,
        }
    }

    #[test]
    fn no_indicator_is_an_input_error() {
        let err = run_estimate(&base_config()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn lithium_without_color_is_an_input_error() {
        let mut config = base_config();
        config.bv = None;
        config.li = Some(100.0);
        let err = run_estimate(&config).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn both_indicators_produce_a_combined_posterior() {
        let mut config = base_config();
        config.rhk = Some(-4.4);
        config.li = Some(150.0);
        let out = run_estimate(&config).unwrap();
        assert_eq!(out.runs.len(), 2);
        let combined = out.combined.as_ref().unwrap();
        let AgeStats::TwoSided { median, .. } = combined.stats else {
            panic!("expected two-sided stats");
        };
        assert!(median > 1.0 && median < GALAXY_AGE);
        // The combined posterior is at least as tight as each input.
        for run in &out.runs {
            let AgeStats::TwoSided { lo68, hi68, .. } = run.posterior.stats else {
                panic!("expected two-sided stats");
            };
            let AgeStats::TwoSided { lo68: c_lo, hi68: c_hi, .. } = combined.stats else {
                panic!("expected two-sided stats");
            };
            assert!(c_hi - c_lo <= (hi68 - lo68) * 1.05);
        }
    }

    #[test]
    fn single_indicator_has_no_combined_posterior() {
        let mut config = base_config();
        config.rhk = Some(-4.5);
        let out = run_estimate(&config).unwrap();
        assert_eq!(out.runs.len(), 1);
        assert!(out.combined.is_none());
        assert!(std::ptr::eq(
            out.final_posterior(),
            &out.runs[0].posterior
        ));
    }
}
