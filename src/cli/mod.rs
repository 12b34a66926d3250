//! Command-line parsing for the stellar age estimator.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::IndicatorKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "stellar-age",
    version,
    about = "Bayesian stellar ages from calcium and lithium indicators"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Estimate a star's age from calcium and/or lithium measurements.
    Estimate(EstimateArgs),
    /// Build calibration grids (from a cluster CSV or the embedded synthetic
    /// sample) and save them for later runs.
    MakeGrids(MakeGridsArgs),
}

/// Options for a single-star age estimate.
#[derive(Debug, Parser, Clone)]
pub struct EstimateArgs {
    /// Corrected (B-V)o color. Required for lithium queries.
    #[arg(short = 'b', long)]
    pub bv: Option<f64>,

    /// Calcium chromospheric activity, log(R'HK).
    #[arg(short = 'r', long)]
    pub rhk: Option<f64>,

    /// Lithium equivalent width in mA (values in (0, 3) are read as log10).
    #[arg(short = 'l', long)]
    pub li: Option<f64>,

    /// B-V uncertainty.
    #[arg(long)]
    pub bv_err: Option<f64>,

    /// Lithium EW uncertainty in mA.
    #[arg(long)]
    pub li_err: Option<f64>,

    /// Treat the lithium EW as a detection upper limit.
    #[arg(long)]
    pub upper_limit: bool,

    /// Hard upper bound on age in Myr (e.g. from isochrones).
    #[arg(long, default_value_t = crate::domain::GALAXY_AGE)]
    pub max_age: f64,

    /// Saved calcium grid-set config JSON (synthetic default grids otherwise).
    #[arg(long, value_name = "JSON")]
    pub calcium_config: Option<PathBuf>,

    /// Saved lithium grid-set config JSON (synthetic default grids otherwise).
    #[arg(long, value_name = "JSON")]
    pub lithium_config: Option<PathBuf>,

    /// Seed for the synthetic calibration sample.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output filename stem for saved posteriors.
    #[arg(short = 'o', long, default_value = "stellar_age")]
    pub output: String,

    /// Write each posterior to `<output>_<indicator>.csv`.
    #[arg(long)]
    pub save: bool,

    /// Render an ASCII posterior plot in the terminal (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

/// Options for building and saving calibration grids.
#[derive(Debug, Parser, Clone)]
pub struct MakeGridsArgs {
    /// Which indicator to calibrate.
    #[arg(short = 'i', long, value_enum)]
    pub indicator: IndicatorKind,

    /// Cluster calibration CSV (columns: cluster, age_myr, bv, indicator,
    /// optional upper_limit). Embedded synthetic sample when omitted.
    #[arg(long, value_name = "CSV")]
    pub clusters: Option<PathBuf>,

    /// Seed for the synthetic calibration sample.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Omit the i-th cluster (age order, 0-based) for leave-one-out checks.
    #[arg(long)]
    pub omit_cluster: Option<usize>,

    /// Output stem; writes `<stem>_median.grid`, `<stem>_sigma.grid`,
    /// `<stem>_residuals.json`, and `<stem>.json` (the grid-set config).
    #[arg(short = 'o', long, default_value = "calibration")]
    pub output: String,
}
