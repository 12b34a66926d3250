//! Calibration fitting.
//!
//! Responsibilities:
//!
//! - per-cluster indicator-vs-color fits and scatter estimates
//! - median/scatter-vs-age curves per color bin (with boundary anchors)
//! - the lithium extras: primordial relation, depletion boundary, two-regime
//!   scatter
//! - the empirical residual distribution used by the likelihood

pub mod calibration;
pub mod histogram;

pub use calibration::*;
pub use histogram::*;
