//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the indicator taxonomy (`IndicatorKind`) and its calibration bundles
//! - per-star measurements (`Measurement`) and cluster calibration data
//! - inference outputs (`Posterior`, `AgeStats`)
//! - run/estimator configuration (`RunConfig`, `EstimatorConfig`)

pub mod types;

pub use types::*;
