//! Input/output helpers.
//!
//! - cluster calibration CSV ingest + validation (`ingest`)
//! - posterior table export (`export`)
//! - binary grid array files (`grid_file`)
//! - estimator configuration JSON (`config`)

pub mod config;
pub mod export;
pub mod grid_file;
pub mod ingest;

pub use config::*;
pub use export::*;
pub use ingest::*;
