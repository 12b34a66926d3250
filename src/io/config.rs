//! Estimator configuration persistence (JSON).
//!
//! A config file names the persisted grid pair plus the residual distribution,
//! so an estimator can be rebuilt without re-fitting the calibration clusters.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::domain::EstimatorConfig;
use crate::error::AppError;

pub fn save_config(path: &Path, config: &EstimatorConfig) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create '{}': {e}", path.display())))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, config)
        .map_err(|e| AppError::input(format!("Failed to write '{}': {e}", path.display())))?;
    Ok(())
}

pub fn load_config(path: &Path) -> Result<EstimatorConfig, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::input(format!("Failed to open config '{}': {e}", path.display()))
    })?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|e| {
        AppError::input(format!("Malformed config '{}': {e}", path.display()))
    })
}
