//! Posterior CSV export.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::AppError;

/// Write a posterior density as a two-column CSV (`age_myr,probability`).
pub fn write_posterior_csv(path: &Path, ages: &[f64], density: &[f64]) -> Result<(), AppError> {
    if ages.len() != density.len() {
        return Err(AppError::internal(format!(
            "Posterior export length mismatch: {} ages vs {} densities.",
            ages.len(),
            density.len()
        )));
    }

    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create '{}': {e}", path.display())))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "age_myr,probability")
        .map_err(|e| AppError::input(format!("Failed to write '{}': {e}", path.display())))?;
    for (age, p) in ages.iter().zip(density) {
        writeln!(writer, "{age},{p}")
            .map_err(|e| AppError::input(format!("Failed to write '{}': {e}", path.display())))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to flush '{}': {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_rows() {
        let dir = std::env::temp_dir().join(format!("stellar_ages_export_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("posterior.csv");

        write_posterior_csv(&path, &[1.0, 2.0], &[0.25, 0.75]).unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "age_myr,probability");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1,"));
    }

    #[test]
    fn length_mismatch_is_internal_error() {
        let dir = std::env::temp_dir().join(format!("stellar_ages_export_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("mismatch.csv");
        let err = write_posterior_csv(&path, &[1.0], &[0.25, 0.75]).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
