//! Binary calibration-grid array files.
//!
//! A grid set is persisted as a named pair of array files,
//! `<name>_median.grid` / `<name>_sigma.grid`, each a 2-D array shaped
//! (numColorBins, numAgePoints). The format is deliberately dumb:
//!
//! ```text
//! magic "SAGEGRID" | u32 version | u64 rows | u64 cols | rows*cols f64
//! ```
//!
//! All integers and floats little-endian. Writing raw `f64::to_le_bytes`
//! makes the round trip bit-exact, which the loader relies on: a grid that
//! does not reload identically is corrupt.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::AppError;

const MAGIC: &[u8; 8] = b"SAGEGRID";
const VERSION: u32 = 1;

/// Conventional extension of grid array files.
pub const GRID_EXT: &str = "grid";

/// Paths of the `<stem>_median.grid` / `<stem>_sigma.grid` pair.
///
/// A trailing `.grid` on the stem is stripped first, so callers may pass
/// either form.
pub fn grid_pair_paths(stem: &Path) -> (PathBuf, PathBuf) {
    let base = stem.to_string_lossy();
    let base = base.strip_suffix(".grid").unwrap_or(&base).to_string();
    (
        PathBuf::from(format!("{base}_median.{GRID_EXT}")),
        PathBuf::from(format!("{base}_sigma.{GRID_EXT}")),
    )
}

/// Write a 2-D array to `path`.
pub fn write_array(path: &Path, rows: &[Vec<f64>]) -> Result<(), AppError> {
    if rows.is_empty() || rows[0].is_empty() {
        return Err(AppError::internal("Refusing to write an empty grid array."));
    }
    let cols = rows[0].len();
    if rows.iter().any(|r| r.len() != cols) {
        return Err(AppError::internal("Ragged grid array; all rows must have equal length."));
    }

    let file = File::create(path)
        .map_err(|e| {
            AppError::input(format!("Failed to create grid file '{}': {e}", path.display()))
        })?;
    let mut out = BufWriter::new(file);

    let write_err = |e: std::io::Error| {
        AppError::input(format!("Failed to write grid file '{}': {e}", path.display()))
    };
    out.write_all(MAGIC).map_err(write_err)?;
    out.write_all(&VERSION.to_le_bytes()).map_err(write_err)?;
    out.write_all(&(rows.len() as u64).to_le_bytes()).map_err(write_err)?;
    out.write_all(&(cols as u64).to_le_bytes()).map_err(write_err)?;
    for row in rows {
        for &v in row {
            out.write_all(&v.to_le_bytes()).map_err(write_err)?;
        }
    }
    out.flush().map_err(write_err)
}

/// Read a 2-D array, tolerating presence/absence of the `.grid` extension.
///
/// Missing or malformed files are fatal; there is no partial or default
/// substitution for a calibration grid.
pub fn read_array(path: &Path) -> Result<Vec<Vec<f64>>, AppError> {
    let resolved = resolve_grid_path(path)?;
    let file = File::open(&resolved).map_err(|e| {
        AppError::input(format!("Failed to open grid file '{}': {e}", resolved.display()))
    })?;
    let mut input = BufReader::new(file);

    let read_err =
        |e: std::io::Error| {
            AppError::input(format!("Failed to read grid file '{}': {e}", resolved.display()))
        };

    let mut magic = [0u8; 8];
    input.read_exact(&mut magic).map_err(read_err)?;
    if &magic != MAGIC {
        return Err(AppError::input(format!(
            "'{}' is not a calibration grid file (bad magic).",
            resolved.display()
        )));
    }

    let mut u32_buf = [0u8; 4];
    input.read_exact(&mut u32_buf).map_err(read_err)?;
    let version = u32::from_le_bytes(u32_buf);
    if version != VERSION {
        return Err(AppError::input(format!(
            "Unsupported grid file version {version} in '{}'.",
            resolved.display()
        )));
    }

    let mut u64_buf = [0u8; 8];
    input.read_exact(&mut u64_buf).map_err(read_err)?;
    let rows = u64::from_le_bytes(u64_buf) as usize;
    input.read_exact(&mut u64_buf).map_err(read_err)?;
    let cols = u64::from_le_bytes(u64_buf) as usize;

    if rows == 0 || cols == 0 || rows.saturating_mul(cols) > 100_000_000 {
        return Err(AppError::input(format!(
            "Implausible grid dimensions {rows}x{cols} in '{}'.",
            resolved.display()
        )));
    }

    let mut out = Vec::with_capacity(rows);
    let mut f64_buf = [0u8; 8];
    for _ in 0..rows {
        let mut row = Vec::with_capacity(cols);
        for _ in 0..cols {
            input.read_exact(&mut f64_buf).map_err(read_err)?;
            row.push(f64::from_le_bytes(f64_buf));
        }
        out.push(row);
    }
    Ok(out)
}

/// Try the path as given, then with/without the conventional extension.
fn resolve_grid_path(path: &Path) -> Result<PathBuf, AppError> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    let candidate = match path.extension() {
        Some(ext) if ext == GRID_EXT => path.with_extension(""),
        _ => path.with_extension(GRID_EXT),
    };
    if candidate.exists() {
        return Ok(candidate);
    }
    Err(AppError::input(format!("Calibration grid file '{}' not found.", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("stellar_ages_gridfile_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn round_trip_is_bit_exact() {
        let rows = vec![
            vec![1.0, -2.5, std::f64::consts::PI, 1e-300],
            vec![0.0, f64::MIN_POSITIVE, 1e300, -0.0],
        ];
        let path = temp_dir().join("pair_median.grid");
        write_array(&path, &rows).unwrap();
        let back = read_array(&path).unwrap();
        assert_eq!(rows.len(), back.len());
        for (a, b) in rows.iter().zip(back.iter()) {
            for (x, y) in a.iter().zip(b.iter()) {
                assert_eq!(x.to_bits(), y.to_bits());
            }
        }
    }

    #[test]
    fn loader_tolerates_missing_extension() {
        let rows = vec![vec![42.0; 3]; 2];
        let dir = temp_dir();
        let path = dir.join("noext_median.grid");
        write_array(&path, &rows).unwrap();
        // Query without the extension resolves to the same file.
        let back = read_array(&dir.join("noext_median")).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = read_array(Path::new("/nonexistent/grid_median")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn pair_paths_strip_duplicate_extension() {
        let (median, sigma) = grid_pair_paths(Path::new("out/calcium.grid"));
        assert_eq!(median, PathBuf::from("out/calcium_median.grid"));
        assert_eq!(sigma, PathBuf::from("out/calcium_sigma.grid"));
    }
}
