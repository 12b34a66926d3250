//! Cluster calibration CSV ingest.
//!
//! Turns a calibration table into `Cluster` groups that are safe to fit.
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Deterministic behavior** (clusters ordered by age; no hidden state)
//!
//! Expected columns: `cluster`, `age_myr`, `bv`, `indicator`, and an optional
//! `upper_limit` (`1`/`true` marks a lithium non-detection).

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{Cluster, ClusterPoint};
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: clusters sorted by age + row diagnostics.
#[derive(Debug, Clone)]
pub struct IngestedClusters {
    pub clusters: Vec<Cluster>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

/// Load and group a calibration CSV.
pub fn load_clusters_csv(path: &Path) -> Result<IngestedClusters, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    for required in ["cluster", "age_myr", "bv", "indicator"] {
        if !header_map.contains_key(required) {
            return Err(AppError::input(format!(
                "Calibration CSV is missing required column '{required}'."
            )));
        }
    }

    let mut groups: HashMap<String, (f64, Vec<ClusterPoint>)> = HashMap::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;
    let mut rows_used = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1; records start on line 2.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, &header_map) {
            Ok((name, age, point)) => {
                let entry = groups.entry(name).or_insert_with(|| (age, Vec::new()));
                if (entry.0 - age).abs() > 1e-9 {
                    row_errors.push(RowError {
                        line,
                        message: format!(
                            "Inconsistent age {age} for cluster (first seen {}).",
                            entry.0
                        ),
                    });
                    continue;
                }
                entry.1.push(point);
                rows_used += 1;
            }
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    let mut clusters: Vec<Cluster> = groups
        .into_iter()
        .map(|(name, (age, points))| Cluster { name, age, points })
        .collect();
    clusters.sort_by(|a, b| a.age.partial_cmp(&b.age).unwrap_or(std::cmp::Ordering::Equal));

    if clusters.len() < 2 {
        return Err(AppError::insufficient(format!(
            "Calibration CSV yielded {} cluster(s); at least 2 are required.",
            clusters.len()
        )));
    }

    Ok(IngestedClusters {
        clusters,
        row_errors,
        rows_read,
        rows_used,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.to_lowercase(), i))
        .collect()
}

fn parse_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
) -> Result<(String, f64, ClusterPoint), String> {
    let field = |name: &str| -> Option<&str> { header_map.get(name).and_then(|&i| record.get(i)) };

    let name = field("cluster").unwrap_or("").to_string();
    if name.is_empty() {
        return Err("Missing cluster name.".to_string());
    }

    let age = parse_f64(field("age_myr"), "age_myr")?;
    if !(age > 0.0) {
        return Err(format!("Cluster age must be positive Myr; got {age}."));
    }
    let bv = parse_f64(field("bv"), "bv")?;
    let indicator = parse_f64(field("indicator"), "indicator")?;

    let upper_limit = match field("upper_limit") {
        None | Some("") => false,
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
    };

    Ok((
        name,
        age,
        ClusterPoint {
            bv,
            indicator,
            upper_limit,
        },
    ))
}

fn parse_f64(value: Option<&str>, column: &str) -> Result<f64, String> {
    let raw = value.unwrap_or("");
    if raw.is_empty() {
        return Err(format!("Missing value in column '{column}'."));
    }
    let parsed: f64 = raw
        .parse()
        .map_err(|_| format!("Invalid number '{raw}' in column '{column}'."))?;
    if !parsed.is_finite() {
        return Err(format!("Non-finite value in column '{column}'."));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_csv(name: &str, body: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stellar_ages_ingest_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn groups_rows_into_age_sorted_clusters() {
        let path = write_csv(
            "ok.csv",
            "cluster,age_myr,bv,indicator,upper_limit\n\
             hyades,700,0.6,-4.5,\n\
             pleiades,125,0.7,-4.3,\n\
             hyades,700,0.8,-4.6,0\n\
             pleiades,125,0.5,-4.2,\n",
        );
        let out = load_clusters_csv(&path).unwrap();
        assert_eq!(out.rows_read, 4);
        assert_eq!(out.rows_used, 4);
        assert!(out.row_errors.is_empty());
        assert_eq!(out.clusters.len(), 2);
        assert_eq!(out.clusters[0].name, "pleiades");
        assert_eq!(out.clusters[1].points.len(), 2);
    }

    #[test]
    fn bad_rows_are_reported_not_fatal() {
        let path = write_csv(
            "bad_rows.csv",
            "cluster,age_myr,bv,indicator\n\
             a,125,0.7,-4.3\n\
             a,125,oops,-4.3\n\
             a,-5,0.7,-4.3\n\
             b,700,0.6,-4.5\n",
        );
        let out = load_clusters_csv(&path).unwrap();
        assert_eq!(out.row_errors.len(), 2);
        assert_eq!(out.rows_used, 2);
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let path = write_csv("no_bv.csv", "cluster,age_myr,indicator\na,125,-4.3\n");
        let err = load_clusters_csv(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn single_cluster_is_insufficient() {
        let path = write_csv(
            "one_cluster.csv",
            "cluster,age_myr,bv,indicator\na,125,0.7,-4.3\na,125,0.6,-4.2\n",
        );
        let err = load_clusters_csv(&path).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
