//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the inference code stays clean and testable
//! - output changes are localized (important for future snapshot tests)

use crate::domain::{AgeStats, IndicatorKind, Measurement, Posterior};
use crate::io::ingest::IngestedClusters;

/// Format the run header: which indicators ran, with what inputs.
pub fn format_run_header(queries: &[(IndicatorKind, Measurement)]) -> String {
    let mut out = String::new();
    out.push_str("=== stellar-age - Bayesian stellar age estimation ===\n");
    for (kind, m) in queries {
        let flag = if m.upper_limit { " (upper limit)" } else { "" };
        out.push_str(&format!(
            "{}: {} = {}{}{}\n",
            kind.display_name(),
            kind.unit_label(),
            fmt_value(m.indicator),
            flag,
            match kind {
                IndicatorKind::Lithium => format!(" | B-V = {}", fmt_value(m.bv)),
                IndicatorKind::Calcium => String::new(),
            }
        ));
        if let Some(bound) = m.max_age {
            out.push_str(&format!("  age prior: <= {} Myr\n", fmt_age(bound)));
        }
    }
    out
}

/// Format one posterior summary block.
pub fn format_posterior(label: &str, posterior: &Posterior) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{label}:\n"));
    if posterior.unconstrained {
        out.push_str("  (!) posterior was unconstrained by the data; showing a flat fallback\n");
    }
    match posterior.stats {
        AgeStats::TwoSided {
            lo95,
            lo68,
            median,
            hi68,
            hi95,
        } => {
            out.push_str(&format!(
                "  age = {} +{} / -{} Myr (68%)\n",
                fmt_age(median),
                fmt_age(hi68 - median),
                fmt_age(median - lo68),
            ));
            out.push_str(&format!(
                "  68% interval: [{}, {}] Myr\n",
                fmt_age(lo68),
                fmt_age(hi68)
            ));
            out.push_str(&format!(
                "  95% interval: [{}, {}] Myr\n",
                fmt_age(lo95),
                fmt_age(hi95)
            ));
        }
        AgeStats::LowerLimit {
            sigma3,
            sigma2,
            sigma1,
        } => {
            out.push_str("  upper-limit measurement: one-sided lower bounds on age\n");
            out.push_str(&format!("  age > {} Myr (1 sigma)\n", fmt_age(sigma1)));
            out.push_str(&format!("  age > {} Myr (2 sigma)\n", fmt_age(sigma2)));
            out.push_str(&format!("  age > {} Myr (3 sigma)\n", fmt_age(sigma3)));
        }
    }
    out
}

/// Format ingest diagnostics (row errors are reported, never silently dropped).
pub fn format_ingest_summary(path: &str, ingest: &IngestedClusters) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Calibration: {} | {} clusters | {}/{} rows used\n",
        path,
        ingest.clusters.len(),
        ingest.rows_used,
        ingest.rows_read
    ));
    for cluster in &ingest.clusters {
        out.push_str(&format!(
            "  {:<12} age={:>7} Myr  stars={}\n",
            cluster.name,
            fmt_age(cluster.age),
            cluster.points.len()
        ));
    }
    if !ingest.row_errors.is_empty() {
        out.push_str(&format!("  {} row(s) skipped:\n", ingest.row_errors.len()));
        for err in ingest.row_errors.iter().take(10) {
            out.push_str(&format!("    line {}: {}\n", err.line, err.message));
        }
        if ingest.row_errors.len() > 10 {
            out.push_str(&format!(
                "    ... and {} more\n",
                ingest.row_errors.len() - 10
            ));
        }
    }
    out
}

fn fmt_age(age: f64) -> String {
    if age.abs() >= 100.0 {
        format!("{age:.0}")
    } else if age.abs() >= 10.0 {
        format!("{age:.1}")
    } else {
        format!("{age:.2}")
    }
}

fn fmt_value(v: f64) -> String {
    if v.abs() >= 100.0 {
        format!("{v:.1}")
    } else {
        format!("{v:.3}")
    }
}
