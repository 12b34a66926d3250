//! Synthetic calibration-cluster generation.
//!
//! Generates member stars for a ladder of clusters with benchmark-like ages,
//! following simple activity laws:
//!
//! - calcium: log(R'HK) declines linearly in log-age with a mild color slope
//! - lithium: log(EW) starts at a primordial color relation and depletes at a
//!   color-dependent rate, with two-regime scatter (tight while undepleted,
//!   loose once depletion sets in)
//!
//! Everything is driven by a caller-supplied seed, so grids built from the
//! same seed are identical across runs.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{Cluster, ClusterPoint, IndicatorKind};

/// Benchmark cluster ladder: (name, age Myr).
const CLUSTER_AGES: [(&str, f64); 8] = [
    ("ngc2264", 5.5),
    ("ic2602", 44.0),
    ("alpha-per", 85.0),
    ("pleiades", 125.0),
    ("ngc3532", 300.0),
    ("hyades", 700.0),
    ("ngc752", 2000.0),
    ("m67", 4000.0),
];

/// Member stars generated per cluster.
const STARS_PER_CLUSTER: usize = 40;

/// log-EW level separating the tight (undepleted) and loose (depleting)
/// lithium scatter regimes.
const LI_SCATTER_TRANSITION: f64 = 1.5;

/// Calcium activity law: log(R'HK) as a function of age and color.
pub fn calcium_law(age: f64, bv: f64) -> f64 {
    -4.0 - 0.28 * age.max(1.0).log10() - 0.15 * (bv - 0.65)
}

/// Lithium activity law: log10(EW/mA) as a function of age and color.
///
/// Depletion accelerates toward redder (lower-mass) stars.
pub fn lithium_law(age: f64, bv: f64) -> f64 {
    let primordial = 2.6 - 0.25 * (bv - 0.35);
    let rate = 0.22 + 0.30 * (bv - 0.35) / (1.9 - 0.35);
    (primordial - rate * age.max(1.0).log10()).clamp(-0.3, 3.1)
}

/// Generate the full synthetic cluster ladder for one indicator.
pub fn synthetic_clusters(kind: IndicatorKind, seed: u64) -> Vec<Cluster> {
    let bundle = kind.bundle();
    let mut rng = StdRng::seed_from_u64(seed);
    // Infallible for the constants used here.
    let unit_normal = Normal::new(0.0, 1.0).expect("unit normal");

    let mut clusters = Vec::with_capacity(CLUSTER_AGES.len());
    for &(name, age) in &CLUSTER_AGES {
        let mut points = Vec::with_capacity(STARS_PER_CLUSTER);
        for _ in 0..STARS_PER_CLUSTER {
            let bv = rng.gen_range(bundle.bv_range.0..=bundle.bv_range.1);
            let z: f64 = unit_normal.sample(&mut rng);
            let point = match kind {
                IndicatorKind::Calcium => {
                    let rhk = (calcium_law(age, bv) + 0.08 * z)
                        .clamp(bundle.indicator_range.0, bundle.indicator_range.1);
                    ClusterPoint {
                        bv,
                        indicator: rhk,
                        upper_limit: false,
                    }
                }
                IndicatorKind::Lithium => {
                    let log_ew = lithium_law(age, bv);
                    let sigma = if log_ew >= LI_SCATTER_TRANSITION { 0.08 } else { 0.30 };
                    let ew = 10f64
                        .powf(log_ew + sigma * z)
                        .clamp(bundle.indicator_range.0, bundle.indicator_range.1);
                    // Faint depleted stars occasionally only yield an upper limit.
                    let upper_limit = log_ew < 0.7 && rng.r#gen::<f64>() < 0.15;
                    ClusterPoint {
                        bv,
                        indicator: ew,
                        upper_limit,
                    }
                }
            };
            points.push(point);
        }
        clusters.push(Cluster {
            name: name.to_string(),
            age,
            points,
        });
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic_per_seed() {
        let a = synthetic_clusters(IndicatorKind::Calcium, 42);
        let b = synthetic_clusters(IndicatorKind::Calcium, 42);
        for (ca, cb) in a.iter().zip(b.iter()) {
            assert_eq!(ca.name, cb.name);
            for (pa, pb) in ca.points.iter().zip(cb.points.iter()) {
                assert_eq!(pa.bv.to_bits(), pb.bv.to_bits());
                assert_eq!(pa.indicator.to_bits(), pb.indicator.to_bits());
            }
        }
        let c = synthetic_clusters(IndicatorKind::Calcium, 43);
        assert_ne!(
            a[0].points[0].indicator.to_bits(),
            c[0].points[0].indicator.to_bits()
        );
    }

    #[test]
    fn values_stay_in_calibrated_ranges() {
        for kind in [IndicatorKind::Calcium, IndicatorKind::Lithium] {
            let bundle = kind.bundle();
            for cluster in synthetic_clusters(kind, 7) {
                for p in &cluster.points {
                    assert!(p.bv >= bundle.bv_range.0 && p.bv <= bundle.bv_range.1);
                    assert!(
                        p.indicator >= bundle.indicator_range.0
                            && p.indicator <= bundle.indicator_range.1
                    );
                }
            }
        }
    }

    #[test]
    fn laws_deplete_with_age() {
        assert!(calcium_law(10.0, 0.65) > calcium_law(5000.0, 0.65));
        assert!(lithium_law(10.0, 0.65) > lithium_law(5000.0, 0.65));
        // Redder stars deplete lithium faster.
        let drop_blue = lithium_law(5.0, 0.5) - lithium_law(2000.0, 0.5);
        let drop_red = lithium_law(5.0, 1.5) - lithium_law(2000.0, 1.5);
        assert!(drop_red > drop_blue);
    }
}
