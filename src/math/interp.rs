//! Interpolation over calibration grids.
//!
//! The calibration surfaces are dense enough that bilinear interpolation is
//! sufficient; higher-order schemes buy nothing at 1000 age points per row.
//! Extrapolation policy is flat on every axis: the age grid extends past the
//! oldest calibration cluster, and clamping beats inventing trends there.

/// Piecewise-linear interpolation on a sorted grid with flat extrapolation.
pub fn interp1(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    debug_assert!(!xs.is_empty());
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }
    // partition_point: first index with xs[i] > x; always in 1..len here.
    let i = xs.partition_point(|&v| v <= x);
    let (x0, x1) = (xs[i - 1], xs[i]);
    let (y0, y1) = (ys[i - 1], ys[i]);
    if (x1 - x0).abs() < 1e-300 {
        return y0;
    }
    let u = (x - x0) / (x1 - x0);
    y0 + u * (y1 - y0)
}

/// Interpolate every age column of a (colors x ages) surface at color `bv`.
///
/// Queries always land on grid ages, so only the color axis needs
/// interpolation; this is the row-blend specialization of `bilinear`.
pub fn interpolate_rows(colors: &[f64], surface: &[Vec<f64>], bv: f64) -> Vec<f64> {
    debug_assert_eq!(colors.len(), surface.len());
    if bv <= colors[0] {
        return surface[0].clone();
    }
    if bv >= colors[colors.len() - 1] {
        return surface[surface.len() - 1].clone();
    }
    let i = colors.partition_point(|&v| v <= bv);
    let u = (bv - colors[i - 1]) / (colors[i] - colors[i - 1]);
    surface[i - 1]
        .iter()
        .zip(surface[i].iter())
        .map(|(&a, &b)| a + u * (b - a))
        .collect()
}

/// Bilinear interpolation of a (colors x ages) surface at `(bv, age)`.
pub fn bilinear(colors: &[f64], ages: &[f64], surface: &[Vec<f64>], bv: f64, age: f64) -> f64 {
    let row = interpolate_rows(colors, surface, bv);
    interp1(ages, &row, age)
}
