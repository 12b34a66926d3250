//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - posterior density: `-` curve
//! - median age: `*`
//! - 68% interval bounds (or 1/2-sigma lower limits): `+`

use crate::domain::{AgeStats, Posterior};

/// Render a posterior age distribution as a fixed-size character grid.
pub fn render_posterior_plot(
    ages: &[f64],
    posterior: &Posterior,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (x_min, x_max) = axis_range(ages).unwrap_or((1.0, 13000.0));
    let d_max = posterior
        .density
        .iter()
        .copied()
        .fold(0.0f64, f64::max)
        .max(1e-300);

    let mut grid = vec![vec![' '; width]; height];
    draw_density(&mut grid, ages, &posterior.density, x_min, x_max, d_max);
    for (age, ch) in stat_markers(&posterior.stats) {
        let x = map_x(age, x_min, x_max, width);
        let d = density_at(ages, &posterior.density, age);
        let y = map_y(d, d_max, height);
        grid[y][x] = ch;
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: age=[{x_min:.0}, {x_max:.0}] Myr | density peak={d_max:.3e}\n"
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

/// The ages to mark on the curve: median + 68% bounds, or the 1/2-sigma
/// lower limits for one-sided posteriors.
fn stat_markers(stats: &AgeStats) -> Vec<(f64, char)> {
    match *stats {
        AgeStats::TwoSided {
            lo68, median, hi68, ..
        } => vec![(lo68, '+'), (hi68, '+'), (median, '*')],
        AgeStats::LowerLimit { sigma2, sigma1, .. } => vec![(sigma2, '+'), (sigma1, '*')],
    }
}

fn axis_range(ages: &[f64]) -> Option<(f64, f64)> {
    let (first, last) = (*ages.first()?, *ages.last()?);
    if first.is_finite() && last.is_finite() && last > first {
        Some((first, last))
    } else {
        None
    }
}

fn density_at(ages: &[f64], density: &[f64], age: f64) -> f64 {
    crate::math::interp1(ages, density, age)
}

fn map_x(age: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let u = ((age - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(d: f64, d_max: f64, height: usize) -> usize {
    let u = (d / d_max).clamp(0.0, 1.0);
    // density=max -> row 0
    (height as f64 - 1.0 - u * (height as f64 - 1.0)).round() as usize
}

fn draw_density(
    grid: &mut [Vec<char>],
    ages: &[f64],
    density: &[f64],
    x_min: f64,
    x_max: f64,
    d_max: f64,
) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for (&age, &d) in ages.iter().zip(density) {
        let x = map_x(age, x_min, x_max, width);
        let y = map_y(d, d_max, height);
        if let Some((x0, y0)) = prev {
            if (x0, y0) != (x, y) {
                draw_line(grid, x0, y0, x, y, '-');
            }
        } else {
            grid[y][x] = '-';
        }
        prev = Some((x, y));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::linspace;
    use crate::math::{gaussian, normalize, stats};

    #[test]
    fn plot_has_expected_shape_and_markers() {
        let ages = linspace(1.0, 13000.0, 1000);
        let mut density = gaussian(&ages, 4000.0, 600.0);
        normalize(&ages, &mut density);
        let posterior = Posterior {
            stats: stats(&ages, &density, false),
            density,
            upper_limit: false,
            unconstrained: false,
        };

        let txt = render_posterior_plot(&ages, &posterior, 40, 10);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines.len(), 11);
        assert!(lines[0].starts_with("Plot: age=[1, 13000] Myr"));
        assert!(lines[1..].iter().all(|l| l.len() <= 40));
        assert_eq!(txt.matches('*').count(), 1);
        assert!(txt.matches('+').count() >= 1);
    }

    #[test]
    fn marker_sits_near_the_peak_column() {
        let ages = linspace(1.0, 13000.0, 1000);
        let mut density = gaussian(&ages, 6500.0, 400.0);
        normalize(&ages, &mut density);
        let posterior = Posterior {
            stats: stats(&ages, &density, false),
            density,
            upper_limit: false,
            unconstrained: false,
        };

        let txt = render_posterior_plot(&ages, &posterior, 41, 9);
        // The median of a symmetric density centered mid-axis lands in the
        // middle column, top row of the plot body.
        let body: Vec<&str> = txt.lines().skip(1).collect();
        let star_col = body
            .iter()
            .find_map(|l| l.find('*'))
            .unwrap();
        assert!((star_col as isize - 20).abs() <= 1);
    }
}
