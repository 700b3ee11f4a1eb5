//! A small reusable 1-D Gaussian kernel density estimator, shared by the
//! risk forecaster's emergence-density field.

use crate::stats::{interquartile_range, mean, std_dev};

const GAUSSIAN_NORM: f64 = std::f64::consts::TAU;

/// Silverman's rule-of-thumb bandwidth: `0.9 * min(std, IQR/1.34) * n^(-1/5)`.
///
/// Falls back to the plain-std form when the interquartile range is zero or
/// unavailable (e.g. fewer than two points, or all points coincide at the
/// same value), and returns `None` entirely when even `std` is degenerate
/// (zero or undefined) — callers must handle that as a numeric-degeneracy
/// condition rather than dividing by a zero bandwidth.
pub fn silverman_bandwidth(xs: &[f64]) -> Option<f64> {
    let n = xs.len();
    if n < 2 {
        return None;
    }
    let sigma = std_dev(xs)?;
    let iqr = interquartile_range(xs);
    let spread = match iqr {
        Some(iqr) if iqr > 0.0 => sigma.min(iqr / 1.34),
        _ => sigma,
    };
    if spread <= 0.0 || !spread.is_finite() {
        return None;
    }
    Some(0.9 * spread * (n as f64).powf(-0.2))
}

/// Evaluate a Gaussian KDE built from `points` with bandwidth `h` at `x`.
fn gaussian_kde_at(points: &[f64], h: f64, x: f64) -> f64 {
    let n = points.len() as f64;
    let density: f64 = points
        .iter()
        .map(|&p| {
            let z = (x - p) / h;
            (-0.5 * z * z).exp() / (h * GAUSSIAN_NORM.sqrt())
        })
        .sum();
    density / n
}

/// Evaluate a Gaussian KDE fit to `points` (with Silverman bandwidth) at
/// every coordinate in `grid`. Returns `None` if `points` has fewer than
/// two distinct values (degenerate bandwidth) — callers fall back to a
/// single-point Gaussian bump or an all-zero field per the risk
/// forecaster's documented edge cases.
pub fn kde_on_grid(points: &[f64], grid: &[f64]) -> Option<Vec<f64>> {
    let h = silverman_bandwidth(points)?;
    Some(grid.iter().map(|&x| gaussian_kde_at(points, h, x)).collect())
}

/// Normalize `values` into `[0, 1]` by dividing by the maximum, leaving an
/// all-zero vector untouched (dividing by zero would produce NaNs).
pub fn normalize_to_unit(values: &mut [f64]) {
    let max = values.iter().cloned().fold(0.0_f64, f64::max);
    if max > 0.0 {
        for v in values.iter_mut() {
            *v /= max;
        }
    }
}

pub fn mean_or_zero(xs: &[f64]) -> f64 {
    mean(xs).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn silverman_bandwidth_is_none_for_coincident_points() {
        assert!(silverman_bandwidth(&[5.0, 5.0, 5.0]).is_none());
    }

    #[test]
    fn silverman_bandwidth_is_positive_for_spread_points() {
        let xs = [0.0, 100.0, 200.0, 300.0, 400.0, 500.0];
        let h = silverman_bandwidth(&xs).unwrap();
        assert!(h > 0.0);
    }

    #[test]
    fn kde_peaks_near_its_points() {
        let points = vec![990.0, 1000.0, 1010.0, 1005.0];
        let grid = vec![0.0, 500.0, 1000.0, 1500.0, 2000.0];
        let density = kde_on_grid(&points, &grid).unwrap();
        let max_idx = density
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(max_idx, 2);
    }

    #[test]
    fn normalize_to_unit_scales_by_max() {
        let mut v = vec![0.0, 2.0, 4.0];
        normalize_to_unit(&mut v);
        assert_abs_diff_eq!(v[2], 1.0);
        assert_abs_diff_eq!(v[1], 0.5);
    }

    #[test]
    fn normalize_to_unit_leaves_all_zero_untouched() {
        let mut v = vec![0.0, 0.0];
        normalize_to_unit(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }
}
