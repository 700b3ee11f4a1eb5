//! Small numeric helpers shared across the matcher, cluster analyzer, and
//! risk forecaster.

/// Clamp `x` into `[lo, hi]`.
pub fn clip(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

/// Circular distance between two clock positions on a 12-hour ring.
///
/// `clock(11.75, 0.25) == 0.5`, matching the boundary behavior spec'd for
/// the matcher's clock cost component.
pub fn circular_clock_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).abs();
    d.min(12.0 - d)
}

pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        None
    } else {
        Some(xs.iter().sum::<f64>() / xs.len() as f64)
    }
}

pub fn std_dev(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs)?;
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    Some(var.sqrt())
}

/// The interquartile range of `xs`, using linear interpolation between
/// closest ranks (the same convention NumPy's default `percentile` uses).
pub fn interquartile_range(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("values must be finite"));
    let q1 = percentile(&sorted, 0.25);
    let q3 = percentile(&sorted, 0.75);
    Some(q3 - q1)
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = p * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}
