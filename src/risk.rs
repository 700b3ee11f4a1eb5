//! Component F: the composite risk-forecast field, combining emergence
//! density, local growth, and projected critical counts on an evaluation
//! grid spanning the observed positions.

use itertools::Itertools;

use crate::config::RiskWeights;
use crate::kde::{kde_on_grid, mean_or_zero, normalize_to_unit};
use crate::model::{HighRiskZone, LineageEntry, LineageStatus, RiskProfile};
use crate::stats::clip;

const CRITICAL_DEPTH_PCT: f64 = 80.0;

/// Build the full [`RiskProfile`] for `entries`: an evaluation grid spaced
/// `grid_step_ft` apart across the observed position range, the three
/// component fields, the composite `R(x)`, and contiguous high-risk zones
/// where `R(x) >= risk_threshold`.
///
/// Returns an all-empty profile (no error) if no entry has a usable
/// position; callers should attach a
/// [`crate::error::Warning::NumericDegeneracy`] in that case.
pub fn forecast_risk(
    entries: &[LineageEntry],
    grid_step_ft: f64,
    window_ft: f64,
    risk_threshold: f64,
    weights: &RiskWeights,
) -> RiskProfile {
    let positions: Vec<f64> = entries.iter().filter_map(|e| e.latest().and_then(|r| r.position())).collect();

    if positions.is_empty() {
        return RiskProfile {
            grid_ft: Vec::new(),
            emergence_density: Vec::new(),
            local_growth: Vec::new(),
            critical_count_20yr: Vec::new(),
            composite_risk: Vec::new(),
            high_risk_zones: Vec::new(),
        };
    }

    let (min_pos, max_pos) = match positions.iter().minmax_by(|x, y| x.partial_cmp(y).unwrap()) {
        itertools::MinMaxResult::NoElements => unreachable!("checked non-empty above"),
        itertools::MinMaxResult::OneElement(&v) => (v, v),
        itertools::MinMaxResult::MinMax(&v1, &v2) => (v1, v2),
    };

    let grid: Vec<f64> = if max_pos > min_pos {
        let mut g = Vec::new();
        let mut x = min_pos;
        while x <= max_pos {
            g.push(x);
            x += grid_step_ft;
        }
        g
    } else {
        vec![min_pos]
    };

    let emergence_density = emergence_density(entries, &grid);
    let local_growth = local_growth(entries, &grid, window_ft);
    let critical_count_20yr = critical_counts(entries, &grid, window_ft, 20.0);
    let mut critical_count_norm = critical_count_20yr.clone();
    normalize_to_unit(&mut critical_count_norm);

    let composite_risk: Vec<f64> = (0..grid.len())
        .map(|i| {
            let r = weights.emergence * emergence_density[i]
                + weights.growth * local_growth[i]
                + weights.critical_count * critical_count_norm[i];
            clip(r, 0.0, 1.0)
        })
        .collect();

    let high_risk_zones = detect_high_risk_zones(&grid, &composite_risk, risk_threshold, grid_step_ft);

    RiskProfile {
        grid_ft: grid,
        emergence_density,
        local_growth,
        critical_count_20yr,
        composite_risk,
        high_risk_zones,
    }
}

/// `E(x)`: emergence density of `new_Y1`/`new_Y2` positions, KDE'd with
/// Silverman bandwidth when at least 3 points are available, else a single
/// Gaussian bump around their mean (or all-zero if there are none at all),
/// normalized to `[0, 1]`.
fn emergence_density(entries: &[LineageEntry], grid: &[f64]) -> Vec<f64> {
    let emergent: Vec<f64> = entries
        .iter()
        .filter(|e| matches!(e.status, LineageStatus::NewY1 | LineageStatus::NewY2))
        .filter_map(|e| e.latest().and_then(|r| r.position()))
        .collect();

    let mut density = if emergent.len() >= 3 {
        kde_on_grid(&emergent, grid).unwrap_or_else(|| vec![0.0; grid.len()])
    } else if emergent.is_empty() {
        vec![0.0; grid.len()]
    } else {
        let mu = mean_or_zero(&emergent);
        grid.iter()
            .map(|&x| {
                let z = (x - mu) / 500.0;
                (-0.5 * z * z).exp()
            })
            .collect()
    };

    normalize_to_unit(&mut density);
    density
}

/// `G(x)`: average `annual_growth_rate_pct` of matched entries within
/// `+/- window_ft` of each grid point, normalized to `[0, 1]`.
fn local_growth(entries: &[LineageEntry], grid: &[f64], window_ft: f64) -> Vec<f64> {
    let matched: Vec<(f64, f64)> = entries
        .iter()
        .filter_map(|e| {
            let pos = e.latest().and_then(|r| r.position())?;
            let rate = e.latest_growth_rate()?;
            Some((pos, rate))
        })
        .collect();

    let mut values: Vec<f64> = grid
        .iter()
        .map(|&x| {
            let nearby: Vec<f64> = matched
                .iter()
                .filter(|(pos, _)| (pos - x).abs() <= window_ft)
                .map(|(_, rate)| *rate)
                .collect();
            mean_or_zero(&nearby)
        })
        .collect();

    normalize_to_unit(&mut values);
    values
}

/// `K_h(x)`: count of matched entries within `+/- window_ft` whose
/// `depth + rate * horizon_years` projection reaches the critical
/// threshold (80%).
fn critical_counts(entries: &[LineageEntry], grid: &[f64], window_ft: f64, horizon_years: f64) -> Vec<f64> {
    let projected: Vec<f64> = entries
        .iter()
        .filter_map(|e| {
            let pos = e.latest().and_then(|r| r.position())?;
            let depth = e.latest().and_then(|r| r.depth_pct)?;
            let rate = e.latest_growth_rate()?;
            let projected_depth = depth + rate * horizon_years;
            if projected_depth >= CRITICAL_DEPTH_PCT {
                Some(pos)
            } else {
                None
            }
        })
        .collect();

    grid.iter()
        .map(|&x| projected.iter().filter(|&&p| (p - x).abs() <= window_ft).count() as f64)
        .collect()
}

fn detect_high_risk_zones(grid: &[f64], risk: &[f64], threshold: f64, grid_step_ft: f64) -> Vec<HighRiskZone> {
    let mut zones = Vec::new();
    let mut i = 0;
    while i < grid.len() {
        if risk[i] < threshold {
            i += 1;
            continue;
        }
        let start = i;
        let mut end = i;
        while end + 1 < grid.len() && risk[end + 1] >= threshold {
            end += 1;
        }
        let max_risk = risk[start..=end].iter().cloned().fold(f64::MIN, f64::max);
        zones.push(HighRiskZone {
            start_ft: grid[start],
            end_ft: grid[end] + grid_step_ft,
            max_risk,
        });
        i = end + 1;
    }
    zones
}
