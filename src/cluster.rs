//! Component E: spatial density clustering over each lineage entry's latest
//! observed position.

use itertools::Itertools;

use crate::model::{DensityCluster, LineageEntry, Severity};
use crate::stats::mean;

/// Histogram the latest positions of `entries` into fixed-width bins and
/// report contiguous "hot" runs — bins whose count is at or above
/// `2 * mean_count` — as [`DensityCluster`]s.
///
/// Entries with no position at all (neither a corrected nor a raw
/// odometer on their latest record) are excluded from the histogram
/// entirely; they contribute nothing to density and cannot anchor a bin.
/// Returns an empty list, with no error, if fewer than one position is
/// available (a [`crate::error::Warning::NumericDegeneracy`] is the
/// caller's job to attach, since this function has no warning channel of
/// its own).
pub fn detect_clusters(
    entries: &[LineageEntry],
    bin_width_ft: f64,
    threshold_factor: f64,
) -> Vec<DensityCluster> {
    let positioned: Vec<(&LineageEntry, f64)> = entries
        .iter()
        .filter_map(|e| e.latest().and_then(|r| r.position()).map(|p| (e, p)))
        .collect();

    if positioned.is_empty() {
        return Vec::new();
    }

    let (min_pos, max_pos) = match positioned.iter().map(|(_, p)| *p).minmax_by(|x, y| x.partial_cmp(y).unwrap()) {
        itertools::MinMaxResult::NoElements => unreachable!("checked non-empty above"),
        itertools::MinMaxResult::OneElement(v) => (v, v),
        itertools::MinMaxResult::MinMax(v1, v2) => (v1, v2),
    };

    if !(max_pos > min_pos) {
        // All positions coincide: a single bin holds everything, so there is
        // no meaningful density contrast to threshold against.
        return Vec::new();
    }

    let n_bins = (((max_pos - min_pos) / bin_width_ft).ceil() as usize).max(1);
    let mut bins: Vec<Vec<&LineageEntry>> = vec![Vec::new(); n_bins];

    for (entry, pos) in &positioned {
        let mut idx = ((pos - min_pos) / bin_width_ft).floor() as usize;
        if idx >= n_bins {
            idx = n_bins - 1;
        }
        bins[idx].push(entry);
    }

    let counts: Vec<f64> = bins.iter().map(|b| b.len() as f64).collect();
    let mu = mean(&counts).unwrap_or(0.0);
    let tau = threshold_factor * mu;

    let hot: Vec<bool> = counts.iter().map(|&c| c >= tau && tau > 0.0).collect();

    let mut clusters = Vec::new();
    let mut i = 0;
    while i < n_bins {
        if !hot[i] {
            i += 1;
            continue;
        }
        let start_bin = i;
        let mut end_bin = i;
        let mut j = i + 1;
        // A single cold bin does not break a cluster; two in a row does.
        while j < n_bins {
            if hot[j] {
                end_bin = j;
                j += 1;
            } else if j + 1 < n_bins && hot[j + 1] {
                j += 2;
                end_bin = j - 1;
            } else {
                break;
            }
        }

        let members: Vec<&LineageEntry> = (start_bin..=end_bin).flat_map(|b| bins[b].iter().copied()).collect();
        let depths: Vec<f64> = members
            .iter()
            .filter_map(|e| e.latest().and_then(|r| r.depth_pct))
            .collect();

        clusters.push(DensityCluster {
            start_ft: min_pos + start_bin as f64 * bin_width_ft,
            end_ft: min_pos + (end_bin + 1) as f64 * bin_width_ft,
            anomaly_count: members.len(),
            mean_depth_pct: mean(&depths),
            mode_severity: mode_severity(&members),
        });

        i = end_bin + 1;
    }

    clusters
}

/// The most common severity among `members`, ties broken
/// `critical > moderate > low > unknown`.
fn mode_severity(members: &[&LineageEntry]) -> Severity {
    let count = |target: Severity| members.iter().filter(|e| e.severity == target).count();
    let counts = [
        (Severity::Critical, count(Severity::Critical)),
        (Severity::Moderate, count(Severity::Moderate)),
        (Severity::Low, count(Severity::Low)),
        (Severity::Unknown, count(Severity::Unknown)),
    ];
    counts
        .into_iter()
        .max_by_key(|(_, c)| *c)
        .map(|(s, _)| s)
        .unwrap_or(Severity::Unknown)
}
