//! Component B: odometer-drift correction using girth welds as anchors.

use crate::interpolation::{InterpolationMethod, PiecewiseLinearInterp};
use crate::model::{CanonicalRecord, CorrectionRecord};

/// Correct `target`'s odometer positions against `baseline` using paired
/// girth welds as anchors, writing `corrected_odometer_ft` on every element
/// of `target` in place.
///
/// `baseline_welds` and `target_welds` must be the girth-weld subset of
/// their respective run's records, in any order; this function sorts a
/// local copy of their positions ascending before pairing. Records in
/// either set with no parseable position are ignored for anchor-building
/// purposes (they cannot serve as anchors) but any corresponding non-weld
/// record in `target` is still corrected.
///
/// Returns the list of correction records, one per breakpoint actually
/// used. If fewer than two usable anchor pairs are available, every
/// target record's `corrected_odometer_ft` is set equal to its
/// `odometer_ft` (a no-op correction) and no correction records are
/// returned, per the drift corrector's documented edge case.
pub fn correct_drift(
    baseline_welds: &[CanonicalRecord],
    target_welds: &[CanonicalRecord],
    target: &mut [CanonicalRecord],
) -> Vec<CorrectionRecord> {
    let mut baseline_positions: Vec<f64> = baseline_welds.iter().filter_map(|r| r.odometer_ft).collect();
    let mut target_positions: Vec<f64> = target_welds.iter().filter_map(|r| r.odometer_ft).collect();

    baseline_positions.sort_by(|a, b| a.partial_cmp(b).expect("positions must be finite"));
    target_positions.sort_by(|a, b| a.partial_cmp(b).expect("positions must be finite"));

    let k = baseline_positions.len().min(target_positions.len());

    if k < 2 {
        for rec in target.iter_mut() {
            rec.corrected_odometer_ft = rec.odometer_ft;
        }
        return Vec::new();
    }

    // Pair sequentially, collapsing duplicate target values into a single
    // breakpoint whose baseline value is the mean of the duplicates' pairs.
    let mut breakpoints: Vec<(f64, f64)> = Vec::new();
    let mut i = 0;
    while i < k {
        let t = target_positions[i];
        let mut b_sum = baseline_positions[i];
        let mut count = 1;
        let mut j = i + 1;
        while j < k && target_positions[j] == t {
            b_sum += baseline_positions[j];
            count += 1;
            j += 1;
        }
        breakpoints.push((t, b_sum / count as f64));
        i = j;
    }

    let records: Vec<CorrectionRecord> = breakpoints
        .iter()
        .enumerate()
        .map(|(idx, (t, b))| CorrectionRecord {
            gw_index: idx,
            baseline_ft: *b,
            target_ft: *t,
            shift_ft: b - t,
        })
        .collect();

    if breakpoints.len() < 2 {
        for rec in target.iter_mut() {
            rec.corrected_odometer_ft = rec.odometer_ft;
        }
        return Vec::new();
    }

    let xs: Vec<f64> = breakpoints.iter().map(|(t, _)| *t).collect();
    let ys: Vec<f64> = breakpoints.iter().map(|(_, b)| *b).collect();
    let interp = PiecewiseLinearInterp;

    for rec in target.iter_mut() {
        rec.corrected_odometer_ft = rec
            .odometer_ft
            .and_then(|x| interp.interp1d(&xs, &ys, x).ok());
    }

    records
}
