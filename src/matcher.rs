//! Component C: optimal bipartite defect matching across two runs, under a
//! weighted multi-component cost, with windowed segmentation for large
//! inputs.

use std::collections::HashSet;
use std::sync::OnceLock;

use itertools::Itertools;
use ndarray::Array2;
use regex::Regex;

use crate::assignment::min_cost_assignment;
use crate::config::{MatchWeights, ReconcileConfig};
use crate::error::LineageError;
use crate::model::{CanonicalRecord, Match, MatchComponents};
use crate::stats::{circular_clock_distance, clip};

/// Cost assigned when a candidate pair's distance exceeds `d_max_ft`; large
/// enough that the assignment solver never prefers it over leaving a row
/// unmatched, but still finite so it can be emitted (with
/// `accepted = false`) for audit.
const HARD_GATE_COST: f64 = 1e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeatureCategory {
    MetalLoss,
    Corrosion,
    Cluster,
    Dent,
    SeamWeldDent,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Corrosion,
    Dent,
    Other,
}

impl FeatureCategory {
    fn family(self) -> Family {
        match self {
            FeatureCategory::MetalLoss | FeatureCategory::Corrosion | FeatureCategory::Cluster => {
                Family::Corrosion
            }
            FeatureCategory::Dent | FeatureCategory::SeamWeldDent => Family::Dent,
            FeatureCategory::Other => Family::Other,
        }
    }
}

fn classify_category(description: Option<&str>) -> FeatureCategory {
    static METAL_LOSS: OnceLock<Regex> = OnceLock::new();
    static CORROSION: OnceLock<Regex> = OnceLock::new();
    static CLUSTER: OnceLock<Regex> = OnceLock::new();
    static SEAM_WELD_DENT: OnceLock<Regex> = OnceLock::new();
    static DENT: OnceLock<Regex> = OnceLock::new();

    let Some(desc) = description else {
        return FeatureCategory::Other;
    };

    let metal_loss = METAL_LOSS.get_or_init(|| Regex::new(r"(?i)metal\s*loss").unwrap());
    let corrosion = CORROSION.get_or_init(|| Regex::new(r"(?i)corrosion").unwrap());
    let cluster = CLUSTER.get_or_init(|| Regex::new(r"(?i)cluster").unwrap());
    let seam_weld_dent = SEAM_WELD_DENT.get_or_init(|| Regex::new(r"(?i)seam\s*weld\s*(anomaly|dent)").unwrap());
    let dent = DENT.get_or_init(|| Regex::new(r"(?i)dent").unwrap());

    if seam_weld_dent.is_match(desc) {
        FeatureCategory::SeamWeldDent
    } else if metal_loss.is_match(desc) {
        FeatureCategory::MetalLoss
    } else if corrosion.is_match(desc) {
        FeatureCategory::Corrosion
    } else if cluster.is_match(desc) {
        FeatureCategory::Cluster
    } else if dent.is_match(desc) {
        FeatureCategory::Dent
    } else {
        FeatureCategory::Other
    }
}

/// The feature-category cost component `F(a, b)`.
///
/// Same sub-label -> 0. Differing sub-labels both within the corrosion
/// family (metal loss / corrosion / cluster) -> 0.3, the "compatible" case
/// called out in the design notes. Any other mismatch (including within
/// the dent family, or a different family entirely) -> 1.
fn feature_cost(a: &CanonicalRecord, b: &CanonicalRecord) -> f64 {
    let ca = classify_category(a.feature_description.as_deref());
    let cb = classify_category(b.feature_description.as_deref());

    if ca == cb {
        0.0
    } else if ca.family() == Family::Corrosion && cb.family() == Family::Corrosion {
        0.3
    } else if ca.family() == cb.family() {
        0.0
    } else {
        1.0
    }
}

/// The full weighted cost and its components for a candidate pair.
fn pair_cost(
    a: &CanonicalRecord,
    b: &CanonicalRecord,
    weights: &MatchWeights,
    d_max_ft: f64,
) -> (f64, MatchComponents) {
    let (Some(pa), Some(pb)) = (a.position(), b.position()) else {
        return (
            HARD_GATE_COST,
            MatchComponents {
                distance_confidence: 0.0,
                clock_confidence: 0.0,
                feature_confidence: 1.0 - feature_cost(a, b),
            },
        );
    };

    let d = (pa - pb).abs();
    if d > d_max_ft {
        return (
            HARD_GATE_COST,
            MatchComponents {
                distance_confidence: 0.0,
                clock_confidence: 0.0,
                feature_confidence: 1.0 - feature_cost(a, b),
            },
        );
    }
    let d_n = clip(d / d_max_ft, 0.0, 1.0);

    let c_n = match (a.clock_position, b.clock_position) {
        (Some(ca), Some(cb)) => circular_clock_distance(ca, cb) / 6.0,
        _ => 0.5,
    };

    let f = feature_cost(a, b);

    let cost = weights.distance * d_n + weights.clock * c_n + weights.feature * f;
    let components = MatchComponents {
        distance_confidence: 1.0 - d_n,
        clock_confidence: 1.0 - c_n,
        feature_confidence: 1.0 - f,
    };
    (cost, components)
}

/// Match anomaly records from two runs under the weighted cost, windowing
/// the input if `|a| * |b|` exceeds the configured practical threshold.
///
/// `a` and `b` must already carry `corrected_odometer_ft` (set by the
/// normalizer, defaulting to `odometer_ft`, and overwritten by the drift
/// corrector for the non-baseline run of the pair).
///
/// `cancel` is polled before each window is solved: windows within one
/// pair-pass are processed in ascending position order, and the caller's
/// cancellation signal is checked between them. A `true` result aborts the
/// whole pass and discards any matches already found in this call.
pub fn match_records(
    a: &[CanonicalRecord],
    b: &[CanonicalRecord],
    config: &ReconcileConfig,
    cancel: &(dyn Fn() -> bool + Sync),
) -> Result<Vec<Match>, LineageError> {
    if a.is_empty() || b.is_empty() {
        return Ok(Vec::new());
    }

    let positions: Vec<f64> = a
        .iter()
        .chain(b.iter())
        .filter_map(|r| r.position())
        .collect();
    let (min_pos, max_pos) = match positions.iter().minmax_by(|x, y| x.partial_cmp(y).unwrap()) {
        itertools::MinMaxResult::NoElements => return Ok(Vec::new()),
        itertools::MinMaxResult::OneElement(&v) => (v, v),
        itertools::MinMaxResult::MinMax(&v1, &v2) => (v1, v2),
    };

    let (window_size, window_step) = if a.len() * b.len() > config.windowing_threshold {
        (config.window_size_ft, config.window_step_ft)
    } else {
        // Small enough to solve in a single pass; use one window spanning
        // the whole domain.
        let span = (max_pos - min_pos).max(1.0) + 1.0;
        (span, span)
    };

    let mut matches = Vec::new();
    let mut matched_a: HashSet<usize> = HashSet::new();
    let mut matched_b: HashSet<usize> = HashSet::new();

    let mut wstart = min_pos;
    while wstart <= max_pos {
        if cancel() {
            return Err(LineageError::Cancelled);
        }
        let wend = wstart + window_size;

        let a_idx: Vec<usize> = a
            .iter()
            .enumerate()
            .filter(|(i, r)| {
                !matched_a.contains(i)
                    && r.position().map(|p| p >= wstart && p < wend).unwrap_or(false)
            })
            .map(|(i, _)| i)
            .collect();
        let b_idx: Vec<usize> = b
            .iter()
            .enumerate()
            .filter(|(i, r)| {
                !matched_b.contains(i)
                    && r.position().map(|p| p >= wstart && p < wend).unwrap_or(false)
            })
            .map(|(i, _)| i)
            .collect();

        if !a_idx.is_empty() && !b_idx.is_empty() {
            let mut cost = Array2::<f64>::zeros((a_idx.len(), b_idx.len()));
            let mut components = vec![vec![MatchComponents { distance_confidence: 0.0, clock_confidence: 0.0, feature_confidence: 0.0 }; b_idx.len()]; a_idx.len()];
            for (ia, &gi) in a_idx.iter().enumerate() {
                for (ib, &gj) in b_idx.iter().enumerate() {
                    let (c, comp) = pair_cost(&a[gi], &b[gj], &config.match_weights, config.d_max_ft);
                    cost[[ia, ib]] = c;
                    components[ia][ib] = comp;
                }
            }

            let assignment = min_cost_assignment(&cost);
            for (ia, assigned) in assignment.into_iter().enumerate() {
                if let Some(ib) = assigned {
                    let gi = a_idx[ia];
                    let gj = b_idx[ib];
                    let c = cost[[ia, ib]];
                    let comp = components[ia][ib];
                    let accepted = c <= config.cost_threshold;
                    matches.push(Match {
                        a_run_year: a[gi].run_year,
                        a_row_index: a[gi].row_index,
                        b_run_year: b[gj].run_year,
                        b_row_index: b[gj].row_index,
                        cost: c,
                        score: (1.0 - c).max(0.0),
                        components: comp,
                        accepted,
                    });
                    // A hard-gated pairing (accepted = false) is the solver's
                    // padding-driven "least bad" choice, not a real match: the
                    // row must stay eligible for the next overlapping window.
                    if accepted {
                        matched_a.insert(gi);
                        matched_b.insert(gj);
                    }
                }
            }
        }

        wstart += window_step;
    }

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FeatureKind;
    use indexmap::IndexMap;

    fn rec(row_index: usize, year: i32, pos: f64, clock: Option<f64>, desc: &str) -> CanonicalRecord {
        CanonicalRecord {
            run_year: year,
            row_index,
            feature_id: None,
            feature_kind: FeatureKind::Anomaly,
            feature_description: Some(desc.to_string()),
            odometer_ft: Some(pos),
            corrected_odometer_ft: Some(pos),
            wall_thickness_in: None,
            depth_pct: Some(20.0),
            depth_in: None,
            length_in: None,
            width_in: None,
            clock_position: clock,
            joint_number: None,
            joint_length_ft: None,
            dist_to_us_weld_ft: None,
            dist_to_ds_weld_ft: None,
            id_od: None,
            erf: None,
            rpr: None,
            comments: None,
            extra: IndexMap::new(),
        }
    }

    #[test]
    fn identical_inputs_produce_perfect_diagonal() {
        let config = ReconcileConfig::default();
        let a = vec![
            rec(0, 2001, 100.0, Some(3.0), "Metal Loss"),
            rec(1, 2001, 200.0, Some(6.0), "Metal Loss"),
            rec(2, 2001, 300.0, Some(9.0), "Metal Loss"),
        ];
        let b = a.iter().cloned().map(|mut r| { r.run_year = 2005; r }).collect::<Vec<_>>();

        let matches = match_records(&a, &b, &config, &|| false).unwrap();
        assert_eq!(matches.len(), 3);
        for m in &matches {
            assert!(m.accepted);
            assert!((m.score - 1.0).abs() < 1e-9, "expected perfect score, got {}", m.score);
            assert_eq!(m.a_row_index, m.b_row_index);
        }
    }

    #[test]
    fn distance_beyond_d_max_is_hard_gated() {
        let config = ReconcileConfig::default();
        let a = vec![rec(0, 2001, 0.0, Some(3.0), "Metal Loss")];
        let b = vec![rec(0, 2005, 60.0, Some(3.0), "Metal Loss")];

        let matches = match_records(&a, &b, &config, &|| false).unwrap();
        assert_eq!(matches.len(), 1);
        assert!(!matches[0].accepted);
        assert!(matches[0].cost >= HARD_GATE_COST);
    }

    #[test]
    fn distance_exactly_at_d_max_is_not_hard_gated() {
        let config = ReconcileConfig::default();
        let a = vec![rec(0, 2001, 0.0, Some(3.0), "Metal Loss")];
        let b = vec![rec(0, 2005, config.d_max_ft, Some(3.0), "Metal Loss")];

        let matches = match_records(&a, &b, &config, &|| false).unwrap();
        assert_eq!(matches.len(), 1);
        assert!((matches[0].components.distance_confidence - 0.0).abs() < 1e-9);
        assert!(matches[0].cost < HARD_GATE_COST);
    }

    #[test]
    fn null_clock_on_either_side_gives_half_confidence_penalty() {
        let config = ReconcileConfig::default();
        let a = vec![rec(0, 2001, 0.0, None, "Metal Loss")];
        let b = vec![rec(0, 2005, 0.0, Some(3.0), "Metal Loss")];

        let matches = match_records(&a, &b, &config, &|| false).unwrap();
        assert_eq!(matches.len(), 1);
        assert!((matches[0].components.clock_confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn clock_circular_boundary_values() {
        let config = ReconcileConfig::default();
        let a = vec![rec(0, 2001, 0.0, Some(11.75), "Metal Loss")];
        let b = vec![rec(0, 2005, 0.0, Some(0.25), "Metal Loss")];

        let matches = match_records(&a, &b, &config, &|| false).unwrap();
        assert_eq!(matches.len(), 1);
        // C = 0.5, C_n = 1/12 -> clock_confidence = 1 - 1/12
        assert!((matches[0].components.clock_confidence - (1.0 - 1.0 / 12.0)).abs() < 1e-9);
    }

    #[test]
    fn compatible_corrosion_family_mismatch_costs_0_3() {
        let a = rec(0, 2001, 0.0, Some(3.0), "Metal Loss");
        let b = rec(0, 2005, 0.0, Some(3.0), "Corrosion Cluster");
        assert!((feature_cost(&a, &b) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn dent_vs_corrosion_is_full_mismatch() {
        let a = rec(0, 2001, 0.0, Some(3.0), "Dent");
        let b = rec(0, 2005, 0.0, Some(3.0), "Metal Loss");
        assert!((feature_cost(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn matching_is_deterministic_across_runs() {
        let config = ReconcileConfig::default();
        let a = vec![
            rec(0, 2001, 100.0, Some(3.0), "Metal Loss"),
            rec(1, 2001, 140.0, Some(4.0), "Dent"),
        ];
        let b = vec![
            rec(0, 2005, 102.0, Some(3.1), "Metal Loss"),
            rec(1, 2005, 138.0, Some(4.1), "Dent"),
        ];

        let m1 = match_records(&a, &b, &config, &|| false).unwrap();
        let m2 = match_records(&a, &b, &config, &|| false).unwrap();
        assert_eq!(m1.len(), m2.len());
        for (x, y) in m1.iter().zip(m2.iter()) {
            assert_eq!(x.a_row_index, y.a_row_index);
            assert_eq!(x.b_row_index, y.b_row_index);
            assert!((x.cost - y.cost).abs() < 1e-12);
        }
    }

    #[test]
    fn hard_gated_pair_does_not_block_the_row_from_a_later_overlapping_window() {
        let mut config = ReconcileConfig::default();
        config.d_max_ft = 5.0;
        config.window_size_ft = 10.0;
        config.window_step_ft = 8.0;
        config.windowing_threshold = 0; // force windowing even for 1x1 inputs

        // Window 1 = [0, 10): only `a0` (pos 9) and the decoy (pos 0) fall
        // in range, so the solver is forced to pair them even though their
        // distance (9) exceeds d_max -- a hard-gated, unaccepted "match".
        // Window 2 = [8, 18), the overlap, is where `a0`'s real partner
        // (pos 13, distance 4) actually lives.
        let a = vec![rec(0, 2001, 9.0, Some(3.0), "Metal Loss")];
        let b = vec![
            rec(0, 2005, 0.0, Some(3.0), "Metal Loss"),
            rec(1, 2005, 13.0, Some(3.0), "Metal Loss"),
        ];

        let matches = match_records(&a, &b, &config, &|| false).unwrap();

        let accepted: Vec<_> = matches.iter().filter(|m| m.accepted).collect();
        assert_eq!(accepted.len(), 1, "the real match in the overlap window must still be found");
        assert_eq!(accepted[0].a_row_index, 0);
        assert_eq!(accepted[0].b_row_index, 1);

        let hard_gated: Vec<_> = matches.iter().filter(|m| !m.accepted).collect();
        assert_eq!(hard_gated.len(), 1);
        assert_eq!(hard_gated[0].b_row_index, 0);
        assert!(hard_gated[0].cost >= HARD_GATE_COST);
    }

    #[test]
    fn cancellation_aborts_before_any_window_is_solved() {
        let config = ReconcileConfig::default();
        let a = vec![rec(0, 2001, 100.0, Some(3.0), "Metal Loss")];
        let b = vec![rec(0, 2005, 100.0, Some(3.0), "Metal Loss")];

        let err = match_records(&a, &b, &config, &|| true).unwrap_err();
        assert!(matches!(err, LineageError::Cancelled));
    }
}
