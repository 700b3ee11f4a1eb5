//! Component D: fuses the three pairwise match sets into per-defect chains,
//! and derives growth metrics and severity for each.

use std::collections::HashMap;

use crate::model::{
    CanonicalRecord, GrowthMetrics, LineageEntry, LineageStatus, Match, PairScore, RunPair,
    RunYear, RunYears, Severity,
};

/// `row_index -> Match` for one ordered pair's accepted matches.
type MatchMap = HashMap<usize, Match>;

fn accepted_map(matches: &[Match]) -> MatchMap {
    matches
        .iter()
        .filter(|m| m.accepted)
        .map(|m| (m.a_row_index, m.clone()))
        .collect()
}

/// Assemble lineage chains from the three runs' anomaly records and the
/// three pairwise match sets (Y0-Y1, Y1-Y2, Y0-Y2).
///
/// `latest_run` is the most recent run actually present in this job (Y2 if
/// its records are non-empty, else Y1, else Y0); it determines which
/// Y0/Y1-terminated chains are labeled `missing` rather than treated as a
/// fresh run's first sighting (there is nothing to be "missing" from if no
/// later run was even surveyed).
pub fn assemble_lineage(
    y0: &[CanonicalRecord],
    y1: &[CanonicalRecord],
    y2: &[CanonicalRecord],
    m01_matches: &[Match],
    m12_matches: &[Match],
    m02_matches: &[Match],
    latest_run: RunYear,
) -> Vec<LineageEntry> {
    let m01 = accepted_map(m01_matches);
    let m12 = accepted_map(m12_matches);
    let m02 = accepted_map(m02_matches);

    let y1_by_index: HashMap<usize, &CanonicalRecord> = y1.iter().map(|r| (r.row_index, r)).collect();
    let y2_by_index: HashMap<usize, &CanonicalRecord> = y2.iter().map(|r| (r.row_index, r)).collect();

    let mut used_y1: std::collections::HashSet<usize> = std::collections::HashSet::new();
    let mut used_y2: std::collections::HashSet<usize> = std::collections::HashSet::new();
    let mut entries = Vec::new();

    for a in y0 {
        let mut per_run = HashMap::new();
        per_run.insert(RunYear::Y0, a.clone());
        let mut pair_scores = HashMap::new();

        let mut reached_y2 = false;

        if let Some(m01_match) = m01.get(&a.row_index) {
            if let Some(&b) = y1_by_index.get(&m01_match.b_row_index) {
                per_run.insert(RunYear::Y1, b.clone());
                used_y1.insert(b.row_index);
                pair_scores.insert(
                    RunPair::Y0Y1,
                    PairScore { score: m01_match.score, components: m01_match.components },
                );

                if let Some(m12_match) = m12.get(&b.row_index) {
                    if let Some(&c) = y2_by_index.get(&m12_match.b_row_index) {
                        per_run.insert(RunYear::Y2, c.clone());
                        used_y2.insert(c.row_index);
                        pair_scores.insert(
                            RunPair::Y1Y2,
                            PairScore { score: m12_match.score, components: m12_match.components },
                        );
                        reached_y2 = true;
                    }
                }
            }
        } else if let Some(m02_match) = m02.get(&a.row_index) {
            if let Some(&c) = y2_by_index.get(&m02_match.b_row_index) {
                per_run.insert(RunYear::Y2, c.clone());
                used_y2.insert(c.row_index);
                pair_scores.insert(
                    RunPair::Y0Y2,
                    PairScore { score: m02_match.score, components: m02_match.components },
                );
                reached_y2 = true;
            }
        }

        let status = if !reached_y2 && run_precedes_latest(RunYear::Y0, latest_run) {
            LineageStatus::Missing
        } else {
            LineageStatus::Matched
        };

        let growth = compute_growth(&per_run);
        let severity = classify_severity(&growth);

        entries.push(LineageEntry { status, per_run, pair_scores, growth, severity });
    }

    for b in y1 {
        if used_y1.contains(&b.row_index) {
            continue;
        }
        let mut per_run = HashMap::new();
        per_run.insert(RunYear::Y1, b.clone());
        let mut pair_scores = HashMap::new();

        if let Some(m12_match) = m12.get(&b.row_index) {
            if let Some(&c) = y2_by_index.get(&m12_match.b_row_index) {
                per_run.insert(RunYear::Y2, c.clone());
                used_y2.insert(c.row_index);
                pair_scores.insert(
                    RunPair::Y1Y2,
                    PairScore { score: m12_match.score, components: m12_match.components },
                );
            }
        }

        // A chain that starts here was never referenced by any Y0 match, so
        // it is a fresh sighting, not something that went missing from an
        // earlier run — always `new_Y1`, whether or not it reaches Y2.
        let status = LineageStatus::NewY1;

        let growth = compute_growth(&per_run);
        let severity = classify_severity(&growth);
        entries.push(LineageEntry { status, per_run, pair_scores, growth, severity });
    }

    for c in y2 {
        if used_y2.contains(&c.row_index) {
            continue;
        }
        let mut per_run = HashMap::new();
        per_run.insert(RunYear::Y2, c.clone());
        entries.push(LineageEntry {
            status: LineageStatus::NewY2,
            per_run,
            pair_scores: HashMap::new(),
            growth: HashMap::new(),
            severity: Severity::Unknown,
        });
    }

    entries
}

fn run_precedes_latest(run: RunYear, latest: RunYear) -> bool {
    run < latest
}

fn compute_growth(per_run: &HashMap<RunYear, CanonicalRecord>) -> HashMap<RunPair, GrowthMetrics> {
    let mut growth = HashMap::new();
    for pair in RunPair::ALL {
        let (ea, eb) = pair.endpoints();
        let (Some(a), Some(b)) = (per_run.get(&ea), per_run.get(&eb)) else {
            continue;
        };
        let (Some(depth_a), Some(depth_b)) = (a.depth_pct, b.depth_pct) else {
            continue;
        };

        let delta_years = (b.run_year - a.run_year) as f64;
        if delta_years <= 0.0 {
            continue;
        }

        let depth_growth_pct = depth_b - depth_a;
        let annual_growth_rate_pct = depth_growth_pct / delta_years;

        let wt = b.wall_thickness_in.or(a.wall_thickness_in);
        let depth_growth_in = wt.map(|w| depth_growth_pct * w / 100.0);
        let annual_depth_growth_in = depth_growth_in.map(|g| g / delta_years);

        let length_growth_in = match (a.length_in, b.length_in) {
            (Some(la), Some(lb)) => Some(lb - la),
            _ => None,
        };
        let annual_length_growth_in = length_growth_in.map(|g| g / delta_years);

        let width_growth_in = match (a.width_in, b.width_in) {
            (Some(wa), Some(wb)) => Some(wb - wa),
            _ => None,
        };
        let annual_width_growth_in = width_growth_in.map(|g| g / delta_years);

        let time_to_critical_years = if annual_growth_rate_pct > 0.0 && depth_b < 80.0 {
            Some((80.0 - depth_b) / annual_growth_rate_pct)
        } else {
            None
        };

        growth.insert(
            pair,
            GrowthMetrics {
                delta_years,
                depth_growth_pct,
                annual_growth_rate_pct,
                depth_growth_in,
                annual_depth_growth_in,
                length_growth_in,
                annual_length_growth_in,
                width_growth_in,
                annual_width_growth_in,
                time_to_critical_years,
            },
        );
    }
    growth
}

/// `>10` critical, `5..10` moderate, `<5` low, no growth data at all:
/// unknown. Boundary values: `10` -> critical, `5` -> moderate, `0` -> low.
fn classify_severity(growth: &HashMap<RunPair, GrowthMetrics>) -> Severity {
    let rate = [RunPair::Y1Y2, RunPair::Y0Y2, RunPair::Y0Y1]
        .into_iter()
        .find_map(|pair| growth.get(&pair).map(|g| g.annual_growth_rate_pct));

    match rate {
        Some(r) if r > 10.0 => Severity::Critical,
        Some(r) if r >= 5.0 => Severity::Moderate,
        Some(_) => Severity::Low,
        None => Severity::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FeatureKind, MatchComponents};
    use indexmap::IndexMap;
    use rstest::rstest;

    fn rec(run_year: i32, row_index: usize, depth_pct: f64, wt: f64) -> CanonicalRecord {
        CanonicalRecord {
            run_year,
            row_index,
            feature_id: None,
            feature_kind: FeatureKind::Anomaly,
            feature_description: Some("Metal Loss".to_string()),
            odometer_ft: Some(100.0),
            corrected_odometer_ft: Some(100.0),
            wall_thickness_in: Some(wt),
            depth_pct: Some(depth_pct),
            depth_in: None,
            length_in: Some(1.0),
            width_in: Some(1.0),
            clock_position: Some(3.0),
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

    fn perfect_match(a_year: i32, a_idx: usize, b_year: i32, b_idx: usize) -> Match {
        Match {
            a_run_year: a_year,
            a_row_index: a_idx,
            b_run_year: b_year,
            b_row_index: b_idx,
            cost: 0.0,
            score: 1.0,
            components: MatchComponents { distance_confidence: 1.0, clock_confidence: 1.0, feature_confidence: 1.0 },
            accepted: true,
        }
    }

    #[test]
    fn full_chain_across_three_runs_is_matched() {
        let y0 = vec![rec(2001, 0, 20.0, 0.25)];
        let y1 = vec![rec(2005, 0, 25.0, 0.25)];
        let y2 = vec![rec(2010, 0, 30.0, 0.25)];
        let m01 = vec![perfect_match(2001, 0, 2005, 0)];
        let m12 = vec![perfect_match(2005, 0, 2010, 0)];

        let entries = assemble_lineage(&y0, &y1, &y2, &m01, &m12, &[], RunYear::Y2);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, LineageStatus::Matched);
        assert!(entries[0].per_run.contains_key(&RunYear::Y2));
        let g = entries[0].growth.get(&RunPair::Y1Y2).unwrap();
        assert!((g.annual_growth_rate_pct - 5.0 / 5.0).abs() < 1e-9);
    }

    #[test]
    fn y0_row_unmatched_and_latest_is_y2_is_missing() {
        let y0 = vec![rec(2001, 0, 20.0, 0.25)];
        let entries = assemble_lineage(&y0, &[], &[], &[], &[], &[], RunYear::Y2);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, LineageStatus::Missing);
    }

    #[test]
    fn y2_only_row_is_new_y2_never_missing() {
        let y2 = vec![rec(2010, 0, 20.0, 0.25)];
        let entries = assemble_lineage(&[], &[], &y2, &[], &[], &[], RunYear::Y2);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, LineageStatus::NewY2);
    }

    #[test]
    fn y1_only_row_when_latest_is_y1_is_new_y1_not_missing() {
        let y1 = vec![rec(2005, 0, 20.0, 0.25)];
        let entries = assemble_lineage(&[], &y1, &[], &[], &[], &[], RunYear::Y1);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, LineageStatus::NewY1);
    }

    #[test]
    fn y1_only_row_when_latest_is_y2_is_still_new_y1_not_missing() {
        // Never referenced by a Y0 match, so it is a fresh Y1 sighting even
        // though a later run (Y2) exists and it didn't carry forward into it.
        let y1 = vec![rec(2005, 0, 20.0, 0.25)];
        let entries = assemble_lineage(&[], &y1, &[], &[], &[], &[], RunYear::Y2);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, LineageStatus::NewY1);
    }

    #[test]
    fn direct_y0_y2_match_skips_y1() {
        let y0 = vec![rec(2001, 0, 20.0, 0.25)];
        let y2 = vec![rec(2010, 0, 35.0, 0.25)];
        let m02 = vec![perfect_match(2001, 0, 2010, 0)];
        let entries = assemble_lineage(&y0, &[], &y2, &[], &[], &m02, RunYear::Y2);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, LineageStatus::Matched);
        assert!(entries[0].growth.contains_key(&RunPair::Y0Y2));
    }

    fn growth_at_rate(rate: f64) -> GrowthMetrics {
        GrowthMetrics {
            delta_years: 1.0,
            depth_growth_pct: rate,
            annual_growth_rate_pct: rate,
            depth_growth_in: None,
            annual_depth_growth_in: None,
            length_growth_in: None,
            annual_length_growth_in: None,
            width_growth_in: None,
            annual_width_growth_in: None,
            time_to_critical_years: None,
        }
    }

    #[rstest]
    #[case(10.01, Severity::Critical)]
    #[case(10.0, Severity::Critical)]
    #[case(5.0, Severity::Moderate)]
    #[case(4.99, Severity::Low)]
    #[case(0.0, Severity::Low)]
    fn severity_boundaries(#[case] rate: f64, #[case] expected: Severity) {
        let mut growth = HashMap::new();
        growth.insert(RunPair::Y1Y2, growth_at_rate(rate));
        assert_eq!(classify_severity(&growth), expected);
    }

    #[test]
    fn no_growth_data_is_unknown_severity() {
        assert_eq!(classify_severity(&HashMap::new()), Severity::Unknown);
    }

    #[test]
    fn growth_with_critical_projection_matches_worked_example() {
        // Y0 depth 30%, Y2 depth 54%, 15 years apart: annual = 1.6 %/yr,
        // time_to_critical = (80 - 54) / 1.6 = 16.25 years, severity low.
        let y0 = vec![rec(2000, 0, 30.0, 0.25)];
        let y2 = vec![rec(2015, 0, 54.0, 0.25)];
        let m02 = vec![perfect_match(2000, 0, 2015, 0)];
        let entries = assemble_lineage(&y0, &[], &y2, &[], &[], &m02, RunYear::Y2);

        let g = entries[0].growth.get(&RunPair::Y0Y2).unwrap();
        assert!((g.delta_years - 15.0).abs() < 1e-9);
        assert!((g.annual_growth_rate_pct - 1.6).abs() < 1e-6);
        assert!((g.time_to_critical_years.unwrap() - 16.25).abs() < 1e-6);
        assert_eq!(entries[0].severity, Severity::Low);
    }

    #[test]
    fn time_to_critical_only_when_growing_and_below_threshold() {
        let y0 = vec![rec(2001, 0, 20.0, 0.25)];
        let y1 = vec![rec(2005, 0, 60.0, 0.25)];
        let m01 = vec![perfect_match(2001, 0, 2005, 0)];
        let entries = assemble_lineage(&y0, &y1, &[], &m01, &[], &[], RunYear::Y1);
        let g = entries[0].growth.get(&RunPair::Y0Y1).unwrap();
        assert!(g.time_to_critical_years.is_some());

        let y1_critical = vec![rec(2005, 0, 85.0, 0.25)];
        let m01_2 = vec![perfect_match(2001, 0, 2005, 0)];
        let entries2 = assemble_lineage(&y0, &y1_critical, &[], &m01_2, &[], &[], RunYear::Y1);
        let g2 = entries2[0].growth.get(&RunPair::Y0Y1).unwrap();
        assert!(g2.time_to_critical_years.is_none());
    }
}
