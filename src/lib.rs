//! Reconciles three in-line-inspection (ILI) surveys of one pipeline into a
//! single lineage table tracking each physical defect across time.
//!
//! The crate exposes one synchronous entry point, [`reconcile_surveys`],
//! which upstream code calls with three row sets (one per run, in
//! ascending-year order) and a [`config::ReconcileConfig`]. Everything else
//! — file parsing, the request/response surface, workbook export, UI — is
//! an external collaborator's job.

/// Component A: schema normalization.
pub mod normalize;
/// The canonical-to-raw header mapping table (data, not code).
pub mod headers;
/// Component B: odometer-drift correction.
pub mod drift;
/// Piecewise-linear interpolation, used by the drift corrector.
pub mod interpolation;
/// Minimum-cost bipartite assignment solver, used by the matcher.
pub mod assignment;
/// Component C: windowed, weighted optimal defect matching.
pub mod matcher;
/// Component D: lineage chain assembly, growth metrics, severity.
pub mod lineage;
/// Component E: spatial density clustering.
pub mod cluster;
/// Component F: the composite risk-forecast field.
pub mod risk;
/// Small reusable 1-D Gaussian KDE helper used by the risk forecaster.
pub mod kde;
/// Shared numeric helpers (mean, circular distance, clipping).
pub mod stats;
/// Canonical data types shared by every component.
pub mod model;
/// Fatal errors and recoverable warnings.
pub mod error;
/// Tunable parameters, with defaults matching the external interface
/// contract, loadable from TOML/environment via `figment`.
pub mod config;
/// `log4rs`-based logging setup for binaries embedding this crate.
pub mod logging;

use config::ReconcileConfig;
use error::{LineageError, Warning};
use model::{LineageStatus, ReconciliationResult, RunRowSet, RunYear, RunYears, Summary};

/// A no-op cancellation signal for callers that never cancel a job.
pub fn never_cancel() -> bool {
    false
}

/// Run the full reconciliation pipeline on three runs' row sets.
///
/// `runs` must be given in ascending-year order `[Y0, Y1, Y2]`; `cancel` is
/// polled between components (and, within the matcher, between windows).
/// A `true` result aborts the job and discards any partial results,
/// returning [`LineageError::Cancelled`].
///
/// Returns a [`LineageError::SchemaError`] immediately if any run is
/// missing a mandatory canonical field, or if that field's column is
/// entirely null across the run. All other recoverable conditions are
/// collected into [`ReconciliationResult::warnings`] instead of aborting
/// the job.
pub fn reconcile_surveys(
    runs: &[RunRowSet; 3],
    config: &ReconcileConfig,
    cancel: &(dyn Fn() -> bool + Sync),
) -> Result<ReconciliationResult, LineageError> {
    let run_years = RunYears { y0: runs[0].year, y1: runs[1].year, y2: runs[2].year };
    let mut warnings = Vec::new();

    // --- Component A: normalize each run into canonical records. ---
    let y0_records = normalize::normalize_run(0, &runs[0])?;
    let mut y1_records = normalize::normalize_run(1, &runs[1])?;
    let mut y2_records = normalize::normalize_run(2, &runs[2])?;

    if cancel() {
        return Err(LineageError::Cancelled);
    }

    let (y0_welds, _) = normalize::split_by_kind(&y0_records);
    let (y1_welds, _) = normalize::split_by_kind(&y1_records);
    let (y2_welds, _) = normalize::split_by_kind(&y2_records);

    // --- Component B: drift-correct Y1 and Y2 against Y0. ---
    if y0_welds.len() < 2 || y1_welds.len() < 2 {
        warnings.push(Warning::InsufficientAnchors { run_year: run_years.y1 });
    }
    let correction_y1 = drift::correct_drift(&y0_welds, &y1_welds, &mut y1_records);

    if y0_welds.len() < 2 || y2_welds.len() < 2 {
        warnings.push(Warning::InsufficientAnchors { run_year: run_years.y2 });
    }
    let correction_y2 = drift::correct_drift(&y0_welds, &y2_welds, &mut y2_records);

    if cancel() {
        return Err(LineageError::Cancelled);
    }

    // --- Re-split after correction; matching and lineage only ever see
    // the anomaly subset (girth welds exist purely as drift anchors). ---
    let (_, y0_anomalies) = normalize::split_by_kind(&y0_records);
    let (_, y1_anomalies) = normalize::split_by_kind(&y1_records);
    let (_, y2_anomalies) = normalize::split_by_kind(&y2_records);

    for (records, year) in [(&y0_anomalies, run_years.y0), (&y1_anomalies, run_years.y1), (&y2_anomalies, run_years.y2)] {
        if records.is_empty() {
            warnings.push(Warning::EmptyRun { run_year: year });
        }
    }

    // --- Component C: three independent pairwise matching passes. They
    // share no mutable state, so the pair-passes run concurrently rather
    // than one after another. ---
    let ((m01, m12), m02) = rayon::join(
        || {
            rayon::join(
                || matcher::match_records(&y0_anomalies, &y1_anomalies, config, cancel),
                || matcher::match_records(&y1_anomalies, &y2_anomalies, config, cancel),
            )
        },
        || matcher::match_records(&y0_anomalies, &y2_anomalies, config, cancel),
    );
    let (m01, m12) = (m01?, m12?);
    let m02 = m02?;

    if cancel() {
        return Err(LineageError::Cancelled);
    }

    // --- Component D: fuse into per-defect chains. ---
    let latest_run = if !y2_anomalies.is_empty() {
        RunYear::Y2
    } else if !y1_anomalies.is_empty() {
        RunYear::Y1
    } else {
        RunYear::Y0
    };

    let lineage = lineage::assemble_lineage(
        &y0_anomalies,
        &y1_anomalies,
        &y2_anomalies,
        &m01,
        &m12,
        &m02,
        latest_run,
    );

    if cancel() {
        return Err(LineageError::Cancelled);
    }

    // --- Component E: spatial density clustering. ---
    let distinct_positions = distinct_position_count(&lineage);
    let clusters = cluster::detect_clusters(&lineage, config.cluster_bin_width_ft, config.cluster_threshold_factor);
    if clusters.is_empty() && distinct_positions == 1 {
        warnings.push(Warning::NumericDegeneracy { component: "cluster" });
    }

    if cancel() {
        return Err(LineageError::Cancelled);
    }

    // --- Component F: composite risk forecast. ---
    let risk = risk::forecast_risk(
        &lineage,
        config.risk_grid_step_ft,
        config.risk_window_ft,
        config.risk_threshold,
        &config.risk_weights,
    );
    if risk.grid_ft.len() <= 1 && distinct_positions == 1 {
        warnings.push(Warning::NumericDegeneracy { component: "risk" });
    }

    let summary = summarize(&lineage);

    Ok(ReconciliationResult {
        summary,
        lineage,
        correction_y1,
        correction_y2,
        clusters,
        risk,
        warnings,
    })
}

fn distinct_position_count(lineage: &[model::LineageEntry]) -> usize {
    let mut positions: Vec<f64> = lineage
        .iter()
        .filter_map(|e| e.latest().and_then(|r| r.position()))
        .collect();
    positions.sort_by(|a, b| a.partial_cmp(b).expect("positions must be finite"));
    positions.dedup();
    positions.len()
}

fn summarize(lineage: &[model::LineageEntry]) -> Summary {
    let mut summary = Summary::default();
    summary.total_lineage_entries = lineage.len();
    for entry in lineage {
        match entry.status {
            LineageStatus::Matched => summary.matched += 1,
            LineageStatus::NewY1 => summary.new_y1 += 1,
            LineageStatus::NewY2 => summary.new_y2 += 1,
            LineageStatus::Missing => summary.missing += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn row(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn y0_row(kind: &str, pos: f64, clock: &str, depth: &str) -> IndexMap<String, String> {
        row(&[
            ("Log Dist. [ft]", &pos.to_string()),
            ("Event", kind),
            ("Depth [%]", depth),
            ("t [in]", "0.3"),
            ("O'clock", clock),
        ])
    }

    fn y1_row(kind: &str, pos: f64, clock: &str, depth: &str) -> IndexMap<String, String> {
        row(&[
            ("Log Dist. [ft]", &pos.to_string()),
            ("Event Description", kind),
            ("Depth [%]", depth),
            ("Wt [in]", "0.3"),
            ("O'clock", clock),
        ])
    }

    fn y2_row(kind: &str, pos: f64, clock: &str, depth: &str) -> IndexMap<String, String> {
        row(&[
            ("ILI Wheel Count [ft.]", &pos.to_string()),
            ("Feature Description", kind),
            ("Metal Loss Depth [%]", depth),
            ("WT [in]", "0.3"),
            ("O'clock [hh:mm]", clock),
        ])
    }

    /// Three identical runs of the same 10 anomalies plus girth-weld
    /// anchors bracketing the anomaly field: nothing moved, nothing grew.
    #[test]
    fn identity_scenario_yields_all_matched_zero_growth() {
        let mut y0 = vec![y0_row("Girth Weld", 0.0, "0:00", ""), y0_row("Girth Weld", 5000.0, "0:00", "")];
        let mut y1 = vec![y1_row("Girth Weld", 0.0, "0:00", ""), y1_row("Girth Weld", 5000.0, "0:00", "")];
        let mut y2 = vec![y2_row("Girth Weld", 0.0, "0:00", ""), y2_row("Girth Weld", 5000.0, "0:00", "")];

        for i in 0..10 {
            let pos = 100.0 + i as f64 * 400.0;
            let clock = format!("{}:00", i % 12);
            y0.push(y0_row("Metal Loss", pos, &clock, "20"));
            y1.push(y1_row("Metal Loss", pos, &clock, "20"));
            y2.push(y2_row("Metal Loss", pos, &clock, "20"));
        }

        let runs = [
            RunRowSet { year: 2001, rows: y0 },
            RunRowSet { year: 2008, rows: y1 },
            RunRowSet { year: 2015, rows: y2 },
        ];

        let result = reconcile_surveys(&runs, &ReconcileConfig::default(), &never_cancel).unwrap();

        assert_eq!(result.summary.total_lineage_entries, 10);
        assert_eq!(result.summary.matched, 10);
        for entry in &result.lineage {
            assert_eq!(entry.status, LineageStatus::Matched);
            for pair_score in entry.pair_scores.values() {
                assert!((pair_score.score - 1.0).abs() < 1e-6);
            }
            for growth in entry.growth.values() {
                assert!(growth.depth_growth_pct.abs() < 1e-9);
            }
        }
    }

    /// Y0 has anomalies at {100, 200, 300}; Y1 adds one at 250.
    #[test]
    fn insertion_scenario_flags_one_new_y1() {
        let mut y0 = vec![y0_row("Girth Weld", 0.0, "0:00", ""), y0_row("Girth Weld", 1000.0, "0:00", "")];
        let mut y1 = vec![y1_row("Girth Weld", 0.0, "0:00", ""), y1_row("Girth Weld", 1000.0, "0:00", "")];

        for pos in [100.0, 200.0, 300.0] {
            y0.push(y0_row("Metal Loss", pos, "3:00", "20"));
            y1.push(y1_row("Metal Loss", pos, "3:00", "20"));
        }
        y1.push(y1_row("Metal Loss", 250.0, "3:00", "20"));

        let runs = [
            RunRowSet { year: 2001, rows: y0 },
            RunRowSet { year: 2008, rows: y1 },
            RunRowSet { year: 2008, rows: vec![y2_row("Girth Weld", 0.0, "0:00", "")] },
        ];

        let result = reconcile_surveys(&runs, &ReconcileConfig::default(), &never_cancel).unwrap();
        assert_eq!(result.summary.matched, 3);
        assert_eq!(result.summary.new_y1, 1);
    }

    /// Y1 is Y0 shifted by +5 ft uniformly, anchored by girth welds at
    /// (0, 1000) in Y0 and (5, 1005) in Y1; after drift correction every
    /// Y1 position should land back on its Y0 counterpart and match.
    #[test]
    fn pure_drift_scenario_fully_reconciles_after_correction() {
        let mut y0 = vec![y0_row("Girth Weld", 0.0, "0:00", ""), y0_row("Girth Weld", 1000.0, "0:00", "")];
        let mut y1 = vec![y1_row("Girth Weld", 5.0, "0:00", ""), y1_row("Girth Weld", 1005.0, "0:00", "")];

        for pos in [100.0, 400.0, 700.0] {
            y0.push(y0_row("Metal Loss", pos, "3:00", "20"));
            y1.push(y1_row("Metal Loss", pos + 5.0, "3:00", "20"));
        }

        let runs = [
            RunRowSet { year: 2001, rows: y0 },
            RunRowSet { year: 2008, rows: y1 },
            RunRowSet { year: 2008, rows: vec![y2_row("Girth Weld", 0.0, "0:00", "")] },
        ];

        let result = reconcile_surveys(&runs, &ReconcileConfig::default(), &never_cancel).unwrap();
        assert_eq!(result.summary.matched, 3);
        assert_eq!(result.summary.new_y1, 0);
        for correction in &result.correction_y1 {
            assert!((correction.shift_ft - (-5.0)).abs() < 1e-6);
        }
    }

    /// A Y0-only anomaly at 400 ft with no Y1 or Y2 candidate within the
    /// hard-gate distance never forms a forward link.
    #[test]
    fn dropout_scenario_leaves_an_unmatched_y0_entry() {
        let mut y0 = vec![y0_row("Girth Weld", 0.0, "0:00", ""), y0_row("Girth Weld", 2000.0, "0:00", "")];
        y0.push(y0_row("Metal Loss", 400.0, "3:00", "20"));

        let y1 = vec![y1_row("Girth Weld", 0.0, "0:00", ""), y1_row("Girth Weld", 2000.0, "0:00", "")];
        let y2 = vec![y2_row("Girth Weld", 0.0, "0:00", ""), y2_row("Girth Weld", 2000.0, "0:00", "")];

        let runs = [
            RunRowSet { year: 2001, rows: y0 },
            RunRowSet { year: 2008, rows: y1 },
            RunRowSet { year: 2015, rows: y2 },
        ];

        let result = reconcile_surveys(&runs, &ReconcileConfig::default(), &never_cancel).unwrap();
        assert_eq!(result.summary.total_lineage_entries, 1);
        assert_eq!(result.lineage[0].status, LineageStatus::Matched);
        assert!(!result.lineage[0].per_run.contains_key(&model::RunYear::Y1));
        assert!(!result.lineage[0].per_run.contains_key(&model::RunYear::Y2));
    }

    #[test]
    fn schema_error_propagates_for_missing_mandatory_header() {
        let runs = [
            RunRowSet { year: 2001, rows: vec![row(&[("Event", "Metal Loss")])] },
            RunRowSet { year: 2008, rows: vec![y1_row("Metal Loss", 100.0, "3:00", "20")] },
            RunRowSet { year: 2015, rows: vec![y2_row("Metal Loss", 100.0, "3:00", "20")] },
        ];

        let err = reconcile_surveys(&runs, &ReconcileConfig::default(), &never_cancel).unwrap_err();
        assert!(matches!(err, LineageError::SchemaError { run_year: 2001, .. }));
    }

    #[test]
    fn cancellation_before_any_work_is_honored() {
        let runs = [
            RunRowSet { year: 2001, rows: vec![y0_row("Metal Loss", 100.0, "3:00", "20")] },
            RunRowSet { year: 2008, rows: vec![y1_row("Metal Loss", 100.0, "3:00", "20")] },
            RunRowSet { year: 2015, rows: vec![y2_row("Metal Loss", 100.0, "3:00", "20")] },
        ];

        let err = reconcile_surveys(&runs, &ReconcileConfig::default(), &|| true).unwrap_err();
        assert!(matches!(err, LineageError::Cancelled));
    }
}
