//! Canonical data types shared by every pipeline component.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Warning;

/// One run's raw rows as handed off by the upstream tabular-file reader:
/// an unordered collection of string-keyed fields, plus the run's nominal
/// year. Parsing the source file and handling character encoding is the
/// caller's responsibility; this crate only consumes the resulting rows.
#[derive(Debug, Clone)]
pub struct RunRowSet {
    pub year: i32,
    pub rows: Vec<IndexMap<String, String>>,
}

/// One of the three surveys reconciled by a job.
///
/// Kept as an enum rather than a raw `i32` so that lookups in the per-run
/// maps on [`LineageEntry`] cannot silently target a year the pipeline
/// never heard of; callers still supply and receive plain integer years at
/// the API boundary via [`RunYear::from_i32`]/[`RunYear::as_i32`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RunYear {
    Y0,
    Y1,
    Y2,
}

impl RunYear {
    pub fn from_i32(year: i32, years: &RunYears) -> Option<Self> {
        if year == years.y0 {
            Some(RunYear::Y0)
        } else if year == years.y1 {
            Some(RunYear::Y1)
        } else if year == years.y2 {
            Some(RunYear::Y2)
        } else {
            None
        }
    }

    pub fn as_i32(&self, years: &RunYears) -> i32 {
        match self {
            RunYear::Y0 => years.y0,
            RunYear::Y1 => years.y1,
            RunYear::Y2 => years.y2,
        }
    }
}

/// The nominal calendar years of the three runs, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunYears {
    pub y0: i32,
    pub y1: i32,
    pub y2: i32,
}

/// A row's classified feature type, derived by regex on the raw description.
///
/// Classification precedence is `GirthWeld > Anomaly > Other` per the
/// normalizer's rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FeatureKind {
    GirthWeld,
    Anomaly,
    Other,
}

/// One row from one run, after header mapping, clock normalization, and
/// feature classification.
///
/// Every field but `run_year` and `row_index` is optional: a row that is
/// missing most safety fields is still retained (and still gets a
/// `row_index`) so that a missing distance can be tolerated and skipped by
/// geometric computations downstream, per the normalizer's failure mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub run_year: i32,
    pub row_index: usize,

    pub feature_id: Option<String>,
    pub feature_kind: FeatureKind,
    pub feature_description: Option<String>,

    pub odometer_ft: Option<f64>,
    pub corrected_odometer_ft: Option<f64>,

    pub wall_thickness_in: Option<f64>,
    pub depth_pct: Option<f64>,
    pub depth_in: Option<f64>,
    pub length_in: Option<f64>,
    pub width_in: Option<f64>,

    /// Always in `[0, 12)` when present; `12` is folded to `0`.
    pub clock_position: Option<f64>,

    pub joint_number: Option<String>,
    pub joint_length_ft: Option<f64>,
    pub dist_to_us_weld_ft: Option<f64>,
    pub dist_to_ds_weld_ft: Option<f64>,

    pub id_od: Option<String>,
    pub erf: Option<f64>,
    pub rpr: Option<f64>,
    pub comments: Option<String>,

    /// Safety fields present in only this run's schema, preserved opaquely
    /// as raw strings under their original (whitespace-collapsed) header.
    pub extra: IndexMap<String, String>,
}

impl CanonicalRecord {
    /// The position to use for every downstream geometric computation: the
    /// drift-corrected odometer if available, falling back to the raw one.
    ///
    /// Returns `None` only when the row never had a parseable distance at
    /// all, in which case callers must skip it (the normalizer's documented
    /// failure mode).
    pub fn position(&self) -> Option<f64> {
        self.corrected_odometer_ft.or(self.odometer_ft)
    }
}

/// One cross-run assignment produced by the matcher for an ordered run pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub a_run_year: i32,
    pub a_row_index: usize,
    pub b_run_year: i32,
    pub b_row_index: usize,

    /// In `[0, inf)`; `10^6` marks a hard-gated (distance-infeasible) pair.
    pub cost: f64,
    /// `max(0, 1 - cost)`.
    pub score: f64,
    pub components: MatchComponents,
    /// `cost <= cost_threshold`.
    pub accepted: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchComponents {
    pub distance_confidence: f64,
    pub clock_confidence: f64,
    pub feature_confidence: f64,
}

/// The lifecycle status of one physical defect's chain of observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum LineageStatus {
    Matched,
    NewY1,
    NewY2,
    Missing,
}

/// A forward-looking severity bucket derived from the most recent available
/// annual growth rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Critical,
    Moderate,
    Low,
    Unknown,
}

/// Per-pair match score and component breakdown, carried on a [`LineageEntry`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PairScore {
    pub score: f64,
    pub components: MatchComponents,
}

/// Growth metrics computed between the two records of one pair of an
/// assembled chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GrowthMetrics {
    pub delta_years: f64,
    pub depth_growth_pct: f64,
    pub annual_growth_rate_pct: f64,
    pub depth_growth_in: Option<f64>,
    pub annual_depth_growth_in: Option<f64>,
    pub length_growth_in: Option<f64>,
    pub annual_length_growth_in: Option<f64>,
    pub width_growth_in: Option<f64>,
    pub annual_width_growth_in: Option<f64>,
    /// Only populated when `annual_growth_rate_pct > 0` and the later
    /// record's `depth_pct < 80`.
    pub time_to_critical_years: Option<f64>,
}

/// One of the three ordered run pairs a chain can span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunPair {
    Y0Y1,
    Y1Y2,
    Y0Y2,
}

impl RunPair {
    pub const ALL: [RunPair; 3] = [RunPair::Y0Y1, RunPair::Y1Y2, RunPair::Y0Y2];

    pub fn endpoints(&self) -> (RunYear, RunYear) {
        match self {
            RunPair::Y0Y1 => (RunYear::Y0, RunYear::Y1),
            RunPair::Y1Y2 => (RunYear::Y1, RunYear::Y2),
            RunPair::Y0Y2 => (RunYear::Y0, RunYear::Y2),
        }
    }
}

/// The output unit of the lineage assembler: one physical defect's chain of
/// per-run observations plus derived metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEntry {
    pub status: LineageStatus,
    pub per_run: HashMap<RunYear, CanonicalRecord>,
    pub pair_scores: HashMap<RunPair, PairScore>,
    pub growth: HashMap<RunPair, GrowthMetrics>,
    pub severity: Severity,
}

impl LineageEntry {
    /// The most recent record available in the chain, preferring Y2, then
    /// Y1, then Y0, per the cluster analyzer's "latest" rule.
    pub fn latest(&self) -> Option<&CanonicalRecord> {
        self.per_run
            .get(&RunYear::Y2)
            .or_else(|| self.per_run.get(&RunYear::Y1))
            .or_else(|| self.per_run.get(&RunYear::Y0))
    }

    /// The most recent `annual_growth_rate_pct` available across the
    /// chain's pairs, preferring the pair ending latest.
    pub fn latest_growth_rate(&self) -> Option<f64> {
        for pair in [RunPair::Y1Y2, RunPair::Y0Y2, RunPair::Y0Y1] {
            if let Some(g) = self.growth.get(&pair) {
                return Some(g.annual_growth_rate_pct);
            }
        }
        None
    }
}

/// One girth-weld anchor pairing used by the drift corrector to build its
/// piecewise-linear correction function.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub gw_index: usize,
    pub baseline_ft: f64,
    pub target_ft: f64,
    pub shift_ft: f64,
}

/// One contiguous high-density zone of anomaly positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensityCluster {
    pub start_ft: f64,
    pub end_ft: f64,
    pub anomaly_count: usize,
    pub mean_depth_pct: Option<f64>,
    pub mode_severity: Severity,
}

/// One contiguous zone where the composite risk field is at or above the
/// high-risk threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighRiskZone {
    pub start_ft: f64,
    pub end_ft: f64,
    pub max_risk: f64,
}

/// The risk forecaster's full grid output plus the high-risk zones derived
/// from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProfile {
    pub grid_ft: Vec<f64>,
    pub emergence_density: Vec<f64>,
    pub local_growth: Vec<f64>,
    pub critical_count_20yr: Vec<f64>,
    pub composite_risk: Vec<f64>,
    pub high_risk_zones: Vec<HighRiskZone>,
}

/// Summary counters attached to a successful result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_lineage_entries: usize,
    pub matched: usize,
    pub new_y1: usize,
    pub new_y2: usize,
    pub missing: usize,
}

/// The complete output of one reconciliation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub summary: Summary,
    pub lineage: Vec<LineageEntry>,
    pub correction_y1: Vec<CorrectionRecord>,
    pub correction_y2: Vec<CorrectionRecord>,
    pub clusters: Vec<DensityCluster>,
    pub risk: RiskProfile,
    pub warnings: Vec<Warning>,
}
