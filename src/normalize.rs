//! Component A: schema normalization of heterogeneous per-run columns into
//! canonical records, feature classification, and clock normalization.

use std::sync::OnceLock;

use indexmap::IndexMap;
use log::{debug, warn};
use regex::Regex;

use crate::error::LineageError;
use crate::headers::{self, MANDATORY_FIELDS};
use crate::model::{CanonicalRecord, FeatureKind, RunRowSet};

/// Collapse whitespace runs (including embedded newlines) to a single space
/// and lowercase, so raw header names can be matched regardless of case or
/// incidental whitespace differences between schemas.
fn normalize_header(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

fn girth_weld_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(girth\s*weld|girthweld|gw)$").expect("girth weld regex must compile")
    })
}

fn anomaly_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)metal\s*loss|corrosion|cluster|dent|crack|seam\s*weld\s*anomaly")
            .expect("anomaly regex must compile")
    })
}

/// Classify a feature by its raw description. Precedence is
/// `girth_weld > anomaly > other`.
pub fn classify_feature(description: Option<&str>) -> FeatureKind {
    let Some(desc) = description else {
        return FeatureKind::Other;
    };
    let trimmed = desc.trim();
    if girth_weld_regex().is_match(trimmed) {
        FeatureKind::GirthWeld
    } else if anomaly_regex().is_match(trimmed) {
        FeatureKind::Anomaly
    } else {
        FeatureKind::Other
    }
}

/// Parse a clock-position value into `[0, 12)`, or `None` if unparseable.
///
/// Accepts "hh:mm" / "hh:mm:ss" strings (also with '.' as the separator),
/// bare numbers in `[0, 12]` (kept as-is, with `12` wrapped to `0`), and
/// numbers greater than 12 (wrapped modulo 12).
pub fn parse_clock(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if s.contains(':') || s.matches('.').count() > 1 {
        let sep = if s.contains(':') { ':' } else { '.' };
        let parts: Vec<&str> = s.split(sep).collect();
        let h: f64 = parts.first()?.trim().parse().ok()?;
        let m: f64 = parts.get(1).map(|p| p.trim().parse()).transpose().ok()??;
        let sec: f64 = parts
            .get(2)
            .map(|p| p.trim().parse())
            .transpose()
            .ok()?
            .unwrap_or(0.0);
        return Some(wrap_clock(h + m / 60.0 + sec / 3600.0));
    }

    let v: f64 = s.parse().ok()?;
    Some(wrap_clock(v))
}

fn wrap_clock(v: f64) -> f64 {
    let wrapped = v.rem_euclid(12.0);
    wrapped
}

fn lookup<'a>(row: &'a IndexMap<String, String>, normalized_keys: &IndexMap<String, &'a String>, raw_names: &[&str]) -> Option<&'a str> {
    for raw_name in raw_names {
        if let Some(v) = normalized_keys.get(&normalize_header(raw_name)) {
            let v = v.trim();
            if !v.is_empty() {
                return Some(v.as_str());
            }
        }
    }
    let _ = row;
    None
}

fn parse_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

/// Normalize one run's row set into canonical records, returning the full
/// list plus the girth-weld and anomaly subsets (by index into the full
/// list, for convenience).
///
/// `run_index` is the run's ordinal position (0, 1, or 2) used to select
/// which header mapping table to apply; `row_set.year` is the calendar
/// year carried through onto every record.
pub fn normalize_run(
    run_index: i32,
    row_set: &RunRowSet,
) -> Result<Vec<CanonicalRecord>, LineageError> {
    let mut records = Vec::with_capacity(row_set.rows.len());

    // Verify every mandatory field's header is present at least once
    // before doing any per-row work.
    for field in MANDATORY_FIELDS {
        let raw_names = headers::raw_names_for(run_index, field).unwrap_or(&[]);
        let header_present = row_set.rows.iter().any(|row| {
            row.keys()
                .any(|k| raw_names.iter().any(|rn| normalize_header(rn) == normalize_header(k)))
        });
        if !header_present {
            return Err(LineageError::SchemaError {
                run_year: row_set.year,
                field,
            });
        }
    }

    for (row_index, row) in row_set.rows.iter().enumerate() {
        let normalized_keys: IndexMap<String, &String> = row
            .iter()
            .map(|(k, v)| (normalize_header(k), v))
            .collect();

        let get = |canonical: &str| -> Option<&str> {
            let raw_names = headers::raw_names_for(run_index, canonical)?;
            lookup(row, &normalized_keys, raw_names)
        };

        let feature_description = get("feature_description").map(|s| s.to_string());
        let feature_kind = classify_feature(feature_description.as_deref());

        let odometer_ft = match get("odometer_ft").and_then(parse_f64) {
            Some(v) => Some(v),
            None => {
                debug!(
                    "run {}: row {row_index} has no parseable odometer position",
                    row_set.year
                );
                None
            }
        };

        let clock_position = match get("clock_raw") {
            Some(raw) => match parse_clock(raw) {
                Some(c) => Some(c),
                None => {
                    warn!("run {}: row {row_index} has unparseable clock value '{raw}'", row_set.year);
                    None
                }
            },
            None => None,
        };

        let wall_thickness_in = get("wall_thickness_in").and_then(parse_f64);
        let depth_pct = get("depth_pct").and_then(parse_f64);
        let depth_in = match (depth_pct, wall_thickness_in) {
            (Some(d), Some(wt)) => Some(d * wt / 100.0),
            _ => None,
        };

        let known_raw_names: Vec<String> = headers::CANONICAL_FIELDS
            .iter()
            .filter_map(|f| headers::raw_names_for(run_index, f))
            .flat_map(|names| names.iter().map(|n| normalize_header(n)))
            .collect();
        let extra: IndexMap<String, String> = row
            .iter()
            .filter(|(k, _)| !known_raw_names.contains(&normalize_header(k)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        records.push(CanonicalRecord {
            run_year: row_set.year,
            row_index,
            feature_id: None,
            feature_kind,
            feature_description,
            odometer_ft,
            corrected_odometer_ft: odometer_ft,
            wall_thickness_in,
            depth_pct,
            depth_in,
            length_in: get("length_in").and_then(parse_f64),
            width_in: get("width_in").and_then(parse_f64),
            clock_position,
            joint_number: get("joint_number").map(|s| s.to_string()),
            joint_length_ft: get("joint_length_ft").and_then(parse_f64),
            dist_to_us_weld_ft: get("dist_to_us_weld_ft").and_then(parse_f64),
            dist_to_ds_weld_ft: get("dist_to_ds_weld_ft").and_then(parse_f64),
            id_od: get("id_od").map(|s| s.to_string()),
            erf: get("erf").and_then(parse_f64),
            rpr: None,
            comments: None,
            extra,
        });
    }

    if records.iter().all(|r| r.odometer_ft.is_none()) {
        return Err(LineageError::SchemaError {
            run_year: row_set.year,
            field: "odometer_ft",
        });
    }

    Ok(records)
}

/// Split a run's canonical records into `(girth_welds, anomalies)`.
pub fn split_by_kind(records: &[CanonicalRecord]) -> (Vec<CanonicalRecord>, Vec<CanonicalRecord>) {
    let girth_welds = records
        .iter()
        .filter(|r| r.feature_kind == FeatureKind::GirthWeld)
        .cloned()
        .collect();
    let anomalies = records
        .iter()
        .filter(|r| r.feature_kind == FeatureKind::Anomaly)
        .cloned()
        .collect();
    (girth_welds, anomalies)
}
