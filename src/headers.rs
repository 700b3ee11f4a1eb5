//! The canonical-to-raw header mapping table.
//!
//! This is data, not code, so that additional runs can be supported without
//! touching the normalizer's logic. Raw names are matched case-insensitively
//! with whitespace runs collapsed and embedded newlines treated as spaces —
//! see [`crate::normalize::normalize_header`].

use std::collections::HashMap;
use std::sync::OnceLock;

/// The canonical field names recognized by the normalizer.
pub const CANONICAL_FIELDS: &[&str] = &[
    "odometer_ft",
    "wall_thickness_in",
    "feature_description",
    "clock_raw",
    "depth_pct",
    "length_in",
    "width_in",
    "joint_number",
    "joint_length_ft",
    "id_od",
    "erf",
    "dist_to_us_weld_ft",
    "dist_to_ds_weld_ft",
];

/// Canonical field names that are mandatory: a run missing the header
/// entirely, or whose matching column is entirely null, is a
/// [`crate::error::LineageError::SchemaError`].
pub const MANDATORY_FIELDS: &[&str] = &["odometer_ft"];

fn table() -> &'static HashMap<i32, HashMap<&'static str, &'static [&'static str]>> {
    static TABLE: OnceLock<HashMap<i32, HashMap<&'static str, &'static [&'static str]>>> =
        OnceLock::new();
    TABLE.get_or_init(|| {
        let mut m = HashMap::new();
        m.insert(0, y0_map());
        m.insert(1, y1_map());
        m.insert(2, y2_map());
        m
    })
}

/// The raw header names accepted for `canonical` in the run whose ordinal
/// position (0, 1, or 2) is `run_index`. Returns `None` if `run_index` is
/// not 0, 1, or 2, or `canonical` is not a recognized canonical field.
pub fn raw_names_for(run_index: i32, canonical: &str) -> Option<&'static [&'static str]> {
    table().get(&run_index)?.get(canonical).copied()
}

fn y0_map() -> HashMap<&'static str, &'static [&'static str]> {
    HashMap::from([
        ("odometer_ft", &["log dist. [ft]"] as &[&str]),
        ("wall_thickness_in", &["t [in]"]),
        ("feature_description", &["event"]),
        ("clock_raw", &["o'clock"]),
        ("depth_pct", &["depth [%]"]),
        ("length_in", &["length [in]"]),
        ("width_in", &["width [in]"]),
        ("joint_number", &["jt #"]),
        ("joint_length_ft", &["jt lgth [ft]"]),
        ("id_od", &["id/od"]),
        ("erf", &["erf"]),
        ("dist_to_us_weld_ft", &["us weld dist [ft]"]),
        ("dist_to_ds_weld_ft", &["ds weld dist [ft]"]),
    ])
}

fn y1_map() -> HashMap<&'static str, &'static [&'static str]> {
    HashMap::from([
        ("odometer_ft", &["log dist. [ft]"] as &[&str]),
        ("wall_thickness_in", &["wt [in]"]),
        ("feature_description", &["event description"]),
        ("clock_raw", &["o'clock"]),
        ("depth_pct", &["depth [%]"]),
        ("length_in", &["length [in]"]),
        ("width_in", &["width [in]"]),
        ("joint_number", &["jt #"]),
        ("joint_length_ft", &["jt lgth [ft]"]),
        ("id_od", &["anomaly id/od"]),
        ("erf", &["erf"]),
        ("dist_to_us_weld_ft", &["us weld dist [ft]"]),
        ("dist_to_ds_weld_ft", &["ds weld dist [ft]"]),
    ])
}

fn y2_map() -> HashMap<&'static str, &'static [&'static str]> {
    HashMap::from([
        ("odometer_ft", &["ili wheel count [ft.]"] as &[&str]),
        ("wall_thickness_in", &["wt [in]"]),
        ("feature_description", &["feature description"]),
        ("clock_raw", &["o'clock [hh:mm]"]),
        ("depth_pct", &["metal loss depth [%]"]),
        ("length_in", &["length [in.]"]),
        ("width_in", &["width [in.]"]),
        ("joint_number", &["joint number"]),
        ("joint_length_ft", &["joint length [ft.]"]),
        ("id_od", &["id/od"]),
        ("erf", &["erf"]),
        ("dist_to_us_weld_ft", &["distance marker upstream [ft.]"]),
        ("dist_to_ds_weld_ft", &["distance marker downstream [ft.]"]),
    ])
}
