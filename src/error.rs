//! Common error and warning types shared across the lineage pipeline.

use serde::{Deserialize, Serialize};

/// Fatal errors that abort a reconciliation job.
///
/// Each component raises these sparingly — most recoverable conditions are
/// reported as a [`Warning`] instead.
#[derive(Debug, thiserror::Error)]
pub enum LineageError {
    /// A run's row set lacks a mandatory canonical field's raw header, or
    /// that field's column is entirely null across the run.
    #[error("run {run_year}: missing or entirely-null mandatory field '{field}'")]
    SchemaError { run_year: i32, field: &'static str },

    /// A bug-class assertion failed; this should never happen in correct code.
    #[error("internal invariant violated: {0}")]
    InternalInvariantFailure(String),

    /// The caller's cancellation signal fired between windows or components.
    #[error("reconciliation job was cancelled")]
    Cancelled,
}

/// Recoverable conditions noted during a job but which do not abort it.
///
/// These accumulate in [`crate::model::ReconciliationResult::warnings`] rather
/// than being returned as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum Warning {
    /// Fewer than two girth welds were available in a run; drift correction
    /// was skipped for the corresponding pair.
    #[error("run {run_year}: fewer than two girth welds, drift correction skipped")]
    InsufficientAnchors { run_year: i32 },

    /// A run contributed zero anomaly records to matching.
    #[error("run {run_year}: no anomaly records present")]
    EmptyRun { run_year: i32 },

    /// All positions fed to a downstream step coincided, so a density-based
    /// computation would divide by zero; the affected output was returned
    /// empty instead.
    #[error("{component}: all input positions coincide, returning empty output")]
    NumericDegeneracy { component: &'static str },
}
