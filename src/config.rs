//! Tunable parameters for the reconciliation pipeline, all optional with
//! defaults matching the external interface contract.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Weights applied to the three cost components in the matcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchWeights {
    pub distance: f64,
    pub clock: f64,
    pub feature: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            distance: 0.5,
            clock: 0.3,
            feature: 0.2,
        }
    }
}

/// Risk forecaster weights for the composite `R(x)` field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskWeights {
    pub emergence: f64,
    pub growth: f64,
    pub critical_count: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            emergence: 0.4,
            growth: 0.3,
            critical_count: 0.3,
        }
    }
}

/// All tunables named in the external interface contract, with defaults
/// matching it exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub match_weights: MatchWeights,
    /// Hard gate on candidate distance; candidates beyond this never match.
    pub d_max_ft: f64,
    /// Matches with cost above this are emitted but `accepted = false`.
    pub cost_threshold: f64,
    pub window_size_ft: f64,
    pub window_step_ft: f64,
    /// Practical `|A| * |B|` above which the matcher windows its input.
    pub windowing_threshold: usize,

    pub cluster_bin_width_ft: f64,
    pub cluster_threshold_factor: f64,

    pub risk_grid_step_ft: f64,
    pub risk_window_ft: f64,
    pub risk_threshold: f64,
    pub risk_weights: RiskWeights,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            match_weights: MatchWeights::default(),
            d_max_ft: 50.0,
            cost_threshold: 0.8,
            window_size_ft: 500.0,
            window_step_ft: 400.0,
            windowing_threshold: 1_000_000,
            cluster_bin_width_ft: 200.0,
            cluster_threshold_factor: 2.0,
            risk_grid_step_ft: 100.0,
            risk_window_ft: 500.0,
            risk_threshold: 0.6,
            risk_weights: RiskWeights::default(),
        }
    }
}

/// Errors produced while loading configuration from a file or environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not load configuration: {0}")]
    Load(#[from] figment::Error),
}

impl ReconcileConfig {
    /// Load configuration from a TOML file, overridden by any `ILI_*`
    /// environment variables, falling back to [`Default::default`] for
    /// anything unset in either source.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Figment::from(figment::providers::Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ILI_").split("__"))
            .extract()
            .map_err(ConfigError::from)
    }
}
