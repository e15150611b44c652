//! Domain types for the downshift capacity trimmer.
//!
//! These types flow between the sample window, the decision engine,
//! and the orchestrator. All of them are plain values: a sample is
//! immutable once recorded, a verdict and a summary live for exactly
//! one evaluation, and a parameter set is replaced wholesale on
//! reload, never mutated field by field.

use serde::{Deserialize, Serialize};

/// Unique identifier for a managed cluster.
pub type ClusterId = String;

// ── Samples ────────────────────────────────────────────────────────

/// One resource-utilization observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    /// Unix timestamp (seconds) of the observation.
    pub epoch: u64,
    /// Fraction of the resource in use, in `[0, 1]`.
    pub utilization: f64,
}

impl UtilizationSample {
    pub fn new(epoch: u64, utilization: f64) -> Self {
        Self { epoch, utilization }
    }
}

// ── Parameters ─────────────────────────────────────────────────────

/// Validated scaling parameters.
///
/// Produced once from configuration (`DownshiftConfig::validate`) and
/// treated as immutable: a config reload builds a whole new value and
/// the orchestrator swaps it in between ticks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingParameters {
    /// Utilization below this counts toward a scale-down.
    pub low_threshold: f64,
    /// Utilization above this triggers a restore while scaled down.
    pub high_threshold: f64,
    /// Utilization the target-capacity formula aims for.
    pub target_utilization: f64,
    /// Exponential decay applied to older samples, in `(0, 1]`.
    pub decay_factor: f64,
    /// Minimum number of samples before a scale-down may fire (m).
    pub threshold_periods: usize,
    /// Maximum number of samples retained in the window (n).
    pub history_periods: usize,
    /// Floor for any computed target capacity.
    pub min_capacity: u32,
}

// ── Verdicts ───────────────────────────────────────────────────────

/// The outcome of one evaluation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingVerdict {
    /// Leave capacity alone.
    NoAction,
    /// Reduce capacity to the given target.
    ScaleDown { target_capacity: u32 },
    /// Return capacity to its pre-scale-down value.
    Restore,
}

// ── Diagnostics ────────────────────────────────────────────────────

/// Snapshot of the decision factors behind a tick.
///
/// Recomputed from scratch on demand; the engine itself emits no
/// diagnostics, callers derive them from this.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingSummary {
    pub sample_count: usize,
    pub avg_utilization: f64,
    pub weighted_avg: f64,
    pub below_threshold_count: usize,
    pub weighted_below_count: f64,
    pub should_scale_down: bool,
}

impl ScalingSummary {
    /// The defined summary for an empty sample set.
    pub fn empty() -> Self {
        Self {
            sample_count: 0,
            avg_utilization: 0.0,
            weighted_avg: 0.0,
            below_threshold_count: 0,
            weighted_below_count: 0.0,
            should_scale_down: false,
        }
    }
}
