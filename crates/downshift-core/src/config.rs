//! downshift.toml configuration parser.
//!
//! Raw TOML deserializes into `DownshiftConfig`; `validate()` checks
//! every numeric range and produces the immutable `Settings` the rest
//! of the system runs on. Validation is fail-fast: the first offending
//! field aborts the load with a `ConfigError` naming it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{ClusterId, ScalingParameters};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownshiftConfig {
    pub cluster: ClusterSection,
    pub monitoring: MonitoringSection,
    pub thresholds: ThresholdSection,
    pub weights: WeightSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSection {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSection {
    /// Seconds between polling ticks.
    pub sampling_interval_secs: u64,
    /// Maximum samples retained (n).
    pub history_periods: usize,
    /// Minimum samples before a scale-down may fire (m).
    pub threshold_periods: usize,
    /// Capacity floor; defaults to 1.
    pub min_capacity: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdSection {
    pub low_utilization: f64,
    pub high_utilization: f64,
    pub target_utilization: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightSection {
    pub decay_factor: f64,
}

/// Fully validated runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cluster_id: ClusterId,
    pub sampling_interval: Duration,
    pub parameters: ScalingParameters,
}

impl Settings {
    /// Load, parse, and validate a config file in one step.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        DownshiftConfig::from_file(path)?.validate()
    }
}

impl DownshiftConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check every numeric range and produce immutable `Settings`.
    pub fn validate(self) -> ConfigResult<Settings> {
        if self.cluster.id.is_empty() {
            return Err(ConfigError::EmptyClusterId);
        }

        check_range(
            "monitoring.sampling_interval_secs",
            self.monitoring.sampling_interval_secs as f64,
            60.0,
            3600.0,
        )?;
        check_range(
            "monitoring.history_periods",
            self.monitoring.history_periods as f64,
            2.0,
            100.0,
        )?;
        check_range(
            "monitoring.threshold_periods",
            self.monitoring.threshold_periods as f64,
            1.0,
            self.monitoring.history_periods as f64,
        )?;

        let min_capacity = self.monitoring.min_capacity.unwrap_or(1);
        if min_capacity < 1 {
            return Err(ConfigError::Range {
                field: "monitoring.min_capacity",
                value: min_capacity as f64,
                min: 1.0,
                max: u32::MAX as f64,
            });
        }

        let t = &self.thresholds;
        check_range("thresholds.low_utilization", t.low_utilization, 0.0, 1.0)?;
        check_range(
            "thresholds.high_utilization",
            t.high_utilization,
            t.low_utilization,
            1.0,
        )?;
        check_range(
            "thresholds.target_utilization",
            t.target_utilization,
            t.low_utilization,
            t.high_utilization,
        )?;

        // Strictly positive: a zero decay factor would erase every
        // sample but the newest.
        let decay = self.weights.decay_factor;
        if !(decay > 0.0 && decay <= 1.0) {
            return Err(ConfigError::Range {
                field: "weights.decay_factor",
                value: decay,
                min: 0.0,
                max: 1.0,
            });
        }

        Ok(Settings {
            cluster_id: self.cluster.id,
            sampling_interval: Duration::from_secs(self.monitoring.sampling_interval_secs),
            parameters: ScalingParameters {
                low_threshold: t.low_utilization,
                high_threshold: t.high_utilization,
                target_utilization: t.target_utilization,
                decay_factor: decay,
                threshold_periods: self.monitoring.threshold_periods,
                history_periods: self.monitoring.history_periods,
                min_capacity,
            },
        })
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> ConfigResult<()> {
    if value < min || value > max {
        return Err(ConfigError::Range {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}
