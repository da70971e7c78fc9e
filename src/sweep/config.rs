//! Immutable sweep configuration and the traversal grid it defines.
//!
//! Every field is a required input; defaults are resolved by
//! [`crate::settings`] before a [`SweepConfig`] is built.

use std::time::Duration;

use serde::Serialize;

use super::metric::MetricKind;
use super::model::OperatingPoint;
use crate::error::ConfigError;

/// Parameters for one sweep. Passed by reference into the controller and never
/// mutated during the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepConfig {
    pub freq_start_mhz: u32,
    pub freq_end_mhz: u32,
    pub freq_step_mhz: u32,
    pub cv_start_mv: u32,
    pub cv_max_mv: u32,
    pub cv_step_mv: u32,
    /// Samples per window.
    pub window_size: usize,
    pub sample_interval: Duration,
    /// Wait after a configuration change before the first sample.
    pub settle_delay: Duration,
    /// Maximum coefficient of variation still classified as Stable (inclusive).
    pub cv_threshold: f64,
    /// Chip temperature at or above which the sweep is aborted.
    pub temp_limit_c: f64,
    /// Windows with fewer samples are inconclusive.
    pub min_samples: usize,
    /// Extra windows measured at the same voltage before an Unstable verdict
    /// escalates the voltage.
    pub unstable_confirmations: u32,
    /// Retries granted to a point whose window came back too short.
    pub insufficient_data_retries: u32,
    /// Consecutive transport failures at one point that abort the frequency.
    pub transport_failure_limit: u32,
    /// When set, an otherwise stable window whose mean hashrate falls below
    /// `tolerance * best stable mean hashrate` is treated as Unstable.
    pub hashrate_tolerance: Option<f64>,
    /// Start each frequency at the previous frequency's stable voltage.
    pub carry_voltage: bool,
    pub metric: MetricKind,
}

impl SweepConfig {
    /// Fail fast on any range or threshold that would make the sweep
    /// meaningless. Called by the controller before the first point.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.freq_start_mhz > self.freq_end_mhz {
            return Err(ConfigError::FrequencyRange {
                start: self.freq_start_mhz,
                end: self.freq_end_mhz,
            });
        }
        if self.cv_start_mv > self.cv_max_mv {
            return Err(ConfigError::VoltageRange {
                start: self.cv_start_mv,
                max: self.cv_max_mv,
            });
        }
        if self.freq_step_mhz == 0 {
            return Err(ConfigError::ZeroStep { axis: "frequency" });
        }
        if self.cv_step_mv == 0 {
            return Err(ConfigError::ZeroStep { axis: "voltage" });
        }
        if self.min_samples == 0 {
            return Err(ConfigError::MinSamples(self.min_samples));
        }
        if self.window_size < self.min_samples {
            return Err(ConfigError::WindowTooSmall {
                window: self.window_size,
                min: self.min_samples,
            });
        }
        if !(self.cv_threshold.is_finite() && self.cv_threshold > 0.0) {
            return Err(ConfigError::Threshold(self.cv_threshold));
        }
        if !(self.temp_limit_c.is_finite() && self.temp_limit_c > 0.0) {
            return Err(ConfigError::TempLimit(self.temp_limit_c));
        }
        if let Some(t) = self.hashrate_tolerance {
            if !(t > 0.0 && t <= 1.0) {
                return Err(ConfigError::Tolerance(t));
            }
        }
        if self.transport_failure_limit == 0 {
            return Err(ConfigError::TransportLimit);
        }
        Ok(())
    }

    /// Frequencies visited, ascending from start. The end is included when it
    /// lies on a step boundary; otherwise the last frequency is the largest
    /// step below it.
    pub fn frequencies(&self) -> impl Iterator<Item = u32> {
        let step = self.freq_step_mhz.max(1) as usize;
        (self.freq_start_mhz..=self.freq_end_mhz).step_by(step)
    }

    /// Voltages from `from_mv` up to the maximum, in configured steps.
    pub fn voltages_from(&self, from_mv: u32) -> impl Iterator<Item = u32> {
        let step = self.cv_step_mv.max(1) as usize;
        let start = from_mv.max(self.cv_start_mv);
        (start..=self.cv_max_mv).step_by(step)
    }

    /// Whether `point` lies inside the configured bounds.
    pub fn contains(&self, point: OperatingPoint) -> bool {
        (self.freq_start_mhz..=self.freq_end_mhz).contains(&point.frequency_mhz())
            && (self.cv_start_mv..=self.cv_max_mv).contains(&point.core_voltage_mv())
    }

    /// Upper bound on the number of points a sweep may command.
    pub fn planned_points(&self) -> usize {
        self.frequencies().count() * self.voltages_from(self.cv_start_mv).count()
    }
}
