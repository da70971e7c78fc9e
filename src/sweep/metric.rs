//! Efficiency metrics used to rank stable operating points.
//!
//! The controller keeps the stable point with the highest score. A metric may
//! decline to score a point (returns `None`), in which case the point can
//! never become best under that metric.

use serde::{Deserialize, Serialize};

use super::model::{OperatingPoint, WindowStats};

/// Scores a stable point. Higher is better.
pub trait EfficiencyMetric: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, point: &OperatingPoint, stats: &WindowStats) -> Option<f64>;
}

/// Raw mean hashrate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hashrate;

impl EfficiencyMetric for Hashrate {
    fn name(&self) -> &'static str {
        "hashrate"
    }

    fn score(&self, _point: &OperatingPoint, stats: &WindowStats) -> Option<f64> {
        finite(stats.mean_hashrate)
    }
}

/// Mean hashrate per millivolt of core voltage.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashratePerMillivolt;

impl EfficiencyMetric for HashratePerMillivolt {
    fn name(&self) -> &'static str {
        "per-millivolt"
    }

    fn score(&self, point: &OperatingPoint, stats: &WindowStats) -> Option<f64> {
        if point.core_voltage_mv() == 0 {
            return None;
        }
        finite(stats.mean_hashrate / point.core_voltage_mv() as f64)
    }
}

/// Mean hashrate per watt. Needs power telemetry.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashratePerWatt;

impl EfficiencyMetric for HashratePerWatt {
    fn name(&self) -> &'static str {
        "per-watt"
    }

    fn score(&self, _point: &OperatingPoint, stats: &WindowStats) -> Option<f64> {
        let power = stats.mean_power_w.filter(|p| *p > 0.0)?;
        finite(stats.mean_hashrate / power)
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

// ---------------------------------------------------------------------------
// MetricKind
// ---------------------------------------------------------------------------

/// Selects one of the built-in metrics from config or the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKind {
    #[default]
    Hashrate,
    PerMillivolt,
    PerWatt,
}

impl MetricKind {
    pub fn build(self) -> Box<dyn EfficiencyMetric> {
        match self {
            MetricKind::Hashrate     => Box::new(Hashrate),
            MetricKind::PerMillivolt => Box::new(HashratePerMillivolt),
            MetricKind::PerWatt      => Box::new(HashratePerWatt),
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.build().name())
    }
}
