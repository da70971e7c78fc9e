//! Data model shared by the collector, evaluator, governor and controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OperatingPoint
// ---------------------------------------------------------------------------

/// A (frequency, core voltage) pair commanded to the device.
///
/// Immutable once constructed. Ordering is frequency-major, then voltage,
/// which matches the sweep traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperatingPoint {
    frequency_mhz: u32,
    core_voltage_mv: u32,
}

impl OperatingPoint {
    pub const fn new(frequency_mhz: u32, core_voltage_mv: u32) -> Self {
        Self { frequency_mhz, core_voltage_mv }
    }

    pub const fn frequency_mhz(&self) -> u32 {
        self.frequency_mhz
    }

    pub const fn core_voltage_mv(&self) -> u32 {
        self.core_voltage_mv
    }
}

impl std::fmt::Display for OperatingPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} MHz @ {} mV", self.frequency_mhz, self.core_voltage_mv)
    }
}

// ---------------------------------------------------------------------------
// TelemetrySample
// ---------------------------------------------------------------------------

/// One telemetry poll. Read-only after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Reported hashrate in the device's native unit (GH/s for AxeOS).
    pub hashrate: f64,
    pub chip_temp_c: f64,
    /// Input power in watts, when the device reports it.
    pub power_w: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetrySample {
    pub fn new(hashrate: f64, chip_temp_c: f64) -> Self {
        Self {
            hashrate,
            chip_temp_c,
            power_w: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_power(mut self, power_w: f64) -> Self {
        self.power_w = Some(power_w);
        self
    }
}

// ---------------------------------------------------------------------------
// SampleWindow
// ---------------------------------------------------------------------------

/// Ordered samples captured for one [`OperatingPoint`].
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    point: OperatingPoint,
    samples: Vec<TelemetrySample>,
}

impl SampleWindow {
    pub fn new(point: OperatingPoint) -> Self {
        Self { point, samples: Vec::new() }
    }

    pub fn with_capacity(point: OperatingPoint, capacity: usize) -> Self {
        Self { point, samples: Vec::with_capacity(capacity) }
    }

    pub fn from_samples(point: OperatingPoint, samples: Vec<TelemetrySample>) -> Self {
        Self { point, samples }
    }

    pub fn point(&self) -> OperatingPoint {
        self.point
    }

    pub fn push(&mut self, sample: TelemetrySample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[TelemetrySample] {
        &self.samples
    }

    pub fn stats(&self) -> WindowStats {
        WindowStats::from_samples(&self.samples)
    }
}

// ---------------------------------------------------------------------------
// WindowStats
// ---------------------------------------------------------------------------

/// Summary statistics over a [`SampleWindow`].
///
/// `stddev` is the sample standard deviation (n - 1 denominator) and is 0.0
/// for fewer than two samples. `cv` is `stddev / mean`; a window whose mean
/// hashrate is not positive has `cv = +inf` since the device is not hashing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub samples: usize,
    pub mean_hashrate: f64,
    pub stddev: f64,
    pub cv: f64,
    pub max_temp_c: f64,
    pub mean_power_w: Option<f64>,
}

impl WindowStats {
    /// Stats for a window with no samples.
    pub fn empty() -> Self {
        Self {
            samples: 0,
            mean_hashrate: 0.0,
            stddev: 0.0,
            cv: 0.0,
            max_temp_c: 0.0,
            mean_power_w: None,
        }
    }

    pub fn from_samples(samples: &[TelemetrySample]) -> Self {
        if samples.is_empty() {
            return Self::empty();
        }

        let n = samples.len() as f64;
        let mean = samples.iter().map(|s| s.hashrate).sum::<f64>() / n;
        let stddev = if samples.len() > 1 {
            let var = samples
                .iter()
                .map(|s| (s.hashrate - mean) * (s.hashrate - mean))
                .sum::<f64>()
                / (n - 1.0);
            var.sqrt()
        } else {
            0.0
        };
        let cv = if mean > 0.0 { stddev / mean } else { f64::INFINITY };

        let max_temp_c = samples
            .iter()
            .map(|s| s.chip_temp_c)
            .fold(f64::NEG_INFINITY, f64::max);

        let powers: Vec<f64> = samples.iter().filter_map(|s| s.power_w).collect();
        let mean_power_w = if powers.is_empty() {
            None
        } else {
            Some(powers.iter().sum::<f64>() / powers.len() as f64)
        };

        Self {
            samples: samples.len(),
            mean_hashrate: mean,
            stddev,
            cv,
            max_temp_c,
            mean_power_w,
        }
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Classification of one evaluated operating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerdictKind {
    Stable,
    Unstable,
    ThermalAbort,
    InconclusiveRetry,
}

impl std::fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerdictKind::Stable            => write!(f, "Stable"),
            VerdictKind::Unstable          => write!(f, "Unstable"),
            VerdictKind::ThermalAbort      => write!(f, "ThermalAbort"),
            VerdictKind::InconclusiveRetry => write!(f, "InconclusiveRetry"),
        }
    }
}

/// Terminal verdict for one operating point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub kind: VerdictKind,
    pub point: OperatingPoint,
    pub stats: WindowStats,
    /// Human-readable explanation, printed and logged with the verdict.
    pub reason: String,
    pub evaluated_at: DateTime<Utc>,
}

impl Verdict {
    pub fn new(kind: VerdictKind, point: OperatingPoint, stats: WindowStats, reason: impl Into<String>) -> Self {
        Self {
            kind,
            point,
            stats,
            reason: reason.into(),
            evaluated_at: Utc::now(),
        }
    }

    pub fn is_stable(&self) -> bool {
        self.kind == VerdictKind::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(hashrates: &[f64], temp: f64) -> SampleWindow {
        let point = OperatingPoint::new(600, 1100);
        SampleWindow::from_samples(
            point,
            hashrates.iter().map(|&h| TelemetrySample::new(h, temp)).collect(),
        )
    }

    #[test]
    fn test_operating_point_orders_frequency_major() {
        let a = OperatingPoint::new(600, 1200);
        let b = OperatingPoint::new(605, 1100);
        assert!(a < b);
        assert!(OperatingPoint::new(600, 1100) < a);
    }

    #[test]
    fn test_operating_point_display() {
        assert_eq!(OperatingPoint::new(600, 1150).to_string(), "600 MHz @ 1150 mV");
    }

    #[test]
    fn test_stats_empty_window_is_zeroed() {
        let s = window(&[], 50.0).stats();
        assert_eq!(s.samples, 0);
        assert_eq!(s.mean_hashrate, 0.0);
        assert!(s.mean_power_w.is_none());
    }

    #[test]
    fn test_stats_single_sample_has_zero_stddev() {
        let s = window(&[500.0], 50.0).stats();
        assert_eq!(s.stddev, 0.0);
        assert_eq!(s.cv, 0.0);
    }

    #[test]
    fn test_stats_use_sample_stddev() {
        // mean 501.25, sample variance = 26.75 / 3
        let s = window(&[500.0, 505.0, 498.0, 502.0], 55.0).stats();
        assert!((s.mean_hashrate - 501.25).abs() < 1e-9);
        assert!((s.stddev - (26.75f64 / 3.0).sqrt()).abs() < 1e-9);
        assert!((s.cv - s.stddev / s.mean_hashrate).abs() < 1e-12);
        assert_eq!(s.max_temp_c, 55.0);
    }

    #[test]
    fn test_stats_zero_mean_has_infinite_cv() {
        let s = window(&[0.0, 0.0], 50.0).stats();
        assert!(s.cv.is_infinite());
    }

    #[test]
    fn test_stats_mean_power_ignores_missing_readings() {
        let point = OperatingPoint::new(600, 1100);
        let w = SampleWindow::from_samples(
            point,
            vec![
                TelemetrySample::new(500.0, 50.0).with_power(12.0),
                TelemetrySample::new(500.0, 50.0),
                TelemetrySample::new(500.0, 50.0).with_power(14.0),
            ],
        );
        assert_eq!(w.stats().mean_power_w, Some(13.0));
    }

    #[test]
    fn test_verdict_kind_display_matches_variant() {
        assert_eq!(VerdictKind::Stable.to_string(), "Stable");
        assert_eq!(VerdictKind::ThermalAbort.to_string(), "ThermalAbort");
        assert_eq!(VerdictKind::InconclusiveRetry.to_string(), "InconclusiveRetry");
    }
}
