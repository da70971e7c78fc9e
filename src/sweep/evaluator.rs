//! # Stage: Stability Evaluator
//!
//! ## Responsibility
//! Classify a completed [`SampleWindow`] as Stable, Unstable or ThermalAbort
//! from the hashrate coefficient of variation and the peak chip temperature.
//!
//! ## Classification order
//! 1. Empty window → insufficient data.
//! 2. Any sample at or above the temperature limit → ThermalAbort, whatever
//!    the hashrate variation.
//! 3. Fewer than `min_samples` → insufficient data.
//! 4. `cv <= cv_threshold` → Stable. The bound is inclusive so a window
//!    exactly on the threshold always classifies the same way.
//! 5. Otherwise → Unstable.
//!
//! With a hashrate tolerance configured, step 4 additionally demotes a stable
//! window whose mean falls below `tolerance * baseline` to Unstable: a steady
//! but reduced hashrate is how an undervolted ASIC usually shows itself.
//!
//! ## NOT Responsible For
//! - Stopping collection early (that is the [`super::governor::SafetyGovernor`])
//! - Deciding what to try next (that is the controller)

use super::config::SweepConfig;
use super::model::{SampleWindow, Verdict, VerdictKind, WindowStats};

/// Default minimum samples for a conclusive window.
pub const DEFAULT_MIN_SAMPLES: usize = 2;

/// The window did not hold enough samples to judge stability.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("insufficient data: {collected} sample(s) collected, {required} required")]
pub struct InsufficientData {
    pub collected: usize,
    pub required: usize,
    pub stats: WindowStats,
}

/// Statistical stability classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityEvaluator {
    cv_threshold: f64,
    temp_limit_c: f64,
    min_samples: usize,
    hashrate_tolerance: Option<f64>,
}

impl StabilityEvaluator {
    pub fn new(cv_threshold: f64, temp_limit_c: f64) -> Self {
        Self {
            cv_threshold,
            temp_limit_c,
            min_samples: DEFAULT_MIN_SAMPLES,
            hashrate_tolerance: None,
        }
    }

    pub fn from_config(config: &SweepConfig) -> Self {
        Self::new(config.cv_threshold, config.temp_limit_c)
            .with_min_samples(config.min_samples)
            .with_hashrate_tolerance(config.hashrate_tolerance)
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.max(1);
        self
    }

    pub fn with_hashrate_tolerance(mut self, tolerance: Option<f64>) -> Self {
        self.hashrate_tolerance = tolerance;
        self
    }

    /// Classify `window`, folding insufficient data into an
    /// [`VerdictKind::InconclusiveRetry`] verdict. Never panics, including on
    /// an empty window.
    pub fn evaluate(&self, window: &SampleWindow) -> Verdict {
        self.evaluate_against(window, None)
    }

    /// Like [`evaluate`](Self::evaluate), with the best stable mean hashrate
    /// seen so far as the hashrate-drop baseline.
    pub fn evaluate_against(&self, window: &SampleWindow, baseline: Option<f64>) -> Verdict {
        match self.classify(window, baseline) {
            Ok(v) => v,
            Err(e) => Verdict::new(
                VerdictKind::InconclusiveRetry,
                window.point(),
                e.stats,
                e.to_string(),
            ),
        }
    }

    /// Classify `window`, surfacing a short window as [`InsufficientData`].
    pub fn classify(
        &self,
        window: &SampleWindow,
        baseline: Option<f64>,
    ) -> Result<Verdict, InsufficientData> {
        let stats = window.stats();
        let point = window.point();

        if window.is_empty() {
            return Err(InsufficientData { collected: 0, required: self.min_samples, stats });
        }

        if let Some(hot) = window.samples().iter().find(|s| s.chip_temp_c >= self.temp_limit_c) {
            return Ok(Verdict::new(
                VerdictKind::ThermalAbort,
                point,
                stats,
                format!(
                    "chip temperature {:.1}°C reached limit {:.1}°C",
                    hot.chip_temp_c, self.temp_limit_c
                ),
            ));
        }

        if window.len() < self.min_samples {
            return Err(InsufficientData {
                collected: window.len(),
                required: self.min_samples,
                stats,
            });
        }

        if stats.cv <= self.cv_threshold {
            if let (Some(tolerance), Some(best)) = (self.hashrate_tolerance, baseline) {
                let floor = best * tolerance;
                if stats.mean_hashrate < floor {
                    return Ok(Verdict::new(
                        VerdictKind::Unstable,
                        point,
                        stats,
                        format!(
                            "hashrate drop: mean {:.2} below {:.0}% of best {:.2}",
                            stats.mean_hashrate,
                            tolerance * 100.0,
                            best
                        ),
                    ));
                }
            }
            return Ok(Verdict::new(
                VerdictKind::Stable,
                point,
                stats,
                format!("cv {:.4} <= threshold {:.4}", stats.cv, self.cv_threshold),
            ));
        }

        Ok(Verdict::new(
            VerdictKind::Unstable,
            point,
            stats,
            format!("cv {:.4} > threshold {:.4}", stats.cv, self.cv_threshold),
        ))
    }

    /// Verdict for a window cut short because the device stopped hashing.
    pub fn stalled(&self, window: &SampleWindow, reason: &str) -> Verdict {
        Verdict::new(VerdictKind::Unstable, window.point(), window.stats(), reason)
    }
}
