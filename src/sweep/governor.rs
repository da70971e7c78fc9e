//! # Stage: Safety Governor
//!
//! ## Responsibility
//! Per-sample, stateless safety check run synchronously inside the collection
//! loop. A single over-temperature reading aborts the whole sweep at once:
//! thermal damage risk is immediate, unlike hashrate noise which needs a
//! window to average over.
//!
//! ## Decisions
//! - `chip_temp_c >= temp_limit_c`, or an unreadable (non-finite) temperature
//!   → [`GovernorDecision::AbortSweep`]
//! - hashrate not positive or non-finite → [`GovernorDecision::AbortPoint`];
//!   the ASIC has stopped hashing and the rest of the window is wasted time
//! - otherwise → [`GovernorDecision::Continue`]
//!
//! ## NOT Responsible For
//! - Statistical classification of the window (that is the evaluator)

use super::config::SweepConfig;
use super::model::TelemetrySample;

/// Outcome of checking one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum GovernorDecision {
    Continue,
    AbortPoint { reason: String },
    AbortSweep { reason: String },
}

impl GovernorDecision {
    pub fn is_continue(&self) -> bool {
        matches!(self, GovernorDecision::Continue)
    }
}

/// Hard real-time cutoff checked on every sample as it arrives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyGovernor {
    temp_limit_c: f64,
}

impl SafetyGovernor {
    pub fn new(temp_limit_c: f64) -> Self {
        Self { temp_limit_c }
    }

    pub fn from_config(config: &SweepConfig) -> Self {
        Self::new(config.temp_limit_c)
    }

    pub fn check(&self, sample: &TelemetrySample) -> GovernorDecision {
        let temp = sample.chip_temp_c;
        if !temp.is_finite() {
            return GovernorDecision::AbortSweep {
                reason: format!("chip temperature unreadable ({temp})"),
            };
        }
        if temp >= self.temp_limit_c {
            return GovernorDecision::AbortSweep {
                reason: format!(
                    "chip temperature {:.1}°C reached limit {:.1}°C",
                    temp, self.temp_limit_c
                ),
            };
        }
        if !(sample.hashrate.is_finite() && sample.hashrate > 0.0) {
            return GovernorDecision::AbortPoint {
                reason: format!("hashing stalled (hashrate {})", sample.hashrate),
            };
        }
        GovernorDecision::Continue
    }
}
