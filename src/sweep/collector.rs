//! # Stage: Sample Collector
//!
//! ## Responsibility
//! Gather one [`SampleWindow`] for an operating point the device has already
//! accepted: wait out the settle delay, then poll telemetry at a fixed
//! interval until the window is full. Every sample passes through the
//! [`SafetyGovernor`] before it is appended.
//!
//! ## Guarantees
//! - The governor sees each sample before the next poll is issued.
//! - A window cut short (governor abort, interrupt, transport failure) is
//!   returned with whatever samples were gathered, never discarded.
//!
//! ## NOT Responsible For
//! - Applying the configuration (the controller does, then calls `collect`)
//! - Classifying the window (evaluator)

use std::time::Duration;

use tracing::{debug, warn};

use super::config::SweepConfig;
use super::governor::{GovernorDecision, SafetyGovernor};
use super::model::{OperatingPoint, SampleWindow};
use super::stop::{StopSignal, Wake};
use crate::device::{DeviceClient, DeviceError};

/// Where a point's evaluation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointPhase {
    Settling,
    Sampling,
}

impl std::fmt::Display for PointPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointPhase::Settling => write!(f, "settling"),
            PointPhase::Sampling => write!(f, "sampling"),
        }
    }
}

/// Why collection stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionEnd {
    /// The window holds the requested number of samples.
    Complete,
    /// Governor judged this point unusable; remaining samples skipped.
    PointAborted { reason: String },
    /// Governor hit a device-level safety condition; the sweep must halt.
    SweepAborted { reason: String },
    /// The stop signal fired during `phase`.
    Interrupted { phase: PointPhase },
    /// A telemetry read failed.
    Transport(DeviceError),
}

/// A (possibly partial) window plus the reason collection ended.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub window: SampleWindow,
    pub end: CollectionEnd,
}

/// Settle-then-poll sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleCollector {
    window_size: usize,
    interval: Duration,
    settle_delay: Duration,
}

impl SampleCollector {
    pub fn new(window_size: usize, interval: Duration, settle_delay: Duration) -> Self {
        Self { window_size, interval, settle_delay }
    }

    pub fn from_config(config: &SweepConfig) -> Self {
        Self::new(config.window_size, config.sample_interval, config.settle_delay)
    }

    /// Settle, then sample a full window at `point`.
    pub async fn collect<D: DeviceClient>(
        &self,
        device: &D,
        governor: &SafetyGovernor,
        stop: &StopSignal,
        point: OperatingPoint,
    ) -> Collection {
        debug!(%point, settle_s = self.settle_delay.as_secs_f64(), "settling");
        if stop.sleep(self.settle_delay).await == Wake::Stopped {
            return Collection {
                window: SampleWindow::new(point),
                end: CollectionEnd::Interrupted { phase: PointPhase::Settling },
            };
        }
        self.sample(device, governor, stop, point).await
    }

    /// Sample a fresh window without settling. Used to re-measure a point the
    /// device is already running at.
    pub async fn resample<D: DeviceClient>(
        &self,
        device: &D,
        governor: &SafetyGovernor,
        stop: &StopSignal,
        point: OperatingPoint,
    ) -> Collection {
        self.sample(device, governor, stop, point).await
    }

    async fn sample<D: DeviceClient>(
        &self,
        device: &D,
        governor: &SafetyGovernor,
        stop: &StopSignal,
        point: OperatingPoint,
    ) -> Collection {
        let mut window = SampleWindow::with_capacity(point, self.window_size);

        for i in 0..self.window_size {
            if i > 0 && stop.sleep(self.interval).await == Wake::Stopped {
                return Collection {
                    window,
                    end: CollectionEnd::Interrupted { phase: PointPhase::Sampling },
                };
            }
            if stop.is_triggered() {
                return Collection {
                    window,
                    end: CollectionEnd::Interrupted { phase: PointPhase::Sampling },
                };
            }

            let sample = match device.read_telemetry().await {
                Ok(s) => s,
                Err(e) => {
                    warn!(%point, error = %e, sample = i + 1, "telemetry read failed");
                    return Collection { window, end: CollectionEnd::Transport(e) };
                }
            };

            debug!(
                %point,
                sample = i + 1,
                of = self.window_size,
                hashrate = sample.hashrate,
                temp_c = sample.chip_temp_c,
                "sample"
            );

            let decision = governor.check(&sample);
            window.push(sample);

            match decision {
                GovernorDecision::Continue => {}
                GovernorDecision::AbortPoint { reason } => {
                    return Collection { window, end: CollectionEnd::PointAborted { reason } };
                }
                GovernorDecision::AbortSweep { reason } => {
                    return Collection { window, end: CollectionEnd::SweepAborted { reason } };
                }
            }
        }

        Collection { window, end: CollectionEnd::Complete }
    }
}
