//! # Sweep
//!
//! The tuning pipeline for one miner:
//!
//! ```text
//! SweepController ──apply──▶ DeviceClient
//!       │                        ▲
//!       ▼                        │ read
//! SampleCollector ──each sample──▶ SafetyGovernor
//!       │
//!       ▼
//! StabilityEvaluator ──Verdict──▶ ResultSink
//! ```
//!
//! Points are evaluated strictly one at a time. The controller owns all
//! mutable sweep state; every other stage is a pure function of its inputs
//! or a thin async wrapper around the device.

pub mod collector;
pub mod config;
pub mod controller;
pub mod evaluator;
pub mod governor;
pub mod metric;
pub mod model;
pub mod stop;

pub use collector::{Collection, CollectionEnd, PointPhase, SampleCollector};
pub use config::SweepConfig;
pub use controller::{run_sweep, SweepController};
pub use evaluator::{InsufficientData, StabilityEvaluator, DEFAULT_MIN_SAMPLES};
pub use governor::{GovernorDecision, SafetyGovernor};
pub use metric::{EfficiencyMetric, Hashrate, HashratePerMillivolt, HashratePerWatt, MetricKind};
pub use model::{OperatingPoint, SampleWindow, TelemetrySample, Verdict, VerdictKind, WindowStats};
pub use stop::{StopSignal, Wake};
