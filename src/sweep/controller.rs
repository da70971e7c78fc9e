//! # Stage: Sweep Controller
//!
//! ## Responsibility
//! Walk the (frequency, voltage) grid, drive each candidate point through
//! apply → settle → sample → evaluate, record exactly one terminal verdict
//! per visited point, and track the best stable point.
//!
//! ## Traversal
//! For each frequency (ascending), start at the lowest voltage and raise it
//! one step at a time only while the point is Unstable:
//! - Stable → record, move to the next frequency (lowest safe voltage found).
//! - Unstable → optionally re-measure the same voltage, then escalate.
//! - Voltage exhausted → the frequency is recorded as failed, sweep continues.
//! - ThermalAbort → the whole sweep halts immediately.
//! - Transport failures → the point is retried; `transport_failure_limit`
//!   consecutive failures fail the frequency.
//! - Insufficient data → retried `insufficient_data_retries` times, then the
//!   frequency is failed.
//!
//! ## Guarantees
//! - Never commands a point outside the configured bounds.
//! - Strictly sequential: one point is fully evaluated before the next.
//! - Best is only replaced by a strictly better score, so it never regresses.
//! - An interrupt is observed at every suspension point; an in-flight point
//!   is still recorded before the controller returns. A point the device
//!   never accepted is not recorded.
//! - A sink failure ends the sweep with [`SweepEnd::SinkFailed`]; the report
//!   still carries the best point found before it.
//!
//! ## NOT Responsible For
//! - Transport details (device module)
//! - Statistical classification (evaluator)
//! - Signal handling (the CLI triggers the [`StopSignal`])

use chrono::Utc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::collector::{Collection, CollectionEnd, PointPhase, SampleCollector};
use super::config::SweepConfig;
use super::evaluator::StabilityEvaluator;
use super::governor::SafetyGovernor;
use super::metric::EfficiencyMetric;
use super::model::{OperatingPoint, SampleWindow, Verdict, VerdictKind, WindowStats};
use super::stop::StopSignal;
use crate::device::{DeviceClient, DeviceError};
use crate::error::{SinkError, TunerError};
use crate::report::{BestPoint, FailedFrequency, SweepEnd, SweepReport};
use crate::sink::ResultSink;

// ---------------------------------------------------------------------------
// Internal outcomes
// ---------------------------------------------------------------------------

/// Why a point ended inconclusive; decides what happens to its frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inconclusive {
    Transport,
    InsufficientData,
    Interrupted,
}

/// Terminal result of one point.
#[derive(Debug)]
struct PointOutcome {
    verdict: Verdict,
    inconclusive: Option<Inconclusive>,
}

impl PointOutcome {
    fn conclusive(verdict: Verdict) -> Self {
        Self { verdict, inconclusive: None }
    }

    fn inconclusive(verdict: Verdict, cause: Inconclusive) -> Self {
        Self { verdict, inconclusive: Some(cause) }
    }
}

/// Result of one frequency step.
#[derive(Debug, Clone, PartialEq)]
enum FrequencyOutcome {
    Stable { core_voltage_mv: u32 },
    Failed { reason: String },
    ThermalAbort { reason: String },
    Interrupted,
    SinkFailed { reason: String },
}

/// Mutable state owned by the controller for the duration of one sweep.
struct SweepState {
    current: Option<OperatingPoint>,
    best: Option<BestPoint>,
    /// Highest stable mean hashrate, the baseline for hashrate-drop checks.
    best_mean_hashrate: Option<f64>,
    /// Voltage carried into the next frequency when carry-over is enabled.
    carry_mv: Option<u32>,
    verdicts: Vec<Verdict>,
    failed: Vec<FailedFrequency>,
}

impl SweepState {
    fn new() -> Self {
        Self {
            current: None,
            best: None,
            best_mean_hashrate: None,
            carry_mv: None,
            verdicts: Vec::new(),
            failed: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// SweepController
// ---------------------------------------------------------------------------

/// Drives one sweep against a device, writing verdicts to a sink.
///
/// The controller borrows the device exclusively for the sweep; nothing else
/// may talk to it while `run_sweep` is in progress.
pub struct SweepController<'a, D, S> {
    device: &'a D,
    sink: &'a mut S,
    stop: StopSignal,
    metric: Option<Box<dyn EfficiencyMetric>>,
    on_verdict: Option<Box<dyn FnMut(&Verdict) + Send + 'a>>,
}

impl<'a, D: DeviceClient, S: ResultSink> SweepController<'a, D, S> {
    pub fn new(device: &'a D, sink: &'a mut S, stop: StopSignal) -> Self {
        Self { device, sink, stop, metric: None, on_verdict: None }
    }

    /// Rank stable points with a custom metric instead of `config.metric`.
    pub fn with_metric(mut self, metric: Box<dyn EfficiencyMetric>) -> Self {
        self.metric = Some(metric);
        self
    }

    /// Callback invoked after each verdict is recorded (progress output).
    pub fn on_verdict(mut self, f: impl FnMut(&Verdict) + Send + 'a) -> Self {
        self.on_verdict = Some(Box::new(f));
        self
    }

    /// Run the full sweep described by `config`.
    ///
    /// # Errors
    /// [`TunerError::Config`] when `config` is invalid; nothing is commanded.
    ///
    /// Device and sink failures never surface here. Device failures become
    /// verdicts; a sink failure ends the sweep with [`SweepEnd::SinkFailed`].
    pub async fn run_sweep(mut self, config: &SweepConfig) -> Result<SweepReport, TunerError> {
        config.validate()?;

        let run_id = Uuid::new_v4();
        let span = info_span!("sweep", %run_id);
        Ok(self.sweep(config, run_id).instrument(span).await)
    }

    async fn sweep(&mut self, config: &SweepConfig, run_id: Uuid) -> SweepReport {
        let started_at = Utc::now();
        let metric = self.metric.take().unwrap_or_else(|| config.metric.build());
        let evaluator = StabilityEvaluator::from_config(config);
        let governor = SafetyGovernor::from_config(config);
        let collector = SampleCollector::from_config(config);

        info!(
            freq_start = config.freq_start_mhz,
            freq_end = config.freq_end_mhz,
            cv_start = config.cv_start_mv,
            cv_max = config.cv_max_mv,
            planned_points = config.planned_points(),
            metric = metric.name(),
            "sweep starting"
        );

        let mut state = SweepState::new();
        let mut end = SweepEnd::Completed;

        for freq in config.frequencies() {
            if self.stop.is_triggered() {
                end = SweepEnd::Interrupted;
                break;
            }

            let start_mv = match (config.carry_voltage, state.carry_mv) {
                (true, Some(mv)) => mv,
                _ => config.cv_start_mv,
            };

            let outcome = self
                .sweep_frequency(config, freq, start_mv, &evaluator, &governor, &collector, metric.as_ref(), &mut state)
                .await;

            match outcome {
                FrequencyOutcome::Stable { core_voltage_mv } => {
                    state.carry_mv = Some(core_voltage_mv);
                }
                FrequencyOutcome::Failed { reason } => {
                    warn!(freq_mhz = freq, %reason, "frequency step failed");
                    state.failed.push(FailedFrequency { frequency_mhz: freq, reason });
                }
                FrequencyOutcome::ThermalAbort { reason } => {
                    error!(freq_mhz = freq, %reason, "thermal abort, halting sweep");
                    end = SweepEnd::ThermalAbort { reason };
                    break;
                }
                FrequencyOutcome::Interrupted => {
                    end = SweepEnd::Interrupted;
                    break;
                }
                FrequencyOutcome::SinkFailed { reason } => {
                    end = SweepEnd::SinkFailed { reason };
                    break;
                }
            }
        }

        if let Err(e) = self.sink.flush() {
            error!(error = %e, "failed to flush results");
            if matches!(end, SweepEnd::Completed | SweepEnd::Interrupted) {
                end = SweepEnd::SinkFailed { reason: e.to_string() };
            }
        }

        match &state.best {
            Some(best) => info!(best = %best.point, score = best.score, end = %end, "sweep finished"),
            None => info!(end = %end, "sweep finished without a stable point"),
        }

        SweepReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            metric: metric.name().to_string(),
            best: state.best,
            verdicts: state.verdicts,
            failed_frequencies: state.failed,
            end,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn sweep_frequency(
        &mut self,
        config: &SweepConfig,
        freq: u32,
        start_mv: u32,
        evaluator: &StabilityEvaluator,
        governor: &SafetyGovernor,
        collector: &SampleCollector,
        metric: &dyn EfficiencyMetric,
        state: &mut SweepState,
    ) -> FrequencyOutcome {
        for mv in config.voltages_from(start_mv) {
            if self.stop.is_triggered() {
                return FrequencyOutcome::Interrupted;
            }

            let point = OperatingPoint::new(freq, mv);
            debug_assert!(config.contains(point));
            state.current = Some(point);

            let Some(outcome) = self
                .evaluate_point(config, point, evaluator, governor, collector, state.best_mean_hashrate)
                .await
            else {
                info!(%point, "stopped before the point was applied");
                return FrequencyOutcome::Interrupted;
            };
            if let Err(e) = self.record(&outcome.verdict, state) {
                error!(%point, error = %e, "failed to record verdict, halting sweep");
                return FrequencyOutcome::SinkFailed { reason: format!("recording {point}: {e}") };
            }

            match (outcome.verdict.kind, outcome.inconclusive) {
                (VerdictKind::Stable, _) => {
                    self.update_best(&outcome.verdict, metric, state);
                    return FrequencyOutcome::Stable { core_voltage_mv: mv };
                }
                (VerdictKind::Unstable, _) => continue,
                (VerdictKind::ThermalAbort, _) => {
                    return FrequencyOutcome::ThermalAbort { reason: outcome.verdict.reason };
                }
                (VerdictKind::InconclusiveRetry, Some(Inconclusive::Interrupted)) => {
                    return FrequencyOutcome::Interrupted;
                }
                (VerdictKind::InconclusiveRetry, _) => {
                    return FrequencyOutcome::Failed {
                        reason: format!("{point}: {}", outcome.verdict.reason),
                    };
                }
            }
        }

        FrequencyOutcome::Failed {
            reason: format!("no stable voltage up to {} mV", config.cv_max_mv),
        }
    }

    /// Apply, settle, sample and classify one point until it reaches a
    /// terminal verdict.
    ///
    /// Returns `None` when the stop signal fired before the device accepted
    /// the point, so there is nothing to record.
    async fn evaluate_point(
        &self,
        config: &SweepConfig,
        point: OperatingPoint,
        evaluator: &StabilityEvaluator,
        governor: &SafetyGovernor,
        collector: &SampleCollector,
        baseline: Option<f64>,
    ) -> Option<PointOutcome> {
        let mut transport_failures: u32 = 0;
        let mut insufficient: u32 = 0;
        let mut confirmations: u32 = 0;
        let mut needs_apply = true;
        let mut applied = false;

        loop {
            if self.stop.is_triggered() {
                if !applied {
                    return None;
                }
                let idle = Collection {
                    window: SampleWindow::new(point),
                    end: CollectionEnd::Interrupted { phase: PointPhase::Settling },
                };
                return Some(interrupted(point, &idle));
            }

            let collection = if needs_apply {
                info!(%point, "applying");
                if let Err(e) = self.device.apply_config(point).await {
                    transport_failures += 1;
                    if let Some(outcome) = transport_failed(config, point, &e, transport_failures, None) {
                        return Some(outcome);
                    }
                    continue;
                }
                needs_apply = false;
                applied = true;
                collector.collect(self.device, governor, &self.stop, point).await
            } else {
                collector.resample(self.device, governor, &self.stop, point).await
            };

            match &collection.end {
                CollectionEnd::Complete => {}
                CollectionEnd::Transport(e) => {
                    transport_failures += 1;
                    if let Some(outcome) =
                        transport_failed(config, point, e, transport_failures, Some(&collection))
                    {
                        return Some(outcome);
                    }
                    needs_apply = true;
                    continue;
                }
                CollectionEnd::Interrupted { .. } => return Some(interrupted(point, &collection)),
                CollectionEnd::PointAborted { reason } => {
                    warn!(%point, %reason, "point aborted by safety governor");
                    return Some(PointOutcome::conclusive(evaluator.stalled(&collection.window, reason)));
                }
                CollectionEnd::SweepAborted { reason } => {
                    let mut verdict = evaluator.evaluate(&collection.window);
                    if verdict.kind != VerdictKind::ThermalAbort {
                        verdict.kind = VerdictKind::ThermalAbort;
                        verdict.reason = reason.clone();
                    }
                    return Some(PointOutcome::conclusive(verdict));
                }
            }

            transport_failures = 0;

            match evaluator.classify(&collection.window, baseline) {
                Err(e) => {
                    insufficient += 1;
                    if insufficient > config.insufficient_data_retries {
                        let verdict = Verdict::new(
                            VerdictKind::InconclusiveRetry,
                            point,
                            e.stats.clone(),
                            e.to_string(),
                        );
                        return Some(PointOutcome::inconclusive(verdict, Inconclusive::InsufficientData));
                    }
                    warn!(%point, error = %e, "retrying point");
                    needs_apply = true;
                }
                Ok(v) if v.kind == VerdictKind::Unstable && confirmations < config.unstable_confirmations => {
                    confirmations += 1;
                    info!(
                        %point,
                        cv = v.stats.cv,
                        confirmation = confirmations,
                        of = config.unstable_confirmations,
                        "unstable, re-measuring before escalating voltage"
                    );
                }
                Ok(v) => return Some(PointOutcome::conclusive(v)),
            }
        }
    }

    fn record(&mut self, verdict: &Verdict, state: &mut SweepState) -> Result<(), SinkError> {
        info!(
            freq_mhz = verdict.point.frequency_mhz(),
            core_mv = verdict.point.core_voltage_mv(),
            verdict = %verdict.kind,
            mean = verdict.stats.mean_hashrate,
            cv = verdict.stats.cv,
            max_temp = verdict.stats.max_temp_c,
            reason = %verdict.reason,
            "verdict"
        );
        self.sink.record(verdict)?;
        state.verdicts.push(verdict.clone());
        if let Some(f) = self.on_verdict.as_mut() {
            f(verdict);
        }
        Ok(())
    }

    fn update_best(&self, verdict: &Verdict, metric: &dyn EfficiencyMetric, state: &mut SweepState) {
        state.best_mean_hashrate = Some(
            state
                .best_mean_hashrate
                .map_or(verdict.stats.mean_hashrate, |b| b.max(verdict.stats.mean_hashrate)),
        );

        let Some(score) = metric.score(&verdict.point, &verdict.stats) else {
            return;
        };
        let better = state.best.as_ref().map_or(true, |b| score > b.score);
        if better {
            info!(point = %verdict.point, score, metric = metric.name(), "new best stable point");
            state.best = Some(BestPoint {
                point: verdict.point,
                stats: verdict.stats,
                score,
                metric: metric.name().to_string(),
            });
        }
    }
}

fn interrupted(point: OperatingPoint, collection: &Collection) -> PointOutcome {
    let phase = match &collection.end {
        CollectionEnd::Interrupted { phase } => *phase,
        _ => PointPhase::Sampling,
    };
    warn!(%point, %phase, samples = collection.window.len(), "interrupted");
    let verdict = Verdict::new(
        VerdictKind::InconclusiveRetry,
        point,
        collection.window.stats(),
        format!("interrupted while {phase}"),
    );
    PointOutcome::inconclusive(verdict, Inconclusive::Interrupted)
}

/// Count a transport failure; returns the terminal outcome once the limit is hit.
fn transport_failed(
    config: &SweepConfig,
    point: OperatingPoint,
    error: &DeviceError,
    failures: u32,
    partial: Option<&Collection>,
) -> Option<PointOutcome> {
    if failures < config.transport_failure_limit {
        warn!(%point, %error, failures, limit = config.transport_failure_limit, "transport error, retrying point");
        return None;
    }
    error!(%point, %error, failures, "transport failing repeatedly, abandoning frequency");
    let stats = partial.map(|c| c.window.stats()).unwrap_or_else(WindowStats::empty);
    let verdict = Verdict::new(
        VerdictKind::InconclusiveRetry,
        point,
        stats,
        format!("{failures} consecutive transport errors: {error}"),
    );
    Some(PointOutcome::inconclusive(verdict, Inconclusive::Transport))
}

/// Convenience wrapper: run a sweep with the metric named in `config`.
pub async fn run_sweep<D: DeviceClient, S: ResultSink>(
    device: &D,
    sink: &mut S,
    config: &SweepConfig,
    stop: StopSignal,
) -> Result<SweepReport, TunerError> {
    SweepController::new(device, sink, stop).run_sweep(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::sink::MemorySink;
    use crate::sweep::config::tests::sample_config;
    use crate::sweep::model::TelemetrySample;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Device that replays scripted reads and remembers every applied point.
    /// Once the script runs dry it reports a steady 500 GH/s at 50°C.
    #[derive(Default)]
    struct Rig {
        reads: Mutex<VecDeque<Result<TelemetrySample, DeviceError>>>,
        applied: Mutex<Vec<OperatingPoint>>,
        /// Fired as soon as a point is accepted.
        stop_on_apply: Option<StopSignal>,
    }

    impl Rig {
        fn scripted(reads: Vec<Result<TelemetrySample, DeviceError>>) -> Self {
            Self { reads: Mutex::new(reads.into()), ..Self::default() }
        }

        fn applied(&self) -> Vec<OperatingPoint> {
            self.applied.lock().unwrap().clone()
        }
    }

    impl DeviceClient for Rig {
        async fn apply_config(&self, point: OperatingPoint) -> Result<(), DeviceError> {
            self.applied.lock().unwrap().push(point);
            if let Some(stop) = &self.stop_on_apply {
                stop.trigger();
            }
            Ok(())
        }

        async fn read_telemetry(&self) -> Result<TelemetrySample, DeviceError> {
            self.reads
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(TelemetrySample::new(500.0, 50.0)))
        }
    }

    fn window(hashrates: &[f64]) -> Vec<Result<TelemetrySample, DeviceError>> {
        hashrates.iter().map(|&h| Ok(TelemetrySample::new(h, 50.0))).collect()
    }

    const NOISY: [f64; 4] = [500.0, 700.0, 480.0, 650.0];

    fn p(f: u32, v: u32) -> OperatingPoint {
        OperatingPoint::new(f, v)
    }

    async fn sweep(rig: &Rig, config: &SweepConfig) -> (SweepReport, MemorySink) {
        let mut sink = MemorySink::new();
        let report = run_sweep(rig, &mut sink, config, StopSignal::new()).await.unwrap();
        (report, sink)
    }

    /// Evaluate a single point of `sample_config()` with the given collector.
    async fn evaluate(rig: &Rig, stop: StopSignal, collector: &SampleCollector) -> Option<PointOutcome> {
        let config = sample_config();
        let mut sink = MemorySink::new();
        let controller = SweepController::new(rig, &mut sink, stop);
        controller
            .evaluate_point(
                &config,
                p(600, 1100),
                &StabilityEvaluator::from_config(&config),
                &SafetyGovernor::from_config(&config),
                collector,
                None,
            )
            .await
    }

    /// Sink whose writes start failing like a full disk.
    #[derive(Default)]
    struct DiskFullSink {
        inner: MemorySink,
        calls: usize,
        fail_on_record: Option<usize>,
        fail_flush: bool,
    }

    impl ResultSink for DiskFullSink {
        fn record(&mut self, verdict: &Verdict) -> Result<(), SinkError> {
            self.calls += 1;
            if self.fail_on_record.is_some_and(|n| self.calls >= n) {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full").into());
            }
            self.inner.record(verdict)
        }

        fn flush(&mut self) -> Result<(), SinkError> {
            if self.fail_flush {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full").into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_steady_device_is_stable_at_lowest_voltage_everywhere() {
        let rig = Rig::default();
        let (report, sink) = sweep(&rig, &sample_config()).await;
        assert_eq!(rig.applied(), vec![p(600, 1100), p(610, 1100), p(620, 1100)]);
        assert_eq!(report.count(VerdictKind::Stable), 3);
        assert_eq!(report.end, SweepEnd::Completed);
        assert_eq!(sink.records.len(), 3);
        // equal scores never displace the first best
        assert_eq!(report.best.unwrap().point, p(600, 1100));
    }

    #[tokio::test]
    async fn test_unstable_point_escalates_voltage_at_same_frequency() {
        let rig = Rig::scripted(window(&NOISY));
        let (report, _) = sweep(&rig, &sample_config()).await;
        assert_eq!(
            report.visited(),
            vec![p(600, 1100), p(600, 1110), p(610, 1100), p(620, 1100)]
        );
        assert_eq!(report.verdicts[0].kind, VerdictKind::Unstable);
        assert_eq!(report.verdicts[1].kind, VerdictKind::Stable);
    }

    #[tokio::test]
    async fn test_confirmation_remeasures_without_reapplying() {
        let rig = Rig::scripted(window(&NOISY));
        let config = SweepConfig { unstable_confirmations: 1, ..sample_config() };
        let (report, sink) = sweep(&rig, &config).await;
        assert_eq!(report.verdicts[0].point, p(600, 1100));
        assert_eq!(report.verdicts[0].kind, VerdictKind::Stable);
        assert_eq!(rig.applied().iter().filter(|&&x| x == p(600, 1100)).count(), 1);
        assert_eq!(sink.records.len(), 3, "one record per point, retries not recorded");
    }

    #[tokio::test]
    async fn test_exhausted_voltage_fails_frequency_and_moves_on() {
        let mut reads = window(&NOISY);
        reads.extend(window(&NOISY));
        reads.extend(window(&NOISY));
        let rig = Rig::scripted(reads);
        let (report, _) = sweep(&rig, &sample_config()).await;
        assert_eq!(report.failed_frequencies.len(), 1);
        assert_eq!(report.failed_frequencies[0].frequency_mhz, 600);
        assert_eq!(report.count(VerdictKind::Unstable), 3);
        assert_eq!(report.best.unwrap().point, p(610, 1100));
    }

    #[tokio::test]
    async fn test_repeated_transport_errors_fail_the_frequency() {
        let err = || Err(DeviceError::Timeout { url: "http://rig/api/system/info".into() });
        let rig = Rig::scripted(vec![err(), err(), err()]);
        let (report, sink) = sweep(&rig, &sample_config()).await;

        assert_eq!(report.verdicts[0].kind, VerdictKind::InconclusiveRetry);
        assert!(report.verdicts[0].reason.contains("3 consecutive transport errors"));
        assert_eq!(report.failed_frequencies[0].frequency_mhz, 600);
        assert_eq!(rig.applied().iter().filter(|&&x| x == p(600, 1100)).count(), 3);
        assert_eq!(sink.records.len(), 3);
        assert_eq!(report.end, SweepEnd::Completed);
    }

    #[tokio::test]
    async fn test_transient_transport_error_is_retried() {
        let rig = Rig::scripted(vec![Err(DeviceError::Http { status: 502, url: "http://rig".into() })]);
        let (report, _) = sweep(&rig, &sample_config()).await;
        assert_eq!(report.verdicts[0].kind, VerdictKind::Stable);
        assert!(report.failed_frequencies.is_empty());
    }

    #[tokio::test]
    async fn test_overheating_halts_the_sweep() {
        let rig = Rig::scripted(vec![
            Ok(TelemetrySample::new(500.0, 55.0)),
            Ok(TelemetrySample::new(500.0, 65.0)),
        ]);
        let (report, sink) = sweep(&rig, &sample_config()).await;
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(report.verdicts[0].kind, VerdictKind::ThermalAbort);
        assert_eq!(report.verdicts[0].stats.samples, 2);
        assert!(matches!(report.end, SweepEnd::ThermalAbort { .. }));
        assert_eq!(rig.applied(), vec![p(600, 1100)]);
        assert_eq!(sink.records.len(), 1);
    }

    #[tokio::test]
    async fn test_stalled_hashing_counts_as_unstable() {
        let rig = Rig::scripted(window(&[480.0, 0.0]));
        let (report, _) = sweep(&rig, &sample_config()).await;
        assert_eq!(report.verdicts[0].kind, VerdictKind::Unstable);
        assert_eq!(report.verdicts[1].point, p(600, 1110));
    }

    #[tokio::test]
    async fn test_carry_voltage_starts_next_frequency_at_last_stable_voltage() {
        let rig = Rig::scripted(window(&NOISY));
        let config = SweepConfig { carry_voltage: true, ..sample_config() };
        let (report, _) = sweep(&rig, &config).await;
        assert_eq!(
            report.visited(),
            vec![p(600, 1100), p(600, 1110), p(610, 1110), p(620, 1110)]
        );
    }

    #[tokio::test]
    async fn test_hashrate_drop_is_unstable_when_tolerance_set() {
        let mut reads = window(&[500.0; 4]);
        reads.extend(window(&[400.0, 401.0, 399.0, 400.0]));
        let rig = Rig::scripted(reads);
        let config = SweepConfig { hashrate_tolerance: Some(0.9), ..sample_config() };
        let (report, _) = sweep(&rig, &config).await;
        assert_eq!(report.verdicts[1].point, p(610, 1100));
        assert_eq!(report.verdicts[1].kind, VerdictKind::Unstable);
        assert!(report.verdicts[1].reason.contains("hashrate drop"));
        assert_eq!(report.verdicts[2].point, p(610, 1110));
        assert_eq!(report.verdicts[2].kind, VerdictKind::Stable);
    }

    #[tokio::test]
    async fn test_best_prefers_higher_score() {
        let mut reads = window(&[500.0; 4]);
        reads.extend(window(&[520.0; 4]));
        reads.extend(window(&[510.0; 4]));
        let rig = Rig::scripted(reads);
        let (report, _) = sweep(&rig, &sample_config()).await;
        let best = report.best.unwrap();
        assert_eq!(best.point, p(610, 1100));
        assert_eq!(best.score, 520.0);
    }

    #[tokio::test]
    async fn test_stop_between_points_ends_sweep_without_new_commands() {
        let rig = Rig::default();
        let stop = StopSignal::new();
        let trigger = stop.clone();
        let mut sink = MemorySink::new();
        let report = SweepController::new(&rig, &mut sink, stop)
            .on_verdict(move |_| trigger.trigger())
            .run_sweep(&sample_config())
            .await
            .unwrap();
        assert_eq!(report.end, SweepEnd::Interrupted);
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(rig.applied().len(), 1);
        assert_eq!(sink.records.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_commands_nothing() {
        let rig = Rig::default();
        let config = SweepConfig { cv_start_mv: 1200, cv_max_mv: 1100, ..sample_config() };
        let mut sink = MemorySink::new();
        let err = run_sweep(&rig, &mut sink, &config, StopSignal::new()).await.unwrap_err();
        assert!(matches!(err, TunerError::Config(ConfigError::VoltageRange { .. })));
        assert!(rig.applied().is_empty());
        assert!(sink.records.is_empty());
    }

    #[tokio::test]
    async fn test_custom_metric_overrides_config() {
        let rig = Rig::default();
        let mut sink = MemorySink::new();
        let report = SweepController::new(&rig, &mut sink, StopSignal::new())
            .with_metric(Box::new(crate::sweep::metric::HashratePerMillivolt))
            .run_sweep(&sample_config())
            .await
            .unwrap();
        assert_eq!(report.metric, "per-millivolt");
    }

    #[tokio::test]
    async fn test_sink_failure_ends_sweep_and_keeps_best() {
        let rig = Rig::default();
        let mut sink = DiskFullSink { fail_on_record: Some(2), ..DiskFullSink::default() };
        let report = run_sweep(&rig, &mut sink, &sample_config(), StopSignal::new()).await.unwrap();

        assert!(
            matches!(&report.end, SweepEnd::SinkFailed { reason } if reason.contains("disk full")),
            "{:?}",
            report.end
        );
        assert_eq!(report.best.as_ref().unwrap().point, p(600, 1100));
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(sink.inner.records.len(), 1);
        // the point whose record failed is the last one commanded
        assert_eq!(rig.applied(), vec![p(600, 1100), p(610, 1100)]);

        colored::control::set_override(false);
        let text = report.render();
        assert!(text.contains("600 MHz @ 1100 mV"), "{text}");
        assert!(text.contains("disk full"), "{text}");
    }

    #[tokio::test]
    async fn test_flush_failure_marks_completed_sweep_as_sink_failed() {
        let rig = Rig::default();
        let mut sink = DiskFullSink { fail_flush: true, ..DiskFullSink::default() };
        let report = run_sweep(&rig, &mut sink, &sample_config(), StopSignal::new()).await.unwrap();
        assert!(matches!(report.end, SweepEnd::SinkFailed { .. }));
        assert_eq!(report.verdicts.len(), 3);
        assert_eq!(report.best.unwrap().point, p(600, 1100));
    }

    #[tokio::test]
    async fn test_short_window_is_retried_then_inconclusive() {
        let rig = Rig::default();
        let short = SampleCollector::new(1, Duration::ZERO, Duration::ZERO);
        let outcome = evaluate(&rig, StopSignal::new(), &short).await.unwrap();

        assert_eq!(outcome.verdict.kind, VerdictKind::InconclusiveRetry);
        assert_eq!(outcome.inconclusive, Some(Inconclusive::InsufficientData));
        assert_eq!(outcome.verdict.stats.samples, 1);
        // first attempt plus insufficient_data_retries (1) re-applies
        assert_eq!(rig.applied(), vec![p(600, 1100), p(600, 1100)]);
    }

    #[tokio::test]
    async fn test_stop_before_apply_records_nothing() {
        let rig = Rig::default();
        let stop = StopSignal::new();
        stop.trigger();
        let outcome = evaluate(&rig, stop, &SampleCollector::from_config(&sample_config())).await;
        assert!(outcome.is_none());
        assert!(rig.applied().is_empty());
    }

    #[tokio::test]
    async fn test_stop_after_apply_records_interrupted_point() {
        let stop = StopSignal::new();
        let rig = Rig { stop_on_apply: Some(stop.clone()), ..Rig::default() };
        let mut sink = MemorySink::new();
        let report = run_sweep(&rig, &mut sink, &sample_config(), stop).await.unwrap();

        assert_eq!(report.end, SweepEnd::Interrupted);
        assert_eq!(rig.applied(), vec![p(600, 1100)]);
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(report.verdicts[0].kind, VerdictKind::InconclusiveRetry);
        assert_eq!(report.verdicts[0].reason, "interrupted while settling");
        assert!(report.best.is_none());
        assert_eq!(sink.records.len(), 1);
    }
}
