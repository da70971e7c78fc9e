//! Sweep report: the terminal output of a sweep.
//!
//! Rendered for the terminal with `colored` and exportable as pretty JSON.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use colored::*;
use serde::Serialize;
use uuid::Uuid;

use crate::sweep::{OperatingPoint, Verdict, VerdictKind, WindowStats};

/// Best stable point found so far under the sweep's efficiency metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestPoint {
    pub point: OperatingPoint,
    pub stats: WindowStats,
    pub score: f64,
    pub metric: String,
}

/// A frequency step that ended without a stable voltage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedFrequency {
    pub frequency_mhz: u32,
    pub reason: String,
}

/// How the sweep ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SweepEnd {
    Completed,
    ThermalAbort { reason: String },
    Interrupted,
    /// A verdict could not be persisted; nothing further was commanded.
    SinkFailed { reason: String },
}

impl std::fmt::Display for SweepEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweepEnd::Completed               => write!(f, "completed"),
            SweepEnd::ThermalAbort { reason } => write!(f, "thermal abort: {reason}"),
            SweepEnd::Interrupted             => write!(f, "interrupted by user"),
            SweepEnd::SinkFailed { reason }   => write!(f, "result sink failed: {reason}"),
        }
    }
}

/// Everything a finished (or aborted) sweep produced.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub metric: String,
    pub best: Option<BestPoint>,
    /// Terminal verdicts in the order points were evaluated.
    pub verdicts: Vec<Verdict>,
    pub failed_frequencies: Vec<FailedFrequency>,
    pub end: SweepEnd,
}

impl SweepReport {
    /// Abort reason, if the sweep did not complete normally.
    pub fn abort_reason(&self) -> Option<String> {
        match &self.end {
            SweepEnd::Completed => None,
            other => Some(other.to_string()),
        }
    }

    pub fn count(&self, kind: VerdictKind) -> usize {
        self.verdicts.iter().filter(|v| v.kind == kind).count()
    }

    /// Operating points commanded, in order.
    pub fn visited(&self) -> Vec<OperatingPoint> {
        self.verdicts.iter().map(|v| v.point).collect()
    }

    /// Export report to a pretty-printed JSON file.
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Human-readable summary for the terminal.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{}\n",
            format!("=== Sweep summary (run {}) ===", self.run_id).bold()
        ));
        out.push_str(&format!(
            "Points evaluated: {} (stable {}, unstable {}, thermal {}, inconclusive {})\n",
            self.verdicts.len(),
            self.count(VerdictKind::Stable).to_string().green(),
            self.count(VerdictKind::Unstable).to_string().yellow(),
            self.count(VerdictKind::ThermalAbort).to_string().red(),
            self.count(VerdictKind::InconclusiveRetry),
        ));

        for failed in &self.failed_frequencies {
            out.push_str(&format!(
                "  {} {} MHz: {}\n",
                "failed".yellow(),
                failed.frequency_mhz,
                failed.reason
            ));
        }

        match &self.best {
            Some(best) => out.push_str(&format!(
                "Best stable point ({}): {} | mean {:.2}, stddev {:.2}, cv {:.4}, max {:.1}°C, score {:.4}\n",
                best.metric,
                best.point.to_string().bright_green().bold(),
                best.stats.mean_hashrate,
                best.stats.stddev,
                best.stats.cv,
                best.stats.max_temp_c,
                best.score,
            )),
            None => out.push_str(&format!("Best stable point: {}\n", "none found".bright_red())),
        }

        let ended = match &self.end {
            SweepEnd::Completed => self.end.to_string().green(),
            SweepEnd::ThermalAbort { .. } => self.end.to_string().bright_red().bold(),
            SweepEnd::Interrupted => self.end.to_string().yellow(),
            SweepEnd::SinkFailed { .. } => self.end.to_string().red().bold(),
        };
        out.push_str(&format!("Sweep {ended}\n"));
        out
    }
}

/// One progress line per verdict, printed as the sweep runs.
pub fn format_progress(verdict: &Verdict) -> String {
    let tag = match verdict.kind {
        VerdictKind::Stable            => "[OK]  ".green(),
        VerdictKind::Unstable          => "[UNST]".yellow(),
        VerdictKind::ThermalAbort      => "[HOT] ".bright_red(),
        VerdictKind::InconclusiveRetry => "[??]  ".dimmed(),
    };
    format!(
        "{} {}: mean {:.2}, cv {:.4}, max {:.1}°C ({})",
        tag,
        verdict.point,
        verdict.stats.mean_hashrate,
        verdict.stats.cv,
        verdict.stats.max_temp_c,
        verdict.reason
    )
}
