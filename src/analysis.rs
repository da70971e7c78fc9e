//! # Stage: Offline Analysis
//!
//! ## Responsibility
//! Rank the rows of a results CSV after the fact: highest hashrate, most
//! stable (lowest standard deviation) and a weighted balance of the two, plus
//! a per-voltage breakdown.
//!
//! ## Guarantees
//! - Only Stable rows are ranked unless `include_all` is set.
//! - Rows with no samples or non-finite statistics are never ranked.
//! - Ties keep file order, so the earliest row wins.
//!
//! ## NOT Responsible For
//! - Commanding the device (the sweep decides what gets applied)

use std::collections::BTreeMap;
use std::path::Path;

use colored::*;
use serde::Serialize;

use crate::error::TunerError;
use crate::sink::{read_records, PointRecord};
use crate::sweep::VerdictKind;

/// Weight of normalized hashrate in the composite score.
pub const HASHRATE_WEIGHT: f64 = 0.6;
/// Weight of normalized stability (1 − normalized stddev).
pub const STABILITY_WEIGHT: f64 = 0.4;
/// Entries per ranking list.
pub const TOP_N: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    pub record: PointRecord,
    pub composite: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoltageSummary {
    pub core_voltage_mv: u32,
    pub count: usize,
    pub mean_hashrate: f64,
    pub max_hashrate: f64,
    pub mean_stddev: f64,
    pub min_stddev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    /// Rows in the file.
    pub total_records: usize,
    /// Rows that were ranked.
    pub considered: usize,
    pub include_all: bool,
    pub frequency_range: Option<(u32, u32)>,
    pub voltages: Vec<u32>,
    pub temp_range: Option<(f64, f64)>,
    pub top_hashrate: Vec<ScoredRecord>,
    pub top_stable: Vec<ScoredRecord>,
    pub top_balanced: Vec<ScoredRecord>,
    pub per_voltage: Vec<VoltageSummary>,
}

impl Analysis {
    pub fn highest_hashrate(&self) -> Option<&ScoredRecord> {
        self.top_hashrate.first()
    }

    pub fn most_stable(&self) -> Option<&ScoredRecord> {
        self.top_stable.first()
    }

    /// The recommended point.
    pub fn best_balance(&self) -> Option<&ScoredRecord> {
        self.top_balanced.first()
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

fn rankable(r: &PointRecord, include_all: bool) -> bool {
    (include_all || r.verdict == VerdictKind::Stable)
        && r.samples > 0
        && r.mean_hashrate.is_finite()
        && r.stddev.is_finite()
}

/// Position of `x` within `[min, max]`; a zero-width range maps to 1.0.
fn normalize(x: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    if span <= 0.0 {
        1.0
    } else {
        (x - min) / span
    }
}

fn bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Analyze already-loaded records.
pub fn analyze(records: &[PointRecord], include_all: bool) -> Analysis {
    let ranked: Vec<&PointRecord> = records.iter().filter(|r| rankable(r, include_all)).collect();

    let (h_lo, h_hi) = bounds(ranked.iter().map(|r| r.mean_hashrate)).unwrap_or((0.0, 0.0));
    let (s_lo, s_hi) = bounds(ranked.iter().map(|r| r.stddev)).unwrap_or((0.0, 0.0));

    let scored: Vec<ScoredRecord> = ranked
        .iter()
        .map(|r| {
            let hashrate = normalize(r.mean_hashrate, h_lo, h_hi);
            let stability = if s_hi > s_lo { 1.0 - normalize(r.stddev, s_lo, s_hi) } else { 1.0 };
            ScoredRecord {
                record: (*r).clone(),
                composite: HASHRATE_WEIGHT * hashrate + STABILITY_WEIGHT * stability,
            }
        })
        .collect();

    let top = |mut v: Vec<ScoredRecord>, cmp: fn(&ScoredRecord, &ScoredRecord) -> std::cmp::Ordering| {
        v.sort_by(cmp);
        v.truncate(TOP_N);
        v
    };

    let top_hashrate = top(scored.clone(), |a, b| {
        b.record.mean_hashrate.total_cmp(&a.record.mean_hashrate)
    });
    let top_stable = top(scored.clone(), |a, b| a.record.stddev.total_cmp(&b.record.stddev));
    let top_balanced = top(scored, |a, b| b.composite.total_cmp(&a.composite));

    let mut by_voltage: BTreeMap<u32, Vec<&PointRecord>> = BTreeMap::new();
    for &r in &ranked {
        by_voltage.entry(r.core_voltage_mv).or_default().push(r);
    }
    let per_voltage = by_voltage
        .into_iter()
        .map(|(mv, rows)| {
            let n = rows.len() as f64;
            VoltageSummary {
                core_voltage_mv: mv,
                count: rows.len(),
                mean_hashrate: rows.iter().map(|r| r.mean_hashrate).sum::<f64>() / n,
                max_hashrate: rows.iter().map(|r| r.mean_hashrate).fold(f64::NEG_INFINITY, f64::max),
                mean_stddev: rows.iter().map(|r| r.stddev).sum::<f64>() / n,
                min_stddev: rows.iter().map(|r| r.stddev).fold(f64::INFINITY, f64::min),
            }
        })
        .collect::<Vec<_>>();

    let frequency_range = ranked
        .iter()
        .map(|r| r.frequency_mhz)
        .fold(None, |acc: Option<(u32, u32)>, f| match acc {
            None => Some((f, f)),
            Some((lo, hi)) => Some((lo.min(f), hi.max(f))),
        });

    Analysis {
        total_records: records.len(),
        considered: ranked.len(),
        include_all,
        frequency_range,
        voltages: per_voltage.iter().map(|v| v.core_voltage_mv).collect(),
        temp_range: bounds(ranked.iter().map(|r| r.max_temp_c).filter(|t| t.is_finite())),
        top_hashrate,
        top_stable,
        top_balanced,
        per_voltage,
    }
}

/// Load a results CSV and analyze it.
pub fn analyze_file<P: AsRef<Path>>(path: P, include_all: bool) -> Result<Analysis, TunerError> {
    let records = read_records(path)?;
    Ok(analyze(&records, include_all))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn line(r: &PointRecord) -> String {
    format!(
        "{} MHz @ {} mV: {:.1} GH/s (stdev {:.1}, {:.1}°C)",
        r.frequency_mhz, r.core_voltage_mv, r.mean_hashrate, r.stddev, r.max_temp_c
    )
}

fn ranking(out: &mut String, title: &str, rows: &[ScoredRecord], with_score: bool) {
    out.push_str(&format!("{}\n", title.bold()));
    for (i, s) in rows.iter().enumerate() {
        if with_score {
            out.push_str(&format!("  {}. {} score {:.3}\n", i + 1, line(&s.record), s.composite));
        } else {
            out.push_str(&format!("  {}. {}\n", i + 1, line(&s.record)));
        }
    }
    out.push('\n');
}

impl Analysis {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\n", "=== Tuning results analysis ===".bold()));
        out.push_str(&format!(
            "Rows: {} ({} ranked, {})\n",
            self.total_records,
            self.considered,
            if self.include_all { "all verdicts" } else { "stable only" }
        ));

        if self.considered == 0 {
            out.push_str(&format!("{}\n", "No rankable rows.".bright_red()));
            return out;
        }

        if let Some((lo, hi)) = self.frequency_range {
            out.push_str(&format!("Frequency range: {lo}-{hi} MHz\n"));
        }
        let volts: Vec<String> = self.voltages.iter().map(|v| v.to_string()).collect();
        out.push_str(&format!("Voltage levels: {} mV\n", volts.join(", ")));
        if let Some((lo, hi)) = self.temp_range {
            out.push_str(&format!("Temperature range: {lo:.1}-{hi:.1}°C\n"));
        }
        out.push('\n');

        ranking(&mut out, "Top by hashrate", &self.top_hashrate, false);
        ranking(&mut out, "Top by stability (lowest stdev)", &self.top_stable, false);
        ranking(
            &mut out,
            &format!(
                "Top balanced ({:.0}% hashrate, {:.0}% stability)",
                HASHRATE_WEIGHT * 100.0,
                STABILITY_WEIGHT * 100.0
            ),
            &self.top_balanced,
            true,
        );

        out.push_str(&format!("{}\n", "Per voltage".bold()));
        for v in &self.per_voltage {
            out.push_str(&format!(
                "  {} mV: {} rows, hashrate avg {:.1} / max {:.1}, stdev avg {:.1} / min {:.1}\n",
                v.core_voltage_mv, v.count, v.mean_hashrate, v.max_hashrate, v.mean_stddev, v.min_stddev
            ));
        }
        out.push('\n');

        if let Some(best) = self.best_balance() {
            out.push_str(&format!(
                "Recommended: {}\n",
                line(&best.record).bright_green().bold()
            ));
        }
        if let Some(h) = self.highest_hashrate() {
            out.push_str(&format!("  max hashrate:  {}\n", line(&h.record)));
        }
        if let Some(s) = self.most_stable() {
            out.push_str(&format!("  max stability: {}\n", line(&s.record)));
        }
        out
    }
}
