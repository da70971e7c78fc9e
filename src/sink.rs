//! Append-only result log.
//!
//! One row per terminal verdict, flushed as soon as it is written so an
//! interrupted sweep still leaves a usable file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::sweep::{OperatingPoint, Verdict, VerdictKind};

/// Flat tabular form of a [`Verdict`]. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub frequency_mhz: u32,
    pub core_voltage_mv: u32,
    pub mean_hashrate: f64,
    pub stddev: f64,
    pub cv: f64,
    pub max_temp_c: f64,
    pub mean_power_w: Option<f64>,
    pub samples: usize,
    pub verdict: VerdictKind,
    pub reason: String,
    /// RFC 3339 evaluation time.
    pub timestamp: String,
}

impl PointRecord {
    pub fn point(&self) -> OperatingPoint {
        OperatingPoint::new(self.frequency_mhz, self.core_voltage_mv)
    }
}

impl From<&Verdict> for PointRecord {
    fn from(v: &Verdict) -> Self {
        Self {
            frequency_mhz: v.point.frequency_mhz(),
            core_voltage_mv: v.point.core_voltage_mv(),
            mean_hashrate: v.stats.mean_hashrate,
            stddev: v.stats.stddev,
            cv: v.stats.cv,
            max_temp_c: v.stats.max_temp_c,
            mean_power_w: v.stats.mean_power_w,
            samples: v.stats.samples,
            verdict: v.kind,
            reason: v.reason.clone(),
            timestamp: v.evaluated_at.to_rfc3339(),
        }
    }
}

/// Durable destination for terminal verdicts.
pub trait ResultSink {
    /// Persist one verdict. Must not buffer past the call.
    fn record(&mut self, verdict: &Verdict) -> Result<(), SinkError>;

    /// Flush anything still pending. Called once when the sweep ends.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: ResultSink + ?Sized> ResultSink for &mut S {
    fn record(&mut self, verdict: &Verdict) -> Result<(), SinkError> {
        (**self).record(verdict)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

// ---------------------------------------------------------------------------
// CsvSink
// ---------------------------------------------------------------------------

/// CSV writer that flushes after every row.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvSink<std::fs::File> {
    /// Open `path` for appending. A header row is written only when the file
    /// is new or empty.
    pub fn append<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let has_rows = file.metadata()?.len() > 0;
        let writer = csv::WriterBuilder::new()
            .has_headers(!has_rows)
            .from_writer(file);
        Ok(Self { writer })
    }
}

impl<W: Write> CsvSink<W> {
    /// Wrap any writer; a header row is written before the first record.
    pub fn from_writer(w: W) -> Self {
        Self { writer: csv::Writer::from_writer(w) }
    }

    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer
            .into_inner()
            .map_err(|e| SinkError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
    }
}

impl<W: Write> ResultSink for CsvSink<W> {
    fn record(&mut self, verdict: &Verdict) -> Result<(), SinkError> {
        self.writer.serialize(PointRecord::from(verdict))?;
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Keeps records in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub records: Vec<PointRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultSink for MemorySink {
    fn record(&mut self, verdict: &Verdict) -> Result<(), SinkError> {
        self.records.push(PointRecord::from(verdict));
        Ok(())
    }
}

/// Read every record from a results CSV.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<PointRecord>, csv::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    reader.deserialize().collect()
}
