//! Crate-level error types.
//!
//! Device transport failures are absorbed by the sweep controller and turned
//! into per-point verdicts, and a sink failure ends the sweep with a report.
//! Only configuration errors escape
//! [`crate::sweep::SweepController::run_sweep`]; the other variants serve the
//! CLI and the offline analysis.

use crate::device::DeviceError;

/// Invalid sweep configuration, detected before any point is commanded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("frequency range invalid: start {start} MHz > end {end} MHz")]
    FrequencyRange { start: u32, end: u32 },

    #[error("voltage range invalid: start {start} mV > max {max} mV")]
    VoltageRange { start: u32, max: u32 },

    #[error("{axis} step must be greater than zero")]
    ZeroStep { axis: &'static str },

    #[error("window size {window} is smaller than the minimum sample count {min}")]
    WindowTooSmall { window: usize, min: usize },

    #[error("minimum sample count must be at least 1 (got {0})")]
    MinSamples(usize),

    #[error("stability threshold must be a positive finite number (got {0})")]
    Threshold(f64),

    #[error("temperature limit must be a positive finite number (got {0})")]
    TempLimit(f64),

    #[error("hashrate tolerance must be in (0, 1] (got {0})")]
    Tolerance(f64),

    #[error("transport failure limit must be at least 1")]
    TransportLimit,

    #[error("{field} must be a finite, non-negative number of seconds (got {value})")]
    Duration { field: &'static str, value: f64 },

    #[error("device URL is required (--device or [device].url)")]
    MissingDevice,
}

/// Failure to persist a point record.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error for the library and the CLI.
#[derive(Debug, thiserror::Error)]
pub enum TunerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("result sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TunerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_names_both_bounds() {
        let err = ConfigError::FrequencyRange { start: 900, end: 500 };
        let s = err.to_string();
        assert!(s.contains("900"), "{s}");
        assert!(s.contains("500"), "{s}");
    }

    #[test]
    fn test_tuner_error_wraps_config_error() {
        let err: TunerError = ConfigError::ZeroStep { axis: "voltage" }.into();
        assert!(matches!(err, TunerError::Config(ConfigError::ZeroStep { .. })));
        assert!(err.to_string().contains("voltage step"));
    }

    #[test]
    fn test_tuner_error_wraps_device_error() {
        let err: TunerError = DeviceError::Http { status: 500, url: "http://x".into() }.into();
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_sink_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: SinkError = io.into();
        assert!(err.to_string().contains("disk full"));
    }
}
