//! TOML settings file and command-line overrides.
//!
//! Resolution order, highest priority first:
//! 1. Command-line flags ([`SettingsOverrides`])
//! 2. `--config FILE` values
//! 3. Built-in defaults (the long-running profile: 525–875 MHz in 5 MHz
//!    steps, 1150–1250 mV in 10 mV steps, 180 s settle, 180 × 1 s samples)
//!
//! Every section and key is optional:
//!
//! ```toml
//! [device]
//! url = "http://192.168.1.50"
//!
//! [sweep]
//! freq_start_mhz = 550
//! freq_end_mhz = 700
//! settle_secs = 120.0
//! metric = "per-watt"
//!
//! [output]
//! results = "tuning.csv"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::{HttpDeviceClient, HttpDeviceClientBuilder};
use crate::error::{ConfigError, TunerError};
use crate::sweep::{MetricKind, SweepConfig, DEFAULT_MIN_SAMPLES};

pub const DEFAULT_RESULTS_FILE: &str = "bitaxe_tuning_results.csv";

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TunerSettings {
    pub device: DeviceSettings,
    pub sweep: SweepSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceSettings {
    /// Base URL, e.g. `http://192.168.1.50`.
    pub url: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Sent as `autoFanSpeed` with every configuration change.
    pub auto_fan_speed: Option<bool>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout_secs: 3,
            request_timeout_secs: 10,
            auto_fan_speed: Some(true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepSettings {
    pub freq_start_mhz: u32,
    pub freq_end_mhz: u32,
    pub freq_step_mhz: u32,
    pub cv_start_mv: u32,
    pub cv_max_mv: u32,
    pub cv_step_mv: u32,
    pub window_size: usize,
    pub sample_interval_secs: f64,
    pub settle_secs: f64,
    pub cv_threshold: f64,
    pub temp_limit_c: f64,
    pub min_samples: usize,
    pub unstable_confirmations: u32,
    pub insufficient_data_retries: u32,
    pub transport_failure_limit: u32,
    pub hashrate_tolerance: Option<f64>,
    pub carry_voltage: bool,
    pub metric: MetricKind,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            freq_start_mhz: 525,
            freq_end_mhz: 875,
            freq_step_mhz: 5,
            cv_start_mv: 1150,
            cv_max_mv: 1250,
            cv_step_mv: 10,
            window_size: 180,
            sample_interval_secs: 1.0,
            settle_secs: 180.0,
            cv_threshold: 0.12,
            temp_limit_c: 60.0,
            min_samples: DEFAULT_MIN_SAMPLES,
            unstable_confirmations: 1,
            insufficient_data_retries: 1,
            transport_failure_limit: 3,
            hashrate_tolerance: None,
            carry_voltage: false,
            metric: MetricKind::Hashrate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    pub results: PathBuf,
    pub report_json: Option<PathBuf>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            results: PathBuf::from(DEFAULT_RESULTS_FILE),
            report_json: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Values given on the command line. `None` keeps the file/default value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsOverrides {
    pub device_url: Option<String>,
    pub freq_start_mhz: Option<u32>,
    pub freq_end_mhz: Option<u32>,
    pub freq_step_mhz: Option<u32>,
    pub cv_start_mv: Option<u32>,
    pub cv_max_mv: Option<u32>,
    pub cv_step_mv: Option<u32>,
    pub window_size: Option<usize>,
    pub sample_interval_secs: Option<f64>,
    pub settle_secs: Option<f64>,
    pub cv_threshold: Option<f64>,
    pub temp_limit_c: Option<f64>,
    pub hashrate_tolerance: Option<f64>,
    pub carry_voltage: Option<bool>,
    pub metric: Option<MetricKind>,
    pub results: Option<PathBuf>,
    pub report_json: Option<PathBuf>,
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

impl TunerSettings {
    /// Load settings from a TOML file. Missing keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TunerError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, TunerError> {
        Ok(toml::from_str(text)?)
    }

    /// Defaults, or the contents of `path` when given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, TunerError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn apply_overrides(&mut self, o: SettingsOverrides) {
        if o.device_url.is_some() {
            self.device.url = o.device_url;
        }
        let s = &mut self.sweep;
        set(&mut s.freq_start_mhz, o.freq_start_mhz);
        set(&mut s.freq_end_mhz, o.freq_end_mhz);
        set(&mut s.freq_step_mhz, o.freq_step_mhz);
        set(&mut s.cv_start_mv, o.cv_start_mv);
        set(&mut s.cv_max_mv, o.cv_max_mv);
        set(&mut s.cv_step_mv, o.cv_step_mv);
        set(&mut s.window_size, o.window_size);
        set(&mut s.sample_interval_secs, o.sample_interval_secs);
        set(&mut s.settle_secs, o.settle_secs);
        set(&mut s.cv_threshold, o.cv_threshold);
        set(&mut s.temp_limit_c, o.temp_limit_c);
        set(&mut s.carry_voltage, o.carry_voltage);
        set(&mut s.metric, o.metric);
        if o.hashrate_tolerance.is_some() {
            s.hashrate_tolerance = o.hashrate_tolerance;
        }
        set(&mut self.output.results, o.results);
        if o.report_json.is_some() {
            self.output.report_json = o.report_json;
        }
    }

    /// Build and validate the immutable sweep configuration.
    pub fn sweep_config(&self) -> Result<SweepConfig, ConfigError> {
        let s = &self.sweep;
        let config = SweepConfig {
            freq_start_mhz: s.freq_start_mhz,
            freq_end_mhz: s.freq_end_mhz,
            freq_step_mhz: s.freq_step_mhz,
            cv_start_mv: s.cv_start_mv,
            cv_max_mv: s.cv_max_mv,
            cv_step_mv: s.cv_step_mv,
            window_size: s.window_size,
            sample_interval: secs("sample_interval_secs", s.sample_interval_secs)?,
            settle_delay: secs("settle_secs", s.settle_secs)?,
            cv_threshold: s.cv_threshold,
            temp_limit_c: s.temp_limit_c,
            min_samples: s.min_samples,
            unstable_confirmations: s.unstable_confirmations,
            insufficient_data_retries: s.insufficient_data_retries,
            transport_failure_limit: s.transport_failure_limit,
            hashrate_tolerance: s.hashrate_tolerance,
            carry_voltage: s.carry_voltage,
            metric: s.metric,
        };
        config.validate()?;
        Ok(config)
    }

    /// HTTP client for the configured device.
    pub fn device_client(&self) -> Result<HttpDeviceClient, ConfigError> {
        let url = self.device.url.as_deref().ok_or(ConfigError::MissingDevice)?;
        Ok(HttpDeviceClientBuilder::new(url)
            .connect_timeout(Duration::from_secs(self.device.connect_timeout_secs))
            .request_timeout(Duration::from_secs(self.device.request_timeout_secs))
            .auto_fan_speed(self.device.auto_fan_speed)
            .build())
    }
}

fn secs(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::Duration { field, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_long_running_profile() {
        let cfg = TunerSettings::default().sweep_config().unwrap();
        assert_eq!((cfg.freq_start_mhz, cfg.freq_end_mhz, cfg.freq_step_mhz), (525, 875, 5));
        assert_eq!((cfg.cv_start_mv, cfg.cv_max_mv, cfg.cv_step_mv), (1150, 1250, 10));
        assert_eq!(cfg.settle_delay, Duration::from_secs(180));
        assert_eq!(cfg.sample_interval, Duration::from_secs(1));
        assert_eq!(cfg.window_size, 180);
        assert_eq!(cfg.temp_limit_c, 60.0);
        assert_eq!(cfg.unstable_confirmations, 1);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let s = TunerSettings::from_toml(
            r#"
            [device]
            url = "http://10.0.0.7"

            [sweep]
            freq_start_mhz = 550
            settle_secs = 0.5
            metric = "per-watt"
            "#,
        )
        .unwrap();
        assert_eq!(s.device.url.as_deref(), Some("http://10.0.0.7"));
        assert_eq!(s.sweep.freq_start_mhz, 550);
        assert_eq!(s.sweep.freq_end_mhz, 875);
        assert_eq!(s.sweep.metric, MetricKind::PerWatt);
        assert_eq!(s.sweep_config().unwrap().settle_delay, Duration::from_millis(500));
        assert_eq!(s.output.results, PathBuf::from(DEFAULT_RESULTS_FILE));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = TunerSettings::from_toml("[sweep]\nfreq_begin = 500\n").unwrap_err();
        assert!(matches!(err, TunerError::Toml(_)));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut s = TunerSettings::from_toml("[sweep]\nfreq_start_mhz = 550\n").unwrap();
        s.apply_overrides(SettingsOverrides {
            freq_start_mhz: Some(600),
            hashrate_tolerance: Some(0.9),
            results: Some(PathBuf::from("out.csv")),
            ..Default::default()
        });
        assert_eq!(s.sweep.freq_start_mhz, 600);
        assert_eq!(s.sweep.hashrate_tolerance, Some(0.9));
        assert_eq!(s.output.results, PathBuf::from("out.csv"));
        assert_eq!(s.sweep.freq_end_mhz, 875);
    }

    #[test]
    fn test_override_turns_off_carry_voltage_from_file() {
        let mut s = TunerSettings::from_toml("[sweep]\ncarry_voltage = true\n").unwrap();
        assert!(s.sweep.carry_voltage);
        s.apply_overrides(SettingsOverrides { carry_voltage: Some(false), ..Default::default() });
        assert!(!s.sweep.carry_voltage);
        assert!(!s.sweep_config().unwrap().carry_voltage);
    }

    #[test]
    fn test_invalid_range_fails_validation() {
        let mut s = TunerSettings::default();
        s.sweep.freq_start_mhz = 900;
        assert_eq!(
            s.sweep_config().unwrap_err(),
            ConfigError::FrequencyRange { start: 900, end: 875 }
        );
    }

    #[test]
    fn test_negative_duration_rejected() {
        let mut s = TunerSettings::default();
        s.sweep.settle_secs = -1.0;
        assert!(matches!(
            s.sweep_config().unwrap_err(),
            ConfigError::Duration { field: "settle_secs", .. }
        ));
    }

    #[test]
    fn test_device_client_requires_url() {
        assert_eq!(
            TunerSettings::default().device_client().unwrap_err(),
            ConfigError::MissingDevice
        );
        let mut s = TunerSettings::default();
        s.device.url = Some("http://10.0.0.7/".into());
        assert_eq!(s.device_client().unwrap().config().base_url, "http://10.0.0.7");
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuner.toml");
        std::fs::write(&path, "[output]\nresults = \"runs.csv\"\n").unwrap();
        let s = TunerSettings::load(&path).unwrap();
        assert_eq!(s.output.results, PathBuf::from("runs.csv"));
    }
}
