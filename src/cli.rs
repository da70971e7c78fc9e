use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::settings::SettingsOverrides;
use crate::sweep::MetricKind;

#[derive(Parser)]
#[command(name = "asic-tuner")]
#[command(version)]
#[command(about = "Frequency/voltage sweep tuner for AxeOS-compatible ASIC miners")]
pub struct Args {
    /// Log filter used when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Sweep frequency and core voltage, recording one verdict per point
    Sweep(SweepArgs),
    /// Rank the rows of a results CSV
    Analyze(AnalyzeArgs),
    /// Print shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct SweepArgs {
    /// Device base URL, e.g. http://192.168.1.50
    #[arg(long, short)]
    pub device: Option<String>,

    /// TOML settings file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// First frequency to try (MHz)
    #[arg(long)]
    pub freq_start: Option<u32>,

    /// Last frequency to try (MHz)
    #[arg(long)]
    pub freq_end: Option<u32>,

    /// Frequency step (MHz)
    #[arg(long)]
    pub freq_step: Option<u32>,

    /// Starting core voltage (mV)
    #[arg(long)]
    pub cv_start: Option<u32>,

    /// Maximum core voltage (mV)
    #[arg(long)]
    pub cv_max: Option<u32>,

    /// Core voltage step (mV)
    #[arg(long)]
    pub cv_step: Option<u32>,

    /// Samples per measurement window
    #[arg(long)]
    pub samples: Option<usize>,

    /// Seconds between samples
    #[arg(long)]
    pub interval: Option<f64>,

    /// Seconds to wait after applying a point
    #[arg(long)]
    pub settle: Option<f64>,

    /// Maximum coefficient of variation still considered stable
    #[arg(long)]
    pub cv_threshold: Option<f64>,

    /// Chip temperature (°C) that aborts the sweep
    #[arg(long)]
    pub temp_limit: Option<f64>,

    /// Treat stable windows below this fraction of the best hashrate as unstable
    #[arg(long)]
    pub hashrate_tolerance: Option<f64>,

    /// Start each frequency at the previous frequency's stable voltage
    /// (`--carry-voltage=false` turns off a setting from the config file)
    #[arg(long, value_name = "BOOL", num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub carry_voltage: Option<bool>,

    /// Efficiency metric used to pick the best point
    #[arg(long, value_enum)]
    pub metric: Option<MetricKind>,

    /// Results CSV (appended to if it exists)
    #[arg(long, short)]
    pub results: Option<PathBuf>,

    /// Write the sweep report as JSON
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Apply the best stable point once the sweep ends
    #[arg(long)]
    pub apply_best: bool,
}

impl SweepArgs {
    /// Flags given on the command line, ready to layer over the settings file.
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            device_url: self.device.clone(),
            freq_start_mhz: self.freq_start,
            freq_end_mhz: self.freq_end,
            freq_step_mhz: self.freq_step,
            cv_start_mv: self.cv_start,
            cv_max_mv: self.cv_max,
            cv_step_mv: self.cv_step,
            window_size: self.samples,
            sample_interval_secs: self.interval,
            settle_secs: self.settle,
            cv_threshold: self.cv_threshold,
            temp_limit_c: self.temp_limit,
            hashrate_tolerance: self.hashrate_tolerance,
            carry_voltage: self.carry_voltage,
            metric: self.metric,
            results: self.results.clone(),
            report_json: self.report_json.clone(),
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Results CSV written by `sweep`
    pub results: PathBuf,

    /// Rank every row, not only stable ones
    #[arg(long)]
    pub all: bool,

    /// Print the analysis as JSON instead of text
    #[arg(long)]
    pub json: bool,
}
