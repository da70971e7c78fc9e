//! Frequency/voltage sweep tuner for AxeOS-compatible ASIC miners.
//!
//! For each frequency in ascending order the tuner looks for the lowest core
//! voltage at which the hashrate holds steady, escalating voltage only while
//! the measurement is unstable and aborting the moment the chip runs hot.
//! Every visited point is appended to a CSV log as it is decided.
//!
//! ```rust,ignore
//! let device = HttpDeviceClient::builder("http://192.168.1.50").build();
//! let mut sink = CsvSink::append("bitaxe_tuning_results.csv")?;
//! let config = TunerSettings::default().sweep_config()?;
//! let report = run_sweep(&device, &mut sink, &config, StopSignal::new()).await?;
//! println!("{}", report.render());
//! ```

pub mod analysis;
pub mod cli;
pub mod device;
pub mod error;
pub mod report;
pub mod settings;
pub mod sink;
pub mod sweep;

pub use device::{DeviceClient, DeviceError, HttpDeviceClient};
pub use error::{ConfigError, Result, SinkError, TunerError};
pub use report::{SweepEnd, SweepReport};
pub use settings::TunerSettings;
pub use sink::{CsvSink, MemorySink, PointRecord, ResultSink};
pub use sweep::{
    run_sweep, OperatingPoint, StopSignal, SweepConfig, SweepController, TelemetrySample,
    Verdict, VerdictKind,
};
