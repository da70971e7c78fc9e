//! # Device
//!
//! Transport to the miner's HTTP control surface.
//!
//! 1. **Apply**: `PATCH /api/system` with `{frequency, coreVoltage}`.
//! 2. **Telemetry**: `GET /api/system/info`, reduced to hashrate, chip
//!    temperature and (when present) power.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let device = HttpDeviceClient::builder("http://192.168.1.50")
//!     .request_timeout(Duration::from_secs(5))
//!     .build();
//! device.apply_config(OperatingPoint::new(600, 1150)).await?;
//! let sample = device.read_telemetry().await?;
//! ```

pub mod api;
pub mod client;

pub use api::{SystemInfo, SystemPatch};
pub use client::{DeviceClient, DeviceConfig, DeviceError, HttpDeviceClient, HttpDeviceClientBuilder};
