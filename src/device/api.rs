//! Wire types for the AxeOS-style REST API.
//!
//! ## Mapping
//! | JSON field     | Meaning                    | Notes                          |
//! |----------------|----------------------------|--------------------------------|
//! | `hashRate`     | current hashrate (GH/s)    | required                       |
//! | `temp`         | ASIC chip temperature (°C) | required                       |
//! | `power`        | input power (W)            | optional, feeds per-watt score |
//! | `vrTemp`       | regulator temperature (°C) | optional, logged only          |
//! | `frequency`    | active frequency (MHz)     | optional                       |
//! | `coreVoltage`  | requested core voltage (mV)| optional                       |

use serde::{Deserialize, Serialize};

use crate::sweep::{OperatingPoint, TelemetrySample};

/// Body of `PATCH /api/system`.
///
/// Optional fields are omitted from the JSON body when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemPatch {
    pub frequency: u32,
    #[serde(rename = "coreVoltage")]
    pub core_voltage: u32,
    #[serde(rename = "autoFanSpeed", skip_serializing_if = "Option::is_none")]
    pub auto_fan_speed: Option<bool>,
}

impl SystemPatch {
    pub fn for_point(point: OperatingPoint, auto_fan_speed: Option<bool>) -> Self {
        Self {
            frequency: point.frequency_mhz(),
            core_voltage: point.core_voltage_mv(),
            auto_fan_speed,
        }
    }
}

/// Subset of `GET /api/system/info` that the tuner reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    #[serde(rename = "hashRate")]
    pub hash_rate: f64,
    pub temp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<f64>,
    #[serde(rename = "vrTemp", default, skip_serializing_if = "Option::is_none")]
    pub vr_temp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u32>,
    #[serde(rename = "coreVoltage", default, skip_serializing_if = "Option::is_none")]
    pub core_voltage: Option<u32>,
}

impl SystemInfo {
    /// The operating point the device reports, when it reports both axes.
    pub fn active_point(&self) -> Option<OperatingPoint> {
        Some(OperatingPoint::new(self.frequency?, self.core_voltage?))
    }

    pub fn to_sample(&self) -> TelemetrySample {
        let sample = TelemetrySample::new(self.hash_rate, self.temp);
        match self.power {
            Some(p) => sample.with_power(p),
            None => sample,
        }
    }
}
