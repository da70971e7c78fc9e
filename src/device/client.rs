//! Device transport: the [`DeviceClient`] seam and its HTTP implementation.
//!
//! The client is pure transport. It never retries and never interprets
//! telemetry; every failure is returned to the caller as a [`DeviceError`].

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::api::{SystemInfo, SystemPatch};
use crate::sweep::{OperatingPoint, TelemetrySample};

/// Errors that can occur while talking to the device.
///
/// Each variant carries enough context to diagnose the failure without
/// needing to inspect the originating error directly.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    /// The device replied with a non-2xx HTTP status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },
    /// Response body could not be parsed as the expected JSON structure.
    #[error("JSON parse error on field '{field}': {detail}")]
    Json { field: String, detail: String },
    /// A TCP-level connection could not be established.
    #[error("Connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },
    /// The request did not complete within the configured timeout.
    #[error("Request to {url} timed out")]
    Timeout { url: String },
}

/// Operations the sweep needs from a device.
///
/// Implementations must not retry on their own: a failed call is reported
/// as-is and the controller decides what it means for the current point.
#[allow(async_fn_in_trait)]
pub trait DeviceClient {
    /// Command the device to run at `point`.
    async fn apply_config(&self, point: OperatingPoint) -> Result<(), DeviceError>;

    /// Read one telemetry sample.
    async fn read_telemetry(&self) -> Result<TelemetrySample, DeviceError>;
}

impl<D: DeviceClient + ?Sized> DeviceClient for &D {
    async fn apply_config(&self, point: OperatingPoint) -> Result<(), DeviceError> {
        (**self).apply_config(point).await
    }

    async fn read_telemetry(&self) -> Result<TelemetrySample, DeviceError> {
        (**self).read_telemetry().await
    }
}

// ---------------------------------------------------------------------------
// HttpDeviceClient
// ---------------------------------------------------------------------------

/// Connection settings for [`HttpDeviceClient`].
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Base URL of the device (e.g. `http://192.168.1.50`).
    pub base_url: String,
    /// TCP connection timeout.
    pub connect_timeout: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Sent as `autoFanSpeed` with every configuration patch when set.
    pub auto_fan_speed: Option<bool>,
}

impl DeviceConfig {
    /// Create a config with sensible defaults.
    ///
    /// - connect_timeout: 3 s
    /// - request_timeout: 10 s
    /// - auto_fan_speed: `Some(true)`
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
            auto_fan_speed: Some(true),
        }
    }
}

/// AxeOS-compatible REST client.
#[derive(Debug, Clone)]
pub struct HttpDeviceClient {
    config: DeviceConfig,
    client: reqwest::Client,
}

impl HttpDeviceClient {
    /// Start building a client aimed at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> HttpDeviceClientBuilder {
        HttpDeviceClientBuilder::new(base_url)
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    fn system_url(&self) -> String {
        format!("{}/api/system", self.config.base_url)
    }

    fn info_url(&self) -> String {
        format!("{}/api/system/info", self.config.base_url)
    }

    /// Fetch the raw system info document.
    ///
    /// Accepts both the bare info object and an `{ "info": {...} }` wrapper.
    ///
    /// # Returns
    /// - `Ok(SystemInfo)` on a 2xx response with parseable JSON.
    /// - `Err(DeviceError::Connect | Timeout)` when the request cannot complete.
    /// - `Err(DeviceError::Http)` on a non-2xx status.
    /// - `Err(DeviceError::Json)` when required fields are missing.
    pub async fn system_info(&self) -> Result<SystemInfo, DeviceError> {
        let url = self.info_url();
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        if !resp.status().is_success() {
            return Err(DeviceError::Http { status: resp.status().as_u16(), url });
        }

        let bytes = resp.bytes().await.map_err(|e| DeviceError::Json {
            field: "body".into(),
            detail: e.to_string(),
        })?;

        parse_info(&bytes)
    }
}

impl DeviceClient for HttpDeviceClient {
    async fn apply_config(&self, point: OperatingPoint) -> Result<(), DeviceError> {
        let url = self.system_url();
        let patch = SystemPatch::for_point(point, self.config.auto_fan_speed);
        debug!(%url, freq_mhz = patch.frequency, core_mv = patch.core_voltage, "patching device");

        let resp = self
            .client
            .patch(&url)
            .json(&patch)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        if !resp.status().is_success() {
            return Err(DeviceError::Http { status: resp.status().as_u16(), url });
        }
        Ok(())
    }

    async fn read_telemetry(&self) -> Result<TelemetrySample, DeviceError> {
        let info = self.system_info().await?;
        Ok(info.to_sample())
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> DeviceError {
    if e.is_timeout() {
        DeviceError::Timeout { url: url.to_string() }
    } else {
        DeviceError::Connect { url: url.to_string(), detail: e.to_string() }
    }
}

/// Parse a system info body, bare or wrapped.
pub fn parse_info(bytes: &[u8]) -> Result<SystemInfo, DeviceError> {
    if let Ok(info) = serde_json::from_slice::<SystemInfo>(bytes) {
        return Ok(info);
    }

    #[derive(Deserialize)]
    struct Wrapped {
        info: SystemInfo,
    }

    serde_json::from_slice::<Wrapped>(bytes)
        .map(|w| w.info)
        .map_err(|e| DeviceError::Json {
            field: "info".into(),
            detail: e.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`HttpDeviceClient`].
///
/// # Example
/// ```rust,ignore
/// let device = HttpDeviceClient::builder("http://192.168.1.50")
///     .request_timeout(Duration::from_secs(5))
///     .build();
/// ```
pub struct HttpDeviceClientBuilder {
    config: DeviceConfig,
}

impl HttpDeviceClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { config: DeviceConfig::new(base_url) }
    }

    /// Override the TCP connect timeout (default 3 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Override the per-request timeout (default 10 s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set or clear the `autoFanSpeed` flag sent with each patch.
    pub fn auto_fan_speed(mut self, enabled: Option<bool>) -> Self {
        self.config.auto_fan_speed = enabled;
        self
    }

    pub fn build(self) -> HttpDeviceClient {
        // reqwest::Client::builder() can fail in extreme environments, but
        // unwrap_or_default() falls back to a default client instead of panicking.
        let client = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout)
            .build()
            .unwrap_or_default();

        HttpDeviceClient { config: self.config, client }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let c = HttpDeviceClient::builder("http://10.0.0.2").build();
        assert_eq!(c.config().connect_timeout, Duration::from_secs(3));
        assert_eq!(c.config().request_timeout, Duration::from_secs(10));
        assert_eq!(c.config().auto_fan_speed, Some(true));
    }

    #[test]
    fn test_builder_overrides() {
        let c = HttpDeviceClient::builder("http://10.0.0.2")
            .connect_timeout(Duration::from_secs(1))
            .request_timeout(Duration::from_secs(4))
            .auto_fan_speed(None)
            .build();
        assert_eq!(c.config().connect_timeout, Duration::from_secs(1));
        assert_eq!(c.config().request_timeout, Duration::from_secs(4));
        assert!(c.config().auto_fan_speed.is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let c = HttpDeviceClient::builder("http://10.0.0.2/").build();
        assert_eq!(c.info_url(), "http://10.0.0.2/api/system/info");
        assert_eq!(c.system_url(), "http://10.0.0.2/api/system");
    }

    #[test]
    fn test_parse_info_accepts_wrapped_shape() {
        let info = parse_info(br#"{"info": {"hashRate": 10.0, "temp": 40.0}}"#).unwrap();
        assert_eq!(info.hash_rate, 10.0);
    }

    #[test]
    fn test_parse_info_reports_json_error() {
        match parse_info(b"not json") {
            Err(DeviceError::Json { field, .. }) => assert_eq!(field, "info"),
            other => panic!("expected Json error, got {other:?}"),
        }
    }

    #[test]
    fn test_device_error_display() {
        let e = DeviceError::Connect { url: "http://a".into(), detail: "refused".into() };
        let s = e.to_string();
        assert!(s.contains("http://a") && s.contains("refused"), "{s}");
        let e = DeviceError::Timeout { url: "http://a/api".into() };
        assert!(e.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_unreachable_device_is_transport_error() {
        // Port 9 (discard) on localhost is closed on test machines.
        let c = HttpDeviceClient::builder("http://127.0.0.1:9")
            .connect_timeout(Duration::from_millis(500))
            .request_timeout(Duration::from_secs(1))
            .build();
        let err = c.read_telemetry().await.unwrap_err();
        assert!(
            matches!(err, DeviceError::Connect { .. } | DeviceError::Timeout { .. }),
            "{err:?}"
        );
    }
}
