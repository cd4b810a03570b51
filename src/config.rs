//! Session and device configuration.
//!
//! Defaults describe the bench setup: 100 Hz polling, a save every ten
//! seconds, and the `EvansSpO2` wearable. Any value can be overridden from
//! the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::channel::ChannelMap;
use crate::error::ConfigError;

pub const DEFAULT_SAMPLING_HZ: f64 = 100.0;
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_OUTPUT_PATH: &str = "ble_data_output.csv";
pub const DEFAULT_DEVICE_NAME: &str = "EvansSpO2";
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_OUTPUT: &str = "BLE_LOGGER_OUTPUT";
pub const ENV_RATE_HZ: &str = "BLE_LOGGER_RATE_HZ";
pub const ENV_SAVE_SECS: &str = "BLE_LOGGER_SAVE_SECS";
pub const ENV_TIMESTAMPS: &str = "BLE_LOGGER_TIMESTAMPS";
pub const ENV_DEVICE: &str = "BLE_LOGGER_DEVICE";
pub const ENV_SCAN_SECS: &str = "BLE_LOGGER_SCAN_SECS";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "BLE_LOGGER_CONNECT_TIMEOUT_SECS";

#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Target time between tick starts.
    pub sampling_period: Duration,
    /// Minimum wall-clock time between scheduled saves.
    pub save_interval: Duration,
    pub output_path: PathBuf,
    /// Prefix each output line with the capture time.
    pub timestamp_column: bool,
    pub channels: ChannelMap,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sampling_period: Duration::from_secs_f64(1.0 / DEFAULT_SAMPLING_HZ),
            save_interval: DEFAULT_SAVE_INTERVAL,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            timestamp_column: false,
            channels: ChannelMap::default(),
        }
    }
}

impl AcquisitionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay the defaults with whatever `lookup` returns for each key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_OUTPUT) {
            if path.trim().is_empty() {
                return Err(invalid(ENV_OUTPUT, &path, "path is empty"));
            }
            config.output_path = PathBuf::from(path);
        }
        if let Some(value) = lookup(ENV_RATE_HZ) {
            let hz = parse_positive(ENV_RATE_HZ, &value)?;
            config.sampling_period = Duration::from_secs_f64(1.0 / hz);
        }
        if let Some(value) = lookup(ENV_SAVE_SECS) {
            config.save_interval = Duration::from_secs_f64(parse_positive(ENV_SAVE_SECS, &value)?);
        }
        if let Some(value) = lookup(ENV_TIMESTAMPS) {
            config.timestamp_column = parse_flag(ENV_TIMESTAMPS, &value)?;
        }

        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Advertised local name of the peripheral.
    pub device_name: String,
    pub scan_duration: Duration,
    /// Bounds connection setup and every single read.
    pub connect_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            scan_duration: DEFAULT_SCAN_DURATION,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl DeviceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_DEVICE) {
            if name.is_empty() {
                return Err(invalid(ENV_DEVICE, &name, "name is empty"));
            }
            config.device_name = name;
        }
        if let Some(value) = lookup(ENV_SCAN_SECS) {
            config.scan_duration = Duration::from_secs_f64(parse_positive(ENV_SCAN_SECS, &value)?);
        }
        if let Some(value) = lookup(ENV_CONNECT_TIMEOUT_SECS) {
            config.connect_timeout =
                Duration::from_secs_f64(parse_positive(ENV_CONNECT_TIMEOUT_SECS, &value)?);
        }

        Ok(config)
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<f64, ConfigError> {
    let parsed: f64 = value
        .trim()
        .parse()
        .map_err(|err: std::num::ParseFloatError| invalid(key, value, &err.to_string()))?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return Err(invalid(key, value, "must be a positive number"));
    }
    Ok(parsed)
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        v if v.eq_ignore_ascii_case("true") => Ok(true),
        v if v.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(invalid(key, value, "expected true/false or 1/0")),
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
