//! Polling logger for a four-channel BLE wearable.
//!
//! A session reads channels A to D from a connected peripheral at a fixed
//! rate, decodes each 3-byte reading, keeps complete rows in memory, and
//! periodically rewrites them to a CSV file.
//!
//! - [`ChannelSource`]: the device being polled ([`BleChannelSource`] over btleplug)
//! - [`decode`]: raw reading to sample
//! - [`SampleBuffer`]: complete rows for the session
//! - [`CsvWriter`]: atomic full-file rewrite of the buffer
//! - [`Acquisition`]: the paced loop tying them together

pub mod acquisition;
pub mod ble;
pub mod buffer;
pub mod channel;
pub mod config;
pub mod decoder;
pub mod error;
pub mod persistence;
pub mod source;

pub use acquisition::{Acquisition, SessionReport, SessionState};
pub use ble::BleChannelSource;
pub use buffer::{SampleBuffer, SampleRow};
pub use channel::{Channel, ChannelMap};
pub use config::{AcquisitionConfig, DeviceConfig};
pub use decoder::decode;
pub use error::{
    AcquisitionError, ChannelReadError, ConfigError, DecodeError, PersistenceError, SetupError,
};
pub use persistence::CsvWriter;
pub use source::ChannelSource;
