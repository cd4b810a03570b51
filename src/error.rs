//! Error types for acquisition, decoding, persistence and device setup

use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

use crate::acquisition::SessionState;
use crate::channel::Channel;

/// A raw reading that cannot be turned into a sample
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected {expected} bytes, got {actual}")]
    UnexpectedLength { expected: usize, actual: usize },
}

/// Failure reported by a channel source for a single read
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelReadError {
    #[error("read failed: {0}")]
    Read(String),

    #[error("read timed out")]
    Timeout,

    #[error("device disconnected")]
    Disconnected,
}

/// The output file could not be written
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid destination path: {}", .0.display())]
    InvalidPath(PathBuf),
}

/// Errors that end an acquisition session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquisitionError {
    #[error("connection lost on tick {tick} while reading channel {channel}")]
    ConnectionLost { tick: u64, channel: Channel },

    #[error("session already left the idle state ({0:?})")]
    NotIdle(SessionState),
}

/// Errors raised while finding and connecting to the device
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("no Bluetooth adapter found")]
    NoAdapter,

    #[error("device '{0}' not found")]
    DeviceNotFound(String),

    #[error("characteristic {uuid} for channel {channel} not found")]
    MissingCharacteristic { channel: Channel, uuid: Uuid },

    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),
}

/// Errors while reading configuration values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}
