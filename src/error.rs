//! Error types shared by the hub core.

use thiserror::Error;

/// Decode outcome for a single line read from a modem.
///
/// None of these are fatal: the read loop logs them and moves on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Start or end marker is missing. Usually firmware chatter.
    #[error("line is not a frame")]
    NotAFrame,

    /// Markers are present but the inner text is not a JSON object.
    #[error("malformed frame payload: {0}")]
    MalformedPayload(String),

    /// JSON object carries no usable `type` field.
    #[error("frame payload has no type discriminator")]
    MissingDiscriminator,
}

/// Errors raised by device and message stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("serial port {0} is already assigned to another device")]
    DuplicateSerialPort(String),

    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors surfaced by the registry and connection APIs.
#[derive(Debug, Error)]
pub enum HubError {
    /// Command issued against a device that has no running connection.
    #[error("device {0} is not online")]
    DeviceNotOnline(String),

    /// Selection found no enabled, online device.
    #[error("no device available")]
    NoDeviceAvailable,

    #[error("device {0} not found")]
    DeviceNotFound(String),

    #[error("invalid device: {0}")]
    InvalidDevice(String),

    #[error("serial port {0} is already in use")]
    SerialPortInUse(String),

    #[error("device {0} is already running")]
    AlreadyRunning(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("transport failure on {port}: {reason}")]
    Transport { port: String, reason: String },

    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl HubError {
    pub fn transport(port: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        HubError::Transport {
            port: port.into(),
            reason: reason.to_string(),
        }
    }
}

pub type HubResult<T> = Result<T, HubError>;
