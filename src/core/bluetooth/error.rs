//! Error types for the bluetooth pipeline.
//!
//! [`TransportError`] is what an adapter binding returns. Each component
//! converts it into the [`BleError`] variant of the stage that issued the call,
//! so callers always learn which step of the pipeline failed.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Platform(#[from] bluest::Error),

    #[error("operation timed out")]
    Timeout,

    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("unknown characteristic {characteristic} in service {service}")]
    UnknownCharacteristic { service: Uuid, characteristic: Uuid },

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BleError {
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("Scan could not be started: {0}")]
    ScanStartFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Device {0} is not the current device")]
    NotCurrentDevice(String),

    #[error("Service discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("Read of {characteristic} failed: {reason}")]
    ReadFailed { characteristic: Uuid, reason: String },

    #[error("Enabling notifications on {characteristic} failed: {reason}")]
    NotificationSetupFailed { characteristic: Uuid, reason: String },

    #[error("Decoding {characteristic} failed: {reason}")]
    DecodeFailed { characteristic: Uuid, reason: String },
}

/// Returned by a payload decoder that cannot make sense of the bytes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct DecodeError(pub String);

impl DecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}
