//! Defines shared data structures for the Bluetooth module.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Represents a discovered peripheral
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeripheralRecord {
    /// Platform-specific unique identifier for the device, stable per adapter
    pub id: String,
    /// The advertised name of the device, if available
    pub name: Option<String>,
    /// MAC address extracted from the id, when the platform exposes one
    pub address: Option<String>,
    /// The signal strength (RSSI) in dBm, 0 when unknown
    pub signal_strength: i16,
    /// When the device was last reported by the adapter
    pub last_seen: DateTime<Utc>,
}

impl PeripheralRecord {
    /// Creates a new PeripheralRecord seen now
    pub fn new(id: impl Into<String>, name: Option<String>, signal_strength: i16) -> Self {
        Self {
            id: id.into(),
            name,
            address: None,
            signal_strength,
            last_seen: Utc::now(),
        }
    }

    pub fn with_address(mut self, address: Option<String>) -> Self {
        self.address = address;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AdapterState {
    #[default]
    Unknown,
    Available,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CharacteristicDescriptor {
    pub uuid: Uuid,
    pub supports_read: bool,
    pub supports_notify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    pub uuid: Uuid,
    /// Characteristics in the order the platform reported them
    pub characteristics: Vec<CharacteristicDescriptor>,
}

/// The GATT tree of a connected device, services in platform order
pub type ServiceTree = Vec<ServiceDescriptor>;

/// A standing notification subscription on one characteristic of one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub device_id: String,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub active: bool,
}

/// A characteristic value pushed by a peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueUpdate {
    pub device_id: String,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub value: Vec<u8>,
}

/// Events delivered by the transport, in emission order per kind
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    DiscoverPeripheral(PeripheralRecord),
    StopScan,
    DisconnectPeripheral(String),
    CharacteristicValueUpdate(ValueUpdate),
    AdapterStateChanged(AdapterState),
}

/// A device as presented for listing
#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    pub record: PeripheralRecord,
    /// Name read from the device name characteristic, if any
    pub resolved_name: Option<String>,
    pub distance: f64,
    pub is_current: bool,
}

impl DeviceView {
    /// The GATT name when one was read, otherwise the advertised name
    pub fn display_name(&self) -> Option<&str> {
        self.resolved_name
            .as_deref()
            .or(self.record.name.as_deref())
    }
}
