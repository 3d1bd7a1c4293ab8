//! Bluetooth functionality for the sensor bridge
//! This module handles all bluetooth operations including scanning,
//! connecting, negotiating GATT services and routing sensor notifications.

pub mod bluest_transport;
pub mod connection;
pub mod constants;
pub mod distance;
pub mod error;
pub mod manager;
#[cfg(test)]
mod mock;
pub mod negotiator;
pub mod notification;
pub mod scanner;
pub mod session;
pub mod transport;
pub mod types;

// Re-export types that should be publicly accessible
pub use bluest_transport::BluestTransport;
pub use connection::{ConnectOutcome, ConnectionManager};
pub use constants::*; // Re-export all constants
pub use distance::{estimate_distance, estimate_distance_default, format_distance};
pub use error::{BleError, DecodeError, TransportError};
pub use manager::{run_event_loop, BluetoothManager, ConnectReport};
pub use negotiator::{NegotiationReport, ServiceNegotiator};
pub use notification::{
    DecodingHandler, HandlerRegistration, NotificationRouter, RouteOutcome, SensorReading,
    ValueHandler,
};
pub use scanner::{AutoConnectFilter, BluetoothScanner, ScanOptions, ScanStart, ScanState};
pub use session::{Session, SessionReader};
pub use transport::{event_channel, BleTransport, EventReceiver, EventSender};
pub use types::{
    AdapterState, ConnectionState, DeviceView, PeripheralRecord, Subscription, TransportEvent,
    ValueUpdate,
};
