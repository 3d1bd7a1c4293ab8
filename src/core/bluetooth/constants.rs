//! Constants used throughout the bluetooth module
//! This module contains the well-known GATT identifiers, timeouts and
//! default values the pipeline falls back to when nothing is configured.

use uuid::Uuid;

/// Standard Bluetooth Service UUIDs
pub const UUID_GENERIC_ACCESS_SERVICE: Uuid = Uuid::from_u128(0x00001800_0000_1000_8000_00805f9b34fb);
pub const UUID_ENVIRONMENTAL_SENSING_SERVICE: Uuid = Uuid::from_u128(0x0000181a_0000_1000_8000_00805f9b34fb);

/// Standard Bluetooth Characteristic UUIDs
pub const UUID_DEVICE_NAME: Uuid = Uuid::from_u128(0x00002a00_0000_1000_8000_00805f9b34fb);
pub const UUID_TEMPERATURE: Uuid = Uuid::from_u128(0x00002a6e_0000_1000_8000_00805f9b34fb);
pub const UUID_HUMIDITY: Uuid = Uuid::from_u128(0x00002a6f_0000_1000_8000_00805f9b34fb);

/// Calibrated signal strength at one metre, in dBm
pub const DEFAULT_TX_POWER: i16 = -59;

/// Returned by the distance estimator when no signal strength is available
pub const DISTANCE_UNAVAILABLE: f64 = -1.0;

/// Timeout for a connect attempt in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Scan duration in seconds
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 5;

/// Peripherals connected to automatically when discovered
pub const DEFAULT_AUTO_CONNECT_NAME: &str = "JDY-23";
pub const DEFAULT_AUTO_CONNECT_ID: &str = "12:6C:14:38:F5:40";
