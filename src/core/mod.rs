//! Core functionality for the sensor bridge
//! This module contains the BLE central pipeline.

pub mod bluetooth;

// Re-export commonly used types
pub use bluetooth::{BluetoothManager, BluestTransport};
