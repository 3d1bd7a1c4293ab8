//! BLE sensor bridge library
//! Discovers BLE peripherals, connects to one, subscribes to its sensor
//! characteristics and estimates distance from signal strength.

// Module declarations
pub mod config;
pub mod core;
pub mod logging;
pub mod state;
pub mod utils;
