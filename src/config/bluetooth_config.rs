use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    DEFAULT_AUTO_CONNECT_ID, DEFAULT_AUTO_CONNECT_NAME, DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_SCAN_DURATION_SECS, DEFAULT_TX_POWER, UUID_DEVICE_NAME, UUID_HUMIDITY,
    UUID_TEMPERATURE,
};
use crate::core::bluetooth::{AutoConnectFilter, ScanOptions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Service filter; empty scans for every peripheral
    pub service_uuids: Vec<Uuid>,
    pub duration_secs: u64,
    pub allow_duplicates: bool,
    /// Forget previously discovered devices when a new scan starts
    pub clear_on_start: bool,
    /// Start another scan when one finishes without finding anything
    pub rescan_if_empty: bool,
    /// Leave devices without any name out of the listing
    pub hide_unnamed: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            service_uuids: Vec::new(),
            duration_secs: DEFAULT_SCAN_DURATION_SECS,
            allow_duplicates: true,
            clear_on_start: true,
            rescan_if_empty: false,
            hide_unnamed: true,
        }
    }
}

impl ScanConfig {
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            service_uuids: self.service_uuids.clone(),
            duration: Duration::from_secs(self.duration_secs),
            allow_duplicates: self.allow_duplicates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoConnectConfig {
    pub names: Vec<String>,
    /// Device ids or MAC addresses, compared case-insensitively
    pub ids: Vec<String>,
}

impl Default for AutoConnectConfig {
    fn default() -> Self {
        Self {
            names: vec![DEFAULT_AUTO_CONNECT_NAME.to_string()],
            ids: vec![DEFAULT_AUTO_CONNECT_ID.to_string()],
        }
    }
}

impl AutoConnectConfig {
    pub fn filter(&self) -> AutoConnectFilter {
        AutoConnectFilter::new(self.names.clone(), self.ids.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GattConfig {
    /// Read once after connecting to resolve the device name
    pub device_name_characteristic: Uuid,
    /// Subscribed to after connecting
    pub sensor_characteristics: Vec<Uuid>,
}

impl Default for GattConfig {
    fn default() -> Self {
        Self {
            device_name_characteristic: UUID_DEVICE_NAME,
            sensor_characteristics: vec![UUID_TEMPERATURE, UUID_HUMIDITY],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceConfig {
    /// Expected RSSI at one metre, in dBm
    pub tx_power: i16,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            tx_power: DEFAULT_TX_POWER,
        }
    }
}
