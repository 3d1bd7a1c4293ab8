pub mod bluetooth_config;

use std::path::Path;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::bluetooth_config::{
    AutoConnectConfig, ConnectionConfig, DistanceConfig, GattConfig, ScanConfig,
};
use crate::utils::ensure_directory_exists;

pub const CONFIG_FILE_NAME: &str = "ble-sensor-bridge.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Used when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub auto_connect: AutoConnectConfig,
    pub connection: ConnectionConfig,
    pub gatt: GattConfig,
    pub distance: DistanceConfig,
    pub logging: LogConfig,
}

impl AppConfig {
    /// Loads the config from a configuration file.
    pub async fn load_config(path: impl AsRef<Path>) -> Result<Self> {
        let file_path = path.as_ref();

        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the current config to a configuration file.
    pub async fn save_config(&self, path: impl AsRef<Path>) -> Result<()> {
        let file_path = path.as_ref();
        if let Some(config_dir) = file_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            ensure_directory_exists(config_dir).await?;
        }

        let config_json = match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;

        info!("Config saved to {:?}.", file_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::{UUID_DEVICE_NAME, UUID_HUMIDITY, UUID_TEMPERATURE};
    use std::path::PathBuf;
    use std::time::Duration;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("ble-sensor-bridge-config-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.scan.scan_options().duration, Duration::from_secs(5));
        assert!(config.scan.allow_duplicates);
        assert!(config.scan.service_uuids.is_empty());
        assert_eq!(config.auto_connect.names, vec!["JDY-23".to_string()]);
        assert_eq!(config.auto_connect.ids, vec!["12:6C:14:38:F5:40".to_string()]);
        assert_eq!(config.connection.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.gatt.device_name_characteristic, UUID_DEVICE_NAME);
        assert_eq!(config.gatt.sensor_characteristics, vec![UUID_TEMPERATURE, UUID_HUMIDITY]);
        assert_eq!(config.distance.tx_power, -59);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "scan": { "duration_secs": 12, "service_uuids": ["0000181a-0000-1000-8000-00805f9b34fb"] },
                 "distance": { "tx_power": -65 } }"#,
        )
        .unwrap();

        assert_eq!(config.scan.duration_secs, 12);
        assert_eq!(config.scan.service_uuids.len(), 1);
        assert!(config.scan.hide_unnamed);
        assert_eq!(config.distance.tx_power, -65);
        assert_eq!(config.gatt, GattConfig::default());
    }

    #[tokio::test]
    async fn test_missing_file_yields_default() {
        let config = AppConfig::load_config(temp_path("missing.json")).await.unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let path = temp_path("saved.json");
        let mut config = AppConfig::default();
        config.auto_connect.names = vec!["Thermo".to_string()];
        config.scan.rescan_if_empty = true;

        config.save_config(&path).await.unwrap();
        let loaded = AppConfig::load_config(&path).await.unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_invalid_json_is_an_error() {
        let path = temp_path("invalid.json");
        ensure_directory_exists(path.parent().unwrap()).await.unwrap();
        fs::write(&path, "{ not json").await.unwrap();

        assert!(AppConfig::load_config(&path).await.is_err());
        let _ = std::fs::remove_file(&path);
    }
}
