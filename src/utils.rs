use std::path::Path;

use anyhow::Result;
use log::{error, info};
use regex::Regex;
use tokio::fs;

/// Asynchronously ensures that a directory exists, creating it if it does not.
/// This function is idempotent.
pub async fn ensure_directory_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        if let Err(e) = fs::create_dir_all(path).await {
            error!("Failed to create directory at {:?}: {}", path, e);
            return Err(e.into());
        }
        info!("Created directory at: {:?}", path);
    }
    Ok(())
}

/// Pull a MAC address out of a platform device id.
///
/// Handles `AA:BB:..`, `AA-BB-..` and the BlueZ `dev_AA_BB_..` form; the
/// result is upper case and colon separated.
pub fn extract_mac_address(device_id: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:_-]){5}([0-9A-Fa-f]{2})").ok()?;
    re.find_iter(device_id)
        .last()
        .map(|m| m.as_str().replace(['-', '_'], ":").to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_mac_address() {
        assert_eq!(
            extract_mac_address("12:6c:14:38:f5:40").as_deref(),
            Some("12:6C:14:38:F5:40")
        );
        assert_eq!(
            extract_mac_address("hci0/dev_12_6C_14_38_F5_40").as_deref(),
            Some("12:6C:14:38:F5:40")
        );
        assert_eq!(
            extract_mac_address("BluetoothLE#BluetoothLE00:1a:7d:da:71:13-12-6c-14-38-f5-40").as_deref(),
            Some("12:6C:14:38:F5:40")
        );
        assert_eq!(extract_mac_address("5E1F0C2A-7B7A-4C8B-9C21-1D2E3F4A5B6C"), None);
    }

    #[tokio::test]
    async fn test_ensure_directory_exists_is_idempotent() {
        let dir = std::env::temp_dir().join(format!("ble-sensor-bridge-utils-{}", std::process::id()));
        ensure_directory_exists(&dir).await.unwrap();
        ensure_directory_exists(&dir).await.unwrap();
        assert!(dir.is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
