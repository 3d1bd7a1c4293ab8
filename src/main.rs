use std::env;
use std::path::Path;

use anyhow::Result;
use log::{error, info, warn};

use ble_sensor_bridge_lib::config::{AppConfig, CONFIG_FILE_NAME};
use ble_sensor_bridge_lib::core::bluetooth::{format_distance, DecodeError, ValueUpdate};
use ble_sensor_bridge_lib::{logging, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = env::args().nth(1).unwrap_or_else(|| CONFIG_FILE_NAME.to_string());
    let config = AppConfig::load_config(&config_path).await?;

    if logging::init(&config.logging).is_err() {
        env_logger::builder()
            .filter_level(log::LevelFilter::Info)
            .init();
    }
    if !Path::new(&config_path).exists() {
        warn!("Config file not found at {:?}, using default.", config_path);
    }

    let app_state = AppState::new(config.clone()).await?;
    let manager = app_state.get_bluetooth_manager_arc();

    let _registrations = {
        let mut manager = manager.lock().await;
        let registrations: Vec<_> = config
            .gatt
            .sensor_characteristics
            .iter()
            .map(|&characteristic| {
                manager.register_handler(characteristic, |update: &ValueUpdate| -> Result<(), DecodeError> {
                    info!(
                        "{} {}: {:02x?}",
                        update.device_id, update.characteristic_uuid, update.value
                    );
                    Ok(())
                })
            })
            .collect();
        registrations
    };

    let mut completions = {
        let mut manager = manager.lock().await;
        let completions = manager.scan_completions();
        manager.start_scan().await?;
        completions
    };

    tokio::select! {
        changed = completions.changed() => {
            if changed.is_ok() {
                for device in manager.lock().await.devices() {
                    println!(
                        "{:<40} {:<24} {:>5} dBm {:>10}{}",
                        device.record.id,
                        device.display_name().unwrap_or("(unnamed)"),
                        device.record.signal_strength,
                        format_distance(device.distance),
                        if device.is_current { "  *" } else { "" }
                    );
                }
            }
            tokio::signal::ctrl_c().await?;
        }
        result = tokio::signal::ctrl_c() => result?,
    }

    info!("Shutting down");
    if let Err(e) = app_state.shutdown().await {
        error!("Disconnect on shutdown failed: {}", e);
    }
    Ok(())
}
