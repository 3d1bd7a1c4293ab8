//! Application state management
//! This module defines and manages the global application state.

use std::sync::Arc;

use anyhow::Result;
use log::info;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::core::bluetooth::{run_event_loop, BluestTransport};
use crate::core::BluetoothManager;

/// Global application state
pub struct AppState {
    /// The Bluetooth manager instance
    pub bluetooth_manager: Arc<Mutex<BluetoothManager<BluestTransport>>>,
    pub config: AppConfig,
    event_loop: JoinHandle<()>,
}

impl AppState {
    /// Opens the default adapter and starts consuming its events
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing BluetoothManager...");
        let (transport, events) = BluestTransport::new().await?;
        let mut manager = BluetoothManager::new(Arc::new(transport), &config);
        manager.initialize().await?;

        let bluetooth_manager = Arc::new(Mutex::new(manager));
        let event_loop = tokio::spawn(run_event_loop(bluetooth_manager.clone(), events));

        Ok(Self {
            bluetooth_manager,
            config,
            event_loop,
        })
    }

    /// Gets a reference to the Bluetooth manager
    pub fn get_bluetooth_manager_arc(&self) -> Arc<Mutex<BluetoothManager<BluestTransport>>> {
        self.bluetooth_manager.clone()
    }

    /// Disconnects the current device and stops processing events
    pub async fn shutdown(self) -> Result<()> {
        let result = self.bluetooth_manager.lock().await.disconnect().await;
        self.event_loop.abort();
        result?;
        Ok(())
    }
}
