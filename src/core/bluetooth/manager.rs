//! Bluetooth manager for the sensor bridge
//! This module provides the main interface for bluetooth operations: it owns
//! the pipeline stages, consumes the transport's events and exposes the
//! listing and the action entry points to the front end.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::config::bluetooth_config::ScanConfig;
use crate::config::AppConfig;
use crate::core::bluetooth::connection::{ConnectOutcome, ConnectionManager};
use crate::core::bluetooth::distance::estimate_distance;
use crate::core::bluetooth::error::BleError;
use crate::core::bluetooth::negotiator::{NegotiationReport, ServiceNegotiator};
use crate::core::bluetooth::notification::{
    HandlerRegistration, NotificationRouter, RouteOutcome, ValueHandler,
};
use crate::core::bluetooth::scanner::{BluetoothScanner, Discovery, ScanStart, ScanState};
use crate::core::bluetooth::session::SessionReader;
use crate::core::bluetooth::transport::{BleTransport, EventReceiver};
use crate::core::bluetooth::types::{
    AdapterState, ConnectionState, DeviceView, PeripheralRecord, Subscription, TransportEvent,
};

/// Result of a connect request, one entry per pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectReport {
    pub device_id: String,
    pub outcome: ConnectOutcome,
    /// `None` when the device already was connected and nothing was negotiated
    pub negotiation: Option<Result<NegotiationReport, BleError>>,
}

/// Manages Bluetooth operations
pub struct BluetoothManager<T: BleTransport> {
    transport: Arc<T>,
    scanner: BluetoothScanner<T>,
    connections: ConnectionManager<T>,
    negotiator: ServiceNegotiator<T>,
    router: NotificationRouter,
    scan_config: ScanConfig,
    tx_power: i16,
    /// Names read from the device name characteristic, by device id
    resolved_names: HashMap<String, String>,
    adapter_state: AdapterState,
    /// Discovered set handed out by the last completed scan
    last_enumeration: Vec<PeripheralRecord>,
    /// Number of completed scans, published on every `StopScan`
    completions: watch::Sender<usize>,
}

impl<T: BleTransport> BluetoothManager<T> {
    /// Creates a new BluetoothManager
    pub fn new(transport: Arc<T>, config: &AppConfig) -> Self {
        let scanner = BluetoothScanner::new(
            transport.clone(),
            config.auto_connect.filter(),
            config.scan.clear_on_start,
        );
        let connections =
            ConnectionManager::new(transport.clone(), config.connection.connect_timeout());
        let negotiator = ServiceNegotiator::new(
            transport.clone(),
            connections.session(),
            config.gatt.device_name_characteristic,
            config.gatt.sensor_characteristics.iter().copied(),
        );
        let router = NotificationRouter::new(connections.session());

        Self {
            transport,
            scanner,
            connections,
            negotiator,
            router,
            scan_config: config.scan.clone(),
            tx_power: config.distance.tx_power,
            resolved_names: HashMap::new(),
            adapter_state: AdapterState::Unknown,
            last_enumeration: Vec::new(),
            completions: watch::Sender::new(0),
        }
    }

    /// Bring the radio up. Must succeed before scanning.
    pub async fn initialize(&mut self) -> Result<(), BleError> {
        match self.transport.enable_radio().await {
            Ok(()) => {
                self.adapter_state = AdapterState::Available;
                Ok(())
            }
            Err(e) => {
                error!("Bluetooth adapter is not available: {}", e);
                self.adapter_state = AdapterState::Unavailable;
                Err(BleError::AdapterUnavailable(e.to_string()))
            }
        }
    }

    /// Scans with the configured options
    pub async fn start_scan(&mut self) -> Result<ScanStart, BleError> {
        let options = self.scan_config.scan_options();
        let start = self.scanner.start_scan(&options).await?;
        if start == ScanStart::Started {
            self.forget_stale_devices().await;
        }
        Ok(start)
    }

    /// Drop state of devices that left the discovered set, except the current one
    async fn forget_stale_devices(&mut self) {
        let mut keep: Vec<String> = self.scanner.devices().iter().map(|d| d.id.clone()).collect();
        if let Some(current) = self.current_device() {
            keep.push(current);
        }
        self.connections.retain(&keep);
        self.resolved_names.retain(|id, _| keep.contains(id));
        self.transport.retain_devices(&keep).await;
    }

    /// Connects to a device with the given ID and negotiates its services
    pub async fn connect(&mut self, device_id: &str) -> Result<ConnectReport, BleError> {
        let prior = self
            .connections
            .snapshot()
            .current_id()
            .filter(|prior| *prior != device_id)
            .map(str::to_string);

        let result = self.connections.connect(device_id).await;

        if let Some(prior) = prior {
            if !self.connections.snapshot().is_connected_to(&prior) {
                self.router.deactivate_device(&prior);
            }
        }

        let outcome = result?;
        let negotiation = match outcome {
            ConnectOutcome::AlreadyConnected => None,
            ConnectOutcome::Connected => Some(self.negotiate(device_id).await),
        };

        Ok(ConnectReport {
            device_id: device_id.to_string(),
            outcome,
            negotiation,
        })
    }

    async fn negotiate(&mut self, device_id: &str) -> Result<NegotiationReport, BleError> {
        let report = self.negotiator.discover(device_id).await.inspect_err(|e| {
            error!("Negotiation with {} failed: {}", device_id, e);
        })?;

        if let Some(name) = &report.device_name {
            self.resolved_names.insert(device_id.to_string(), name.clone());
        }
        self.router.activate(report.subscriptions.iter().cloned());
        Ok(report)
    }

    /// Disconnects the current device, if there is one
    pub async fn disconnect(&mut self) -> Result<(), BleError> {
        let Some(current) = self.current_device() else {
            info!("No device connected");
            return Ok(());
        };
        self.disconnect_device(&current).await
    }

    /// Disconnects `device_id`, which must be the current device
    pub async fn disconnect_device(&mut self, device_id: &str) -> Result<(), BleError> {
        let result = self.connections.disconnect(device_id).await;
        if !matches!(result, Err(BleError::NotCurrentDevice(_))) {
            self.router.deactivate_device(device_id);
        }
        result
    }

    /// Disconnects `device_id` when it is current, connects to it otherwise
    pub async fn toggle_connection(
        &mut self,
        device_id: &str,
    ) -> Result<Option<ConnectReport>, BleError> {
        if self.connections.snapshot().current_id() == Some(device_id) {
            self.disconnect_device(device_id).await?;
            Ok(None)
        } else {
            self.connect(device_id).await.map(Some)
        }
    }

    /// Apply one transport event
    pub async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::DiscoverPeripheral(record) => self.on_discover(record).await,
            TransportEvent::StopScan => self.on_stop_scan().await,
            TransportEvent::DisconnectPeripheral(id) => {
                if self.connections.on_peripheral_disconnected(&id).await {
                    info!("Current device {} dropped the connection", id);
                }
                if !self.connections.snapshot().is_connected_to(&id) {
                    self.router.deactivate_device(&id);
                }
            }
            TransportEvent::CharacteristicValueUpdate(update) => match self.router.route(&update) {
                RouteOutcome::Delivered => {}
                RouteOutcome::DecodeFailed(e) => warn!("{}", e),
                outcome => debug!(
                    "Update for {} from {} not delivered: {:?}",
                    update.characteristic_uuid, update.device_id, outcome
                ),
            },
            TransportEvent::AdapterStateChanged(state) => {
                info!("Bluetooth adapter state: {:?}", state);
                self.adapter_state = state;
                if state == AdapterState::Unavailable {
                    if let Some(id) = self.connections.on_adapter_unavailable() {
                        warn!("Adapter went away, dropping session with {}", id);
                        self.router.deactivate_device(&id);
                    }
                }
            }
        }
    }

    async fn on_discover(&mut self, record: PeripheralRecord) {
        let id = record.id.clone();
        let discovery = self.scanner.on_discover(record);
        if discovery == Discovery::Ignored {
            return;
        }
        self.connections.remember(&id);

        if discovery.wants_auto_connect() {
            if let Some(current) = self.current_device() {
                debug!("Not auto-connecting to {}, {} is current", id, current);
                return;
            }
            info!("Auto-connecting to {}", id);
            if let Err(e) = self.connect(&id).await {
                error!("Auto-connect to {} failed: {}", id, e);
            }
        }
    }

    async fn on_stop_scan(&mut self) {
        self.last_enumeration = self.scanner.on_stop_scan();
        self.completions.send_replace(self.scanner.completed_scans());
        for record in &self.last_enumeration {
            debug!(
                "{} {:?} RSSI {}",
                record.id, record.name, record.signal_strength
            );
        }

        if self.last_enumeration.is_empty() && self.scan_config.rescan_if_empty {
            info!("No devices found, scanning again");
            if let Err(e) = self.start_scan().await {
                error!("Rescan failed: {}", e);
            }
        }
    }

    /// Install the handler for a characteristic's value pushes
    pub fn register_handler(
        &mut self,
        characteristic: Uuid,
        handler: impl ValueHandler + 'static,
    ) -> HandlerRegistration {
        self.router.register(characteristic, handler)
    }

    /// Discovered devices in discovery order, for listing
    pub fn devices(&self) -> Vec<DeviceView> {
        let session = self.connections.snapshot();
        self.scanner
            .devices()
            .iter()
            .map(|record| DeviceView {
                record: record.clone(),
                resolved_name: self.resolved_names.get(&record.id).cloned(),
                distance: estimate_distance(record.signal_strength, self.tx_power),
                is_current: session.current_id() == Some(record.id.as_str()),
            })
            .filter(|view| !self.scan_config.hide_unnamed || view.display_name().is_some())
            .collect()
    }

    /// Estimated distance of a discovered device from its latest RSSI
    pub fn distance(&self, device_id: &str) -> Option<f64> {
        self.scanner
            .record(device_id)
            .map(|record| estimate_distance(record.signal_strength, self.tx_power))
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connections.snapshot().connection_state()
    }

    pub fn current_device(&self) -> Option<String> {
        self.connections.snapshot().current_id().map(str::to_string)
    }

    pub fn session(&self) -> SessionReader {
        self.connections.session()
    }

    pub fn scan_state(&self) -> ScanState {
        self.scanner.state()
    }

    pub fn adapter_state(&self) -> AdapterState {
        self.adapter_state
    }

    pub fn last_enumeration(&self) -> &[PeripheralRecord] {
        &self.last_enumeration
    }

    pub fn completed_scans(&self) -> usize {
        self.scanner.completed_scans()
    }

    /// Changes whenever a scan completes
    pub fn scan_completions(&self) -> watch::Receiver<usize> {
        self.completions.subscribe()
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        self.router.subscriptions()
    }
}

/// Feed transport events into the manager until the transport goes away
pub async fn run_event_loop<T: BleTransport>(
    manager: Arc<Mutex<BluetoothManager<T>>>,
    mut events: EventReceiver,
) {
    while let Some(event) = events.recv().await {
        manager.lock().await.handle_event(event).await;
    }
    info!("Transport event channel closed");
}
