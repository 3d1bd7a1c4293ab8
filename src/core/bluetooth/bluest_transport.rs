//! [`BleTransport`] implementation on top of the `bluest` crate.
//!
//! Scans and notification streams run as background tasks that publish
//! [`TransportEvent`]s; every task is tied to a [`CancellationToken`] so a
//! new scan or a disconnect tears the old ones down.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bluest::{Adapter, AdapterEvent, Characteristic, Device};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::error::TransportError;
use crate::core::bluetooth::transport::{event_channel, BleTransport, EventReceiver, EventSender};
use crate::core::bluetooth::types::{
    AdapterState, CharacteristicDescriptor, PeripheralRecord, ServiceDescriptor, ServiceTree,
    TransportEvent, ValueUpdate,
};
use crate::utils::extract_mac_address;

type CharacteristicKey = (String, Uuid, Uuid);

pub struct BluestTransport {
    adapter: Adapter,
    events: EventSender,
    /// Devices seen while scanning, by id
    devices: Arc<Mutex<HashMap<String, Device>>>,
    /// Characteristic handles resolved by the last service discovery
    characteristics: Mutex<HashMap<CharacteristicKey, Characteristic>>,
    /// Parent token of each device's notification tasks
    notifications: Mutex<HashMap<String, CancellationToken>>,
    scan_token: Mutex<Option<CancellationToken>>,
    shutdown: CancellationToken,
}

impl BluestTransport {
    /// Open the default adapter. Events are delivered on the returned receiver.
    pub async fn new() -> Result<(Self, EventReceiver), TransportError> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| TransportError::Other("No Bluetooth adapter found".to_string()))?;
        let (events, receiver) = event_channel();
        let shutdown = CancellationToken::new();

        tokio::spawn(Self::watch_adapter(
            adapter.clone(),
            events.clone(),
            shutdown.clone(),
        ));

        let transport = Self {
            adapter,
            events,
            devices: Arc::new(Mutex::new(HashMap::new())),
            characteristics: Mutex::new(HashMap::new()),
            notifications: Mutex::new(HashMap::new()),
            scan_token: Mutex::new(None),
            shutdown,
        };
        Ok((transport, receiver))
    }

    async fn watch_adapter(adapter: Adapter, events: EventSender, shutdown: CancellationToken) {
        let mut stream = match adapter.events().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Adapter state events unavailable: {}", e);
                return;
            }
        };
        loop {
            tokio::select! {
                event = stream.next() => {
                    let state = match event {
                        Some(Ok(AdapterEvent::Available)) => AdapterState::Available,
                        Some(Ok(AdapterEvent::Unavailable)) => AdapterState::Unavailable,
                        Some(Err(e)) => {
                            error!("Error in adapter event stream: {}", e);
                            break;
                        }
                        None => break,
                    };
                    if events.send(TransportEvent::AdapterStateChanged(state)).is_err() {
                        break;
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
        debug!("Adapter event stream ended");
    }

    #[allow(clippy::too_many_arguments)]
    async fn scan_task(
        adapter: Adapter,
        service_uuids: Vec<Uuid>,
        duration: Duration,
        allow_duplicates: bool,
        devices: Arc<Mutex<HashMap<String, Device>>>,
        events: EventSender,
        cancel_token: CancellationToken,
        ready: oneshot::Sender<Result<(), TransportError>>,
    ) {
        let mut scan_stream = match adapter.scan(&service_uuids).await {
            Ok(stream) => {
                let _ = ready.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready.send(Err(e.into()));
                return;
            }
        };

        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        let mut seen = HashSet::new();

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    let Some(discovered) = result else {
                        info!("Bluetooth scan stream has ended.");
                        break;
                    };
                    let device = discovered.device;
                    let id = device.id().to_string();
                    if !allow_duplicates && !seen.insert(id.clone()) {
                        continue;
                    }
                    let name = discovered
                        .adv_data
                        .local_name
                        .or_else(|| device.name().ok())
                        .filter(|name| !name.is_empty());
                    let record = PeripheralRecord::new(id.clone(), name, discovered.rssi.unwrap_or(0))
                        .with_address(extract_mac_address(&id));
                    debug!("Found device - ID: {}, RSSI: {:?}", id, discovered.rssi);

                    devices.lock().await.insert(id, device);
                    if events.send(TransportEvent::DiscoverPeripheral(record)).is_err() {
                        break;
                    }
                }
                _ = &mut deadline => {
                    info!("Scan duration of {:?} elapsed", duration);
                    break;
                }
                _ = cancel_token.cancelled() => {
                    info!("Scan cancelled");
                    break;
                }
            }
        }

        drop(scan_stream);
        let _ = events.send(TransportEvent::StopScan);
    }

    async fn notification_task(
        characteristic: Characteristic,
        device: Device,
        device_id: String,
        service_uuid: Uuid,
        events: EventSender,
        cancel_token: CancellationToken,
        ready: oneshot::Sender<Result<(), TransportError>>,
    ) {
        let characteristic_uuid = characteristic.uuid();
        let mut notification_stream = match characteristic.notify().await {
            Ok(stream) => {
                let _ = ready.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready.send(Err(e.into()));
                return;
            }
        };

        info!("Listening for notifications on {}...", characteristic_uuid);
        loop {
            tokio::select! {
                result = notification_stream.next() => match result {
                    Some(Ok(value)) => {
                        let update = ValueUpdate {
                            device_id: device_id.clone(),
                            service_uuid,
                            characteristic_uuid,
                            value,
                        };
                        if events.send(TransportEvent::CharacteristicValueUpdate(update)).is_err() {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        error!("Error in notification stream: {}", e);
                        break;
                    }
                    None => break,
                },
                _ = cancel_token.cancelled() => return,
            }
        }

        drop(notification_stream);
        info!("Notification stream for {} ended", characteristic_uuid);
        if !device.is_connected().await {
            let _ = events.send(TransportEvent::DisconnectPeripheral(device_id));
        }
    }

    async fn device(&self, id: &str) -> Result<Device, TransportError> {
        self.devices
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TransportError::UnknownDevice(id.to_string()))
    }

    async fn characteristic(
        &self,
        id: &str,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
    ) -> Result<Characteristic, TransportError> {
        self.characteristics
            .lock()
            .await
            .get(&(id.to_string(), service_uuid, characteristic_uuid))
            .cloned()
            .ok_or(TransportError::UnknownCharacteristic {
                service: service_uuid,
                characteristic: characteristic_uuid,
            })
    }
}

impl Drop for BluestTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl BleTransport for BluestTransport {
    async fn enable_radio(&self) -> Result<(), TransportError> {
        self.adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");
        Ok(())
    }

    async fn start_scan(
        &self,
        service_uuids: &[Uuid],
        duration: Duration,
        allow_duplicates: bool,
    ) -> Result<(), TransportError> {
        let cancel_token = self.shutdown.child_token();
        if let Some(previous) = self.scan_token.lock().await.replace(cancel_token.clone()) {
            previous.cancel();
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(Self::scan_task(
            self.adapter.clone(),
            service_uuids.to_vec(),
            duration,
            allow_duplicates,
            self.devices.clone(),
            self.events.clone(),
            cancel_token,
            ready_tx,
        ));

        ready_rx
            .await
            .map_err(|_| TransportError::Other("scan task ended before starting".to_string()))?
    }

    async fn connect(&self, id: &str) -> Result<(), TransportError> {
        let device = self.device(id).await?;
        if !device.is_connected().await {
            self.adapter.connect_device(&device).await?;
        }
        Ok(())
    }

    async fn disconnect(&self, id: &str) -> Result<(), TransportError> {
        if let Some(token) = self.notifications.lock().await.remove(id) {
            token.cancel();
        }
        self.characteristics
            .lock()
            .await
            .retain(|(device_id, _, _), _| device_id != id);

        let device = self.device(id).await?;
        if device.is_connected().await {
            self.adapter.disconnect_device(&device).await?;
        } else {
            info!("Device {} not connected", id);
        }
        Ok(())
    }

    async fn is_connected(&self, id: &str) -> Result<bool, TransportError> {
        Ok(self.device(id).await?.is_connected().await)
    }

    async fn retain_devices(&self, keep: &[String]) {
        let mut devices = self.devices.lock().await;
        let before = devices.len();
        devices.retain(|id, _| keep.contains(id));
        debug!("Forgot {} stale device handle(s)", before - devices.len());
        drop(devices);

        self.characteristics
            .lock()
            .await
            .retain(|(device_id, _, _), _| keep.contains(device_id));
    }

    async fn retrieve_service_tree(&self, id: &str) -> Result<ServiceTree, TransportError> {
        let device = self.device(id).await?;
        let mut tree = Vec::new();
        let mut resolved = HashMap::new();

        for service in device.services().await? {
            let service_uuid = service.uuid();
            let mut characteristics = Vec::new();
            for characteristic in service.characteristics().await? {
                let properties = characteristic.properties().await?;
                let uuid = characteristic.uuid();
                characteristics.push(CharacteristicDescriptor {
                    uuid,
                    supports_read: properties.read,
                    supports_notify: properties.notify || properties.indicate,
                });
                resolved.insert((id.to_string(), service_uuid, uuid), characteristic);
            }
            debug!("Available service: {}", service_uuid);
            tree.push(ServiceDescriptor {
                uuid: service_uuid,
                characteristics,
            });
        }

        self.characteristics.lock().await.extend(resolved);
        Ok(tree)
    }

    async fn read(
        &self,
        id: &str,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
    ) -> Result<Vec<u8>, TransportError> {
        let characteristic = self.characteristic(id, service_uuid, characteristic_uuid).await?;
        Ok(characteristic.read().await?)
    }

    async fn enable_notification(
        &self,
        id: &str,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
    ) -> Result<(), TransportError> {
        let characteristic = self.characteristic(id, service_uuid, characteristic_uuid).await?;
        let device = self.device(id).await?;
        let cancel_token = self
            .notifications
            .lock()
            .await
            .entry(id.to_string())
            .or_insert_with(|| self.shutdown.child_token())
            .child_token();

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(Self::notification_task(
            characteristic,
            device,
            id.to_string(),
            service_uuid,
            self.events.clone(),
            cancel_token,
            ready_tx,
        ));

        ready_rx
            .await
            .map_err(|_| TransportError::Other("notification task ended before subscribing".to_string()))?
    }
}
