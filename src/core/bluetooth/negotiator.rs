//! GATT negotiation after a connection is established.
//!
//! Walks the service tree once and, per characteristic, either reads it once
//! (device name), subscribes to it (configured sensors) or leaves it alone.
//! Only the tree retrieval itself can fail the negotiation; every per
//! characteristic failure is recorded and the walk continues.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::core::bluetooth::error::BleError;
use crate::core::bluetooth::session::SessionReader;
use crate::core::bluetooth::transport::BleTransport;
use crate::core::bluetooth::types::{CharacteristicDescriptor, Subscription};

/// What the static routing table says to do with a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacteristicAction {
    ReadName,
    Subscribe,
    Ignore,
}

/// Outcome of a successful negotiation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NegotiationReport {
    pub device_name: Option<String>,
    pub subscriptions: Vec<Subscription>,
    /// Non-fatal failures, in the order they happened
    pub failures: Vec<BleError>,
    pub ignored: usize,
}

pub struct ServiceNegotiator<T: BleTransport> {
    transport: Arc<T>,
    session: SessionReader,
    name_characteristic: Uuid,
    sensor_characteristics: HashSet<Uuid>,
}

impl<T: BleTransport> ServiceNegotiator<T> {
    pub fn new(
        transport: Arc<T>,
        session: SessionReader,
        name_characteristic: Uuid,
        sensor_characteristics: impl IntoIterator<Item = Uuid>,
    ) -> Self {
        Self {
            transport,
            session,
            name_characteristic,
            sensor_characteristics: sensor_characteristics.into_iter().collect(),
        }
    }

    pub fn classify(&self, characteristic: Uuid) -> CharacteristicAction {
        if characteristic == self.name_characteristic {
            CharacteristicAction::ReadName
        } else if self.sensor_characteristics.contains(&characteristic) {
            CharacteristicAction::Subscribe
        } else {
            CharacteristicAction::Ignore
        }
    }

    /// Negotiate the services of the connected device `id`
    pub async fn discover(&self, id: &str) -> Result<NegotiationReport, BleError> {
        if !self.session.snapshot().is_connected_to(id) {
            return Err(BleError::DiscoveryFailed(format!("{} is not connected", id)));
        }

        info!("Connection successful, discovering services of {}...", id);
        let services = self
            .transport
            .retrieve_service_tree(id)
            .await
            .map_err(|e| BleError::DiscoveryFailed(e.to_string()))?;

        let mut report = NegotiationReport::default();
        for service in &services {
            debug!("Service {} has {} characteristic(s)", service.uuid, service.characteristics.len());
            for characteristic in &service.characteristics {
                self.negotiate(id, service.uuid, characteristic, &mut report).await;
            }
        }

        info!(
            "Negotiated {}: {} subscription(s), {} failure(s), {} ignored",
            id,
            report.subscriptions.len(),
            report.failures.len(),
            report.ignored
        );
        Ok(report)
    }

    async fn negotiate(
        &self,
        id: &str,
        service_uuid: Uuid,
        characteristic: &CharacteristicDescriptor,
        report: &mut NegotiationReport,
    ) {
        let uuid = characteristic.uuid;
        match self.classify(uuid) {
            CharacteristicAction::Ignore => report.ignored += 1,
            CharacteristicAction::ReadName if !characteristic.supports_read => {
                warn!("Name characteristic {} is not readable", uuid);
                report.failures.push(BleError::ReadFailed {
                    characteristic: uuid,
                    reason: "characteristic does not support read".to_string(),
                });
            }
            CharacteristicAction::ReadName => {
                match self.transport.read(id, service_uuid, uuid).await {
                    Ok(bytes) => {
                        let name = bytes_to_string(&bytes);
                        info!("Device name of {}: {}", id, name);
                        report.device_name = Some(name);
                    }
                    Err(e) => {
                        warn!("Error during BLE read of {}: {}", uuid, e);
                        report.failures.push(BleError::ReadFailed {
                            characteristic: uuid,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            CharacteristicAction::Subscribe if !characteristic.supports_notify => {
                warn!("Sensor characteristic {} does not support notify", uuid);
                report.failures.push(BleError::NotificationSetupFailed {
                    characteristic: uuid,
                    reason: "characteristic does not support notify".to_string(),
                });
            }
            CharacteristicAction::Subscribe => {
                match self.transport.enable_notification(id, service_uuid, uuid).await {
                    Ok(()) => {
                        info!("Notification started for characteristic: {}", uuid);
                        report.subscriptions.push(Subscription {
                            device_id: id.to_string(),
                            service_uuid,
                            characteristic_uuid: uuid,
                            active: true,
                        });
                    }
                    Err(e) => {
                        warn!("Notification error on {}: {}", uuid, e);
                        report.failures.push(BleError::NotificationSetupFailed {
                            characteristic: uuid,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// One byte per character, no multi-byte decoding
pub fn bytes_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
