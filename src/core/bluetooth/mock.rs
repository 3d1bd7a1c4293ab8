//! Scripted transport used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::bluetooth::error::TransportError;
use crate::core::bluetooth::transport::BleTransport;
use crate::core::bluetooth::types::{CharacteristicDescriptor, ServiceDescriptor, ServiceTree};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    EnableRadio,
    StartScan {
        service_uuids: Vec<Uuid>,
        duration: Duration,
        allow_duplicates: bool,
    },
    Connect(String),
    Disconnect(String),
    IsConnected(String),
    RetrieveServiceTree(String),
    Read {
        id: String,
        service: Uuid,
        characteristic: Uuid,
    },
    EnableNotification {
        id: String,
        service: Uuid,
        characteristic: Uuid,
    },
}

#[derive(Default)]
struct Script {
    calls: Vec<Call>,
    radio_off: bool,
    scan_failure: Option<String>,
    failing_connects: HashSet<String>,
    connect_delay: Option<Duration>,
    failing_disconnects: HashSet<String>,
    trees: HashMap<String, ServiceTree>,
    reads: HashMap<Uuid, Vec<u8>>,
    failing_reads: HashSet<Uuid>,
    failing_notifications: HashSet<Uuid>,
    /// Ids with a live link
    connected: HashSet<String>,
    retained: Option<Vec<String>>,
}

#[derive(Default)]
pub struct MockTransport {
    script: Mutex<Script>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    pub fn set_radio_off(&self) {
        self.script.lock().unwrap().radio_off = true;
    }

    pub fn fail_scan(&self, reason: &str) {
        self.script.lock().unwrap().scan_failure = Some(reason.to_string());
    }

    pub fn fail_connect(&self, id: &str) {
        self.script.lock().unwrap().failing_connects.insert(id.to_string());
    }

    pub fn delay_connect(&self, delay: Duration) {
        self.script.lock().unwrap().connect_delay = Some(delay);
    }

    pub fn fail_disconnect(&self, id: &str) {
        self.script.lock().unwrap().failing_disconnects.insert(id.to_string());
    }

    pub fn set_tree(&self, id: &str, tree: ServiceTree) {
        self.script.lock().unwrap().trees.insert(id.to_string(), tree);
    }

    pub fn set_read(&self, characteristic: Uuid, value: &[u8]) {
        self.script.lock().unwrap().reads.insert(characteristic, value.to_vec());
    }

    pub fn fail_read(&self, characteristic: Uuid) {
        self.script.lock().unwrap().failing_reads.insert(characteristic);
    }

    pub fn fail_notification(&self, characteristic: Uuid) {
        self.script.lock().unwrap().failing_notifications.insert(characteristic);
    }

    /// The peripheral drops the link on its own
    pub fn drop_link(&self, id: &str) {
        self.script.lock().unwrap().connected.remove(id);
    }

    /// Ids passed to the last `retain_devices` call
    pub fn retained(&self) -> Option<Vec<String>> {
        self.script.lock().unwrap().retained.clone()
    }

    fn record(&self, call: Call) {
        self.script.lock().unwrap().calls.push(call);
    }
}

/// A service whose characteristics support both read and notify
pub fn service(uuid: Uuid, characteristics: &[Uuid]) -> ServiceDescriptor {
    ServiceDescriptor {
        uuid,
        characteristics: characteristics
            .iter()
            .map(|&uuid| CharacteristicDescriptor {
                uuid,
                supports_read: true,
                supports_notify: true,
            })
            .collect(),
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    async fn enable_radio(&self) -> Result<(), TransportError> {
        self.record(Call::EnableRadio);
        if self.script.lock().unwrap().radio_off {
            return Err(TransportError::Other("radio off".to_string()));
        }
        Ok(())
    }

    async fn start_scan(
        &self,
        service_uuids: &[Uuid],
        duration: Duration,
        allow_duplicates: bool,
    ) -> Result<(), TransportError> {
        self.record(Call::StartScan {
            service_uuids: service_uuids.to_vec(),
            duration,
            allow_duplicates,
        });
        match self.script.lock().unwrap().scan_failure.clone() {
            Some(reason) => Err(TransportError::Other(reason)),
            None => Ok(()),
        }
    }

    async fn connect(&self, id: &str) -> Result<(), TransportError> {
        self.record(Call::Connect(id.to_string()));
        let (delay, fails) = {
            let script = self.script.lock().unwrap();
            (script.connect_delay, script.failing_connects.contains(id))
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fails {
            return Err(TransportError::Other("peripheral unreachable".to_string()));
        }
        self.script.lock().unwrap().connected.insert(id.to_string());
        Ok(())
    }

    async fn disconnect(&self, id: &str) -> Result<(), TransportError> {
        self.record(Call::Disconnect(id.to_string()));
        let mut script = self.script.lock().unwrap();
        if script.failing_disconnects.contains(id) {
            return Err(TransportError::Other("link busy".to_string()));
        }
        script.connected.remove(id);
        Ok(())
    }

    async fn is_connected(&self, id: &str) -> Result<bool, TransportError> {
        self.record(Call::IsConnected(id.to_string()));
        Ok(self.script.lock().unwrap().connected.contains(id))
    }

    async fn retain_devices(&self, keep: &[String]) {
        self.script.lock().unwrap().retained = Some(keep.to_vec());
    }

    async fn retrieve_service_tree(&self, id: &str) -> Result<ServiceTree, TransportError> {
        self.record(Call::RetrieveServiceTree(id.to_string()));
        self.script
            .lock()
            .unwrap()
            .trees
            .get(id)
            .cloned()
            .ok_or_else(|| TransportError::UnknownDevice(id.to_string()))
    }

    async fn read(
        &self,
        id: &str,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
    ) -> Result<Vec<u8>, TransportError> {
        self.record(Call::Read {
            id: id.to_string(),
            service: service_uuid,
            characteristic: characteristic_uuid,
        });
        let script = self.script.lock().unwrap();
        if script.failing_reads.contains(&characteristic_uuid) {
            return Err(TransportError::Timeout);
        }
        Ok(script
            .reads
            .get(&characteristic_uuid)
            .cloned()
            .unwrap_or_default())
    }

    async fn enable_notification(
        &self,
        id: &str,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
    ) -> Result<(), TransportError> {
        self.record(Call::EnableNotification {
            id: id.to_string(),
            service: service_uuid,
            characteristic: characteristic_uuid,
        });
        if self
            .script
            .lock()
            .unwrap()
            .failing_notifications
            .contains(&characteristic_uuid)
        {
            return Err(TransportError::UnknownCharacteristic {
                service: service_uuid,
                characteristic: characteristic_uuid,
            });
        }
        Ok(())
    }
}
