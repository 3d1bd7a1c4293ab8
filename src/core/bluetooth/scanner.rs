//! Scan lifecycle and the discovered-device set.
//!
//! `Idle -> Scanning -> Idle`. The transport's `StopScan` event is the only
//! thing that ends a scan.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use uuid::Uuid;

use crate::core::bluetooth::constants::DEFAULT_SCAN_DURATION_SECS;
use crate::core::bluetooth::error::BleError;
use crate::core::bluetooth::transport::BleTransport;
use crate::core::bluetooth::types::PeripheralRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    /// Only report peripherals advertising one of these services; empty for all
    pub service_uuids: Vec<Uuid>,
    /// Advisory, the platform decides when the scan really stops
    pub duration: Duration,
    /// Keep refreshing signal strength of already discovered peripherals
    pub allow_duplicates: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            service_uuids: Vec::new(),
            duration: Duration::from_secs(DEFAULT_SCAN_DURATION_SECS),
            allow_duplicates: true,
        }
    }
}

/// Allow-list of peripherals to connect to as soon as they are discovered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutoConnectFilter {
    names: Vec<String>,
    ids: Vec<String>,
}

impl AutoConnectFilter {
    pub fn new(names: Vec<String>, ids: Vec<String>) -> Self {
        Self { names, ids }
    }

    pub fn matches(&self, record: &PeripheralRecord) -> bool {
        let name_matches = record
            .name
            .as_ref()
            .is_some_and(|name| self.names.iter().any(|wanted| wanted == name));

        let id_matches = self.ids.iter().any(|wanted| {
            wanted.eq_ignore_ascii_case(&record.id)
                || record
                    .address
                    .as_ref()
                    .is_some_and(|address| wanted.eq_ignore_ascii_case(address))
        });

        name_matches || id_matches
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStart {
    Started,
    AlreadyScanning,
}

/// What a discovery event did to the discovered set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    New { auto_connect: bool },
    /// A known device advertised its name for the first time
    Named { auto_connect: bool },
    Updated,
    Duplicate,
    /// No scan is running
    Ignored,
}

impl Discovery {
    /// The allow-list matched on this event
    pub fn wants_auto_connect(self) -> bool {
        matches!(
            self,
            Discovery::New { auto_connect: true } | Discovery::Named { auto_connect: true }
        )
    }
}

pub struct BluetoothScanner<T: BleTransport> {
    transport: Arc<T>,
    state: ScanState,
    /// Discovered peripherals in discovery order
    devices: Vec<PeripheralRecord>,
    allow_duplicates: bool,
    clear_on_start: bool,
    auto_connect: AutoConnectFilter,
    completed_scans: usize,
}

impl<T: BleTransport> BluetoothScanner<T> {
    pub fn new(transport: Arc<T>, auto_connect: AutoConnectFilter, clear_on_start: bool) -> Self {
        Self {
            transport,
            state: ScanState::Idle,
            devices: Vec::new(),
            allow_duplicates: false,
            clear_on_start,
            auto_connect,
            completed_scans: 0,
        }
    }

    /// Ask the adapter to begin discovery. A no-op while a scan is running.
    pub async fn start_scan(&mut self, options: &ScanOptions) -> Result<ScanStart, BleError> {
        if self.state == ScanState::Scanning {
            debug!("Scan already running, ignoring start request");
            return Ok(ScanStart::AlreadyScanning);
        }

        self.transport
            .start_scan(
                &options.service_uuids,
                options.duration,
                options.allow_duplicates,
            )
            .await
            .map_err(|e| {
                error!("Failed to start scan: {}", e);
                BleError::ScanStartFailed(e.to_string())
            })?;

        if self.clear_on_start {
            self.devices.clear();
        }
        self.allow_duplicates = options.allow_duplicates;
        self.state = ScanState::Scanning;
        info!(
            "Scan is started ({:?}, services: {:?}, duplicates: {})",
            options.duration, options.service_uuids, options.allow_duplicates
        );
        Ok(ScanStart::Started)
    }

    /// Merge a discovery event into the discovered set. Only applies while scanning.
    pub fn on_discover(&mut self, record: PeripheralRecord) -> Discovery {
        if self.state != ScanState::Scanning {
            debug!("Ignoring discovery of {} outside a scan", record.id);
            return Discovery::Ignored;
        }

        if let Some(existing) = self.devices.iter_mut().find(|d| d.id == record.id) {
            // the local name often only comes with a later advertisement
            let named = existing.name.is_none() && record.name.is_some();
            if named {
                info!("{} is named {:?}", record.id, record.name);
                existing.name = record.name;
                if existing.address.is_none() {
                    existing.address = record.address;
                }
            }
            if !self.allow_duplicates {
                return if named {
                    Discovery::Named {
                        auto_connect: self.auto_connect.matches(existing),
                    }
                } else {
                    Discovery::Duplicate
                };
            }
            debug!(
                "Updated {} RSSI {} -> {}",
                record.id, existing.signal_strength, record.signal_strength
            );
            existing.signal_strength = record.signal_strength;
            existing.last_seen = record.last_seen;
            if named {
                return Discovery::Named {
                    auto_connect: self.auto_connect.matches(existing),
                };
            }
            return Discovery::Updated;
        }

        let auto_connect = self.auto_connect.matches(&record);
        info!(
            "Discovered: {} ({:?}) RSSI {}",
            record.id, record.name, record.signal_strength
        );
        self.devices.push(record);
        Discovery::New { auto_connect }
    }

    /// The scan has ended. Returns the discovered set for downstream consumers.
    pub fn on_stop_scan(&mut self) -> Vec<PeripheralRecord> {
        self.state = ScanState::Idle;
        self.completed_scans += 1;
        info!("Scan is stopped, {} device(s) discovered", self.devices.len());
        self.devices.clone()
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn devices(&self) -> &[PeripheralRecord] {
        &self.devices
    }

    pub fn record(&self, id: &str) -> Option<&PeripheralRecord> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Number of scans that reached `StopScan`
    pub fn completed_scans(&self) -> usize {
        self.completed_scans
    }
}
