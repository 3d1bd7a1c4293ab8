//! Bluetooth connection handling
//! This module owns the per-device connection state machine and is the only
//! writer of the current-device session.
//!
//! `Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected`,
//! with any failed attempt falling back to `Disconnected`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use crate::core::bluetooth::error::{BleError, TransportError};
use crate::core::bluetooth::session::{Session, SessionReader, SessionWriter};
use crate::core::bluetooth::transport::BleTransport;
use crate::core::bluetooth::types::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new link was established and services should be negotiated
    Connected,
    /// The device already was the connected current device
    AlreadyConnected,
}

/// Connection manager for peripherals
pub struct ConnectionManager<T: BleTransport> {
    transport: Arc<T>,
    session: SessionWriter,
    /// Every device we know about, with its state
    states: HashMap<String, ConnectionState>,
    connect_timeout: Duration,
}

impl<T: BleTransport> ConnectionManager<T> {
    pub fn new(transport: Arc<T>, connect_timeout: Duration) -> Self {
        Self {
            transport,
            session: SessionWriter::new(),
            states: HashMap::new(),
            connect_timeout,
        }
    }

    /// Make a device known so it can be connected to
    pub fn remember(&mut self, id: &str) {
        self.states
            .entry(id.to_string())
            .or_insert(ConnectionState::Disconnected);
    }

    pub fn state(&self, id: &str) -> ConnectionState {
        self.states.get(id).copied().unwrap_or_default()
    }

    pub fn session(&self) -> SessionReader {
        self.session.reader()
    }

    pub fn snapshot(&self) -> Session {
        self.session.snapshot()
    }

    /// Connect to a known device, releasing the current one first
    pub async fn connect(&mut self, id: &str) -> Result<ConnectOutcome, BleError> {
        if !self.states.contains_key(id) {
            error!("Refusing to connect to unknown device {}", id);
            return Err(BleError::ConnectionFailed(format!("unknown device {}", id)));
        }

        let snapshot = self.session.snapshot();
        if snapshot.is_connected_to(id) {
            info!("Device {} already connected.", id);
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        if let Some(prior) = snapshot.current_id().filter(|prior| *prior != id) {
            info!("Releasing {} before connecting to {}", prior, id);
            if let Err(e) = self.disconnect(prior).await {
                warn!("Releasing {} failed: {}", prior, e);
            }
        }

        info!("Initiating connection to {}...", id);
        self.transition(id, ConnectionState::Connecting);

        let result = match tokio::time::timeout(self.connect_timeout, self.transport.connect(id)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };

        match result {
            Ok(()) => {
                self.transition(id, ConnectionState::Connected);
                info!("Connected to {}", id);
                Ok(ConnectOutcome::Connected)
            }
            Err(e) => {
                self.transition(id, ConnectionState::Disconnected);
                error!("Connection to {} failed: {}", id, e);
                Err(BleError::ConnectionFailed(e.to_string()))
            }
        }
    }

    /// Disconnect the current device. Any other id is rejected.
    pub async fn disconnect(&mut self, id: &str) -> Result<(), BleError> {
        if self.session.snapshot().current_id() != Some(id) {
            return Err(BleError::NotCurrentDevice(id.to_string()));
        }

        info!("Disconnecting from device {}", id);
        self.transition(id, ConnectionState::Disconnecting);
        let result = self.transport.disconnect(id).await;
        self.transition(id, ConnectionState::Disconnected);

        result.map_err(|e| {
            warn!("Disconnect from {} reported an error: {}", id, e);
            BleError::ConnectionFailed(e.to_string())
        })?;
        info!("Successfully disconnected");
        Ok(())
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.states.contains_key(id)
    }

    /// Forget every device not in `keep`. The current device is always kept.
    pub fn retain(&mut self, keep: &[String]) {
        let current = self.session.snapshot().current_id().map(str::to_string);
        self.states
            .retain(|id, _| keep.contains(id) || current.as_deref() == Some(id.as_str()));
    }

    /// The platform reported the link to `id` as gone. Returns true if the
    /// current session ended because of it.
    ///
    /// The event may belong to an earlier link to the same device, so the
    /// transport is asked first; a live link is left alone.
    pub async fn on_peripheral_disconnected(&mut self, id: &str) -> bool {
        if self.session.snapshot().current_id() != Some(id) {
            if let Some(state) = self.states.get_mut(id) {
                *state = ConnectionState::Disconnected;
            }
            return false;
        }

        match self.transport.is_connected(id).await {
            Ok(true) => {
                warn!("Ignoring stale disconnect of {}, the link is up", id);
                return false;
            }
            Ok(false) => {}
            Err(e) => warn!("Could not query link state of {}: {}", id, e),
        }

        info!("Device {} disconnected", id);
        self.transition(id, ConnectionState::Disconnected);
        true
    }

    /// The adapter went away; the current device, if any, is gone with it
    pub fn on_adapter_unavailable(&mut self) -> Option<String> {
        let id = self.session.snapshot().current_id()?.to_string();
        self.transition(&id, ConnectionState::Disconnected);
        Some(id)
    }

    fn transition(&mut self, id: &str, state: ConnectionState) {
        self.states.insert(id.to_string(), state);
        match state {
            ConnectionState::Disconnected => self.session.clear(),
            _ => self.session.set(id, state),
        }
    }
}
