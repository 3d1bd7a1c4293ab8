//! The "current device" session.
//!
//! Only [`ConnectionManager`](super::ConnectionManager) owns a [`SessionWriter`].
//! Every other component holds a [`SessionReader`] and works on a snapshot
//! taken at the start of an operation.

use serde::Serialize;
use tokio::sync::watch;

use crate::core::bluetooth::types::ConnectionState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentDevice {
    pub id: String,
    pub state: ConnectionState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    current: Option<CurrentDevice>,
}

impl Session {
    pub fn current(&self) -> Option<&CurrentDevice> {
        self.current.as_ref()
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_ref().map(|device| device.id.as_str())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.current
            .as_ref()
            .map(|device| device.state)
            .unwrap_or_default()
    }

    /// True when `id` is the current device and the link is up
    pub fn is_connected_to(&self, id: &str) -> bool {
        matches!(
            &self.current,
            Some(CurrentDevice { id: current, state: ConnectionState::Connected }) if current == id
        )
    }
}

pub struct SessionWriter {
    tx: watch::Sender<Session>,
}

impl SessionWriter {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(Session::default());
        Self { tx }
    }

    pub(crate) fn set(&self, id: &str, state: ConnectionState) {
        self.tx.send_replace(Session {
            current: Some(CurrentDevice {
                id: id.to_string(),
                state,
            }),
        });
    }

    pub(crate) fn clear(&self) {
        self.tx.send_replace(Session::default());
    }

    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn reader(&self) -> SessionReader {
        SessionReader {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Clone)]
pub struct SessionReader {
    rx: watch::Receiver<Session>,
}

impl SessionReader {
    pub fn snapshot(&self) -> Session {
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readers_see_writer_updates() {
        let writer = SessionWriter::new();
        let reader = writer.reader();
        assert_eq!(reader.snapshot().connection_state(), ConnectionState::Disconnected);

        writer.set("AA:BB", ConnectionState::Connected);
        let snapshot = reader.snapshot();
        assert!(snapshot.is_connected_to("AA:BB"));
        assert!(!snapshot.is_connected_to("CC:DD"));

        writer.clear();
        assert!(snapshot.is_connected_to("AA:BB"), "snapshots are immutable");
        assert_eq!(reader.snapshot().current(), None);
    }

    #[test]
    fn test_connecting_is_not_connected() {
        let writer = SessionWriter::new();
        writer.set("AA:BB", ConnectionState::Connecting);
        let snapshot = writer.snapshot();
        assert_eq!(snapshot.current_id(), Some("AA:BB"));
        assert!(!snapshot.is_connected_to("AA:BB"));
    }
}
