//! Transport capability the pipeline is built on.
//!
//! A binding implements [`BleTransport`] for one adapter library and feeds
//! [`TransportEvent`]s into the channel created by [`event_channel`]. Results of
//! issued operations come back from the trait methods; anything unsolicited
//! (discoveries, scan end, disconnects, value pushes) comes through the channel.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::bluetooth::error::TransportError;
use crate::core::bluetooth::types::{ServiceTree, TransportEvent};

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Create the channel a transport publishes its events on
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[async_trait]
pub trait BleTransport: Send + Sync + 'static {
    /// Make sure the radio is powered and usable
    async fn enable_radio(&self) -> Result<(), TransportError>;

    /// Begin discovery. The platform decides when the scan actually stops and
    /// reports it with [`TransportEvent::StopScan`].
    async fn start_scan(
        &self,
        service_uuids: &[Uuid],
        duration: Duration,
        allow_duplicates: bool,
    ) -> Result<(), TransportError>;

    async fn connect(&self, id: &str) -> Result<(), TransportError>;

    async fn disconnect(&self, id: &str) -> Result<(), TransportError>;

    /// Whether the platform currently has a link to `id`
    async fn is_connected(&self, id: &str) -> Result<bool, TransportError>;

    /// Drop every cached peripheral handle except those in `keep`
    async fn retain_devices(&self, keep: &[String]);

    async fn retrieve_service_tree(&self, id: &str) -> Result<ServiceTree, TransportError>;

    async fn read(
        &self,
        id: &str,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
    ) -> Result<Vec<u8>, TransportError>;

    /// Subscribe to value pushes; they arrive as
    /// [`TransportEvent::CharacteristicValueUpdate`].
    async fn enable_notification(
        &self,
        id: &str,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
    ) -> Result<(), TransportError>;
}
