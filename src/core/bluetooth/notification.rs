//! Notification routing
//! This module delivers characteristic value pushes to the handler registered
//! for the characteristic, provided an active subscription exists for it.
//!
//! Handlers are registered once and stay in place; [`HandlerRegistration`]
//! removes its handler when dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::bluetooth::error::{BleError, DecodeError};
use crate::core::bluetooth::session::SessionReader;
use crate::core::bluetooth::types::{Subscription, ValueUpdate};

/// Receives the raw payload of a value push
pub trait ValueHandler: Send + Sync {
    fn handle(&self, update: &ValueUpdate) -> Result<(), DecodeError>;
}

impl<F> ValueHandler for F
where
    F: Fn(&ValueUpdate) -> Result<(), DecodeError> + Send + Sync,
{
    fn handle(&self, update: &ValueUpdate) -> Result<(), DecodeError> {
        self(update)
    }
}

/// A decoded sensor value
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading<V> {
    pub device_id: String,
    pub characteristic_uuid: Uuid,
    pub value: V,
    pub received_at: DateTime<Utc>,
}

/// Handler that runs a payload decoder and forwards the result to a channel
pub struct DecodingHandler<V, D> {
    decode: D,
    sink: mpsc::UnboundedSender<SensorReading<V>>,
}

impl<V, D> DecodingHandler<V, D>
where
    D: Fn(&[u8]) -> Result<V, DecodeError>,
{
    pub fn new(decode: D, sink: mpsc::UnboundedSender<SensorReading<V>>) -> Self {
        Self { decode, sink }
    }
}

impl<V, D> ValueHandler for DecodingHandler<V, D>
where
    V: Send + 'static,
    D: Fn(&[u8]) -> Result<V, DecodeError> + Send + Sync,
{
    fn handle(&self, update: &ValueUpdate) -> Result<(), DecodeError> {
        let value = (self.decode)(&update.value)?;
        let reading = SensorReading {
            device_id: update.device_id.clone(),
            characteristic_uuid: update.characteristic_uuid,
            value,
            received_at: Utc::now(),
        };
        if self.sink.send(reading).is_err() {
            debug!("Reading receiver for {} is gone", update.characteristic_uuid);
        }
        Ok(())
    }
}

type HandlerMap = HashMap<Uuid, (u64, Arc<dyn ValueHandler>)>;

fn lock(handlers: &Mutex<HandlerMap>) -> MutexGuard<'_, HandlerMap> {
    handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps a handler registered for as long as it is alive
#[must_use = "the handler is removed when the registration is dropped"]
pub struct HandlerRegistration {
    characteristic: Uuid,
    token: u64,
    handlers: Weak<Mutex<HandlerMap>>,
}

impl HandlerRegistration {
    pub fn characteristic(&self) -> Uuid {
        self.characteristic
    }
}

impl Drop for HandlerRegistration {
    fn drop(&mut self) {
        if let Some(handlers) = self.handlers.upgrade() {
            let mut handlers = lock(&handlers);
            // a later registration for the same characteristic may have replaced ours
            if handlers.get(&self.characteristic).map(|(token, _)| *token) == Some(self.token) {
                handlers.remove(&self.characteristic);
                debug!("Handler for {} released", self.characteristic);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered,
    /// No active subscription matches; the event is stale
    NoSubscription,
    /// The subscribed device is no longer the connected device
    DeviceNotConnected,
    NoHandler,
    DecodeFailed(BleError),
}

/// Routes value updates to handlers
pub struct NotificationRouter {
    handlers: Arc<Mutex<HandlerMap>>,
    subscriptions: Vec<Subscription>,
    session: SessionReader,
    next_token: u64,
}

impl NotificationRouter {
    pub fn new(session: SessionReader) -> Self {
        Self {
            handlers: Arc::new(Mutex::new(HashMap::new())),
            subscriptions: Vec::new(),
            session,
            next_token: 0,
        }
    }

    /// Register the handler for a characteristic, replacing any previous one
    pub fn register(
        &mut self,
        characteristic: Uuid,
        handler: impl ValueHandler + 'static,
    ) -> HandlerRegistration {
        self.next_token += 1;
        let token = self.next_token;
        lock(&self.handlers).insert(characteristic, (token, Arc::new(handler)));
        HandlerRegistration {
            characteristic,
            token,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    pub fn has_handler(&self, characteristic: Uuid) -> bool {
        lock(&self.handlers).contains_key(&characteristic)
    }

    /// Record subscriptions created by negotiation
    pub fn activate(&mut self, subscriptions: impl IntoIterator<Item = Subscription>) {
        for subscription in subscriptions {
            self.subscriptions.retain(|existing| {
                existing.device_id != subscription.device_id
                    || (existing.active && !same_target(existing, &subscription))
            });
            debug!(
                "Subscription active: {} {}",
                subscription.device_id, subscription.characteristic_uuid
            );
            self.subscriptions.push(Subscription {
                active: true,
                ..subscription
            });
        }
    }

    /// Mark every subscription of a device inactive. No round-trip to the
    /// peripheral is made.
    pub fn deactivate_device(&mut self, device_id: &str) -> usize {
        let mut count = 0;
        for subscription in self
            .subscriptions
            .iter_mut()
            .filter(|s| s.active && s.device_id == device_id)
        {
            subscription.active = false;
            count += 1;
        }
        if count > 0 {
            info!("Deactivated {} subscription(s) of {}", count, device_id);
        }
        count
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn active_subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter().filter(|s| s.active)
    }

    /// Deliver one value update to its handler, at most once
    pub fn route(&self, update: &ValueUpdate) -> RouteOutcome {
        let subscribed = self.subscriptions.iter().any(|s| {
            s.active
                && s.device_id == update.device_id
                && s.service_uuid == update.service_uuid
                && s.characteristic_uuid == update.characteristic_uuid
        });
        if !subscribed {
            debug!(
                "Dropping update for {} from {}: no active subscription",
                update.characteristic_uuid, update.device_id
            );
            return RouteOutcome::NoSubscription;
        }

        if !self.session.snapshot().is_connected_to(&update.device_id) {
            debug!("Dropping update from {}: device no longer connected", update.device_id);
            return RouteOutcome::DeviceNotConnected;
        }

        let handler = lock(&self.handlers)
            .get(&update.characteristic_uuid)
            .map(|(_, handler)| handler.clone());
        let Some(handler) = handler else {
            debug!("No handler registered for {}", update.characteristic_uuid);
            return RouteOutcome::NoHandler;
        };

        debug!(
            "Received {} byte(s) on {}",
            update.value.len(),
            update.characteristic_uuid
        );
        match handler.handle(update) {
            Ok(()) => RouteOutcome::Delivered,
            Err(e) => {
                warn!("Failed to decode {}: {}", update.characteristic_uuid, e);
                RouteOutcome::DecodeFailed(BleError::DecodeFailed {
                    characteristic: update.characteristic_uuid,
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn same_target(a: &Subscription, b: &Subscription) -> bool {
    a.service_uuid == b.service_uuid && a.characteristic_uuid == b.characteristic_uuid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::session::SessionWriter;
    use crate::core::bluetooth::types::ConnectionState;

    const SERVICE: Uuid = Uuid::from_u128(0x181a);
    const TEMPERATURE: Uuid = Uuid::from_u128(0x2a6e);

    fn subscription(device_id: &str) -> Subscription {
        Subscription {
            device_id: device_id.to_string(),
            service_uuid: SERVICE,
            characteristic_uuid: TEMPERATURE,
            active: true,
        }
    }

    fn update(device_id: &str, value: &[u8]) -> ValueUpdate {
        ValueUpdate {
            device_id: device_id.to_string(),
            service_uuid: SERVICE,
            characteristic_uuid: TEMPERATURE,
            value: value.to_vec(),
        }
    }

    fn connected_router(device_id: &str) -> (SessionWriter, NotificationRouter) {
        let writer = SessionWriter::new();
        writer.set(device_id, ConnectionState::Connected);
        let router = NotificationRouter::new(writer.reader());
        (writer, router)
    }

    fn recording_handler() -> (Arc<Mutex<Vec<Vec<u8>>>>, impl ValueHandler + 'static) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let handler = move |update: &ValueUpdate| -> Result<(), DecodeError> {
            sink.lock().unwrap().push(update.value.clone());
            Ok(())
        };
        (received, handler)
    }

    #[test]
    fn test_delivers_payload_once_unmodified() {
        let (_writer, mut router) = connected_router("AA:BB");
        let (received, handler) = recording_handler();
        let _registration = router.register(TEMPERATURE, handler);
        router.activate([subscription("AA:BB")]);

        let payload = [0x00, 0xff, 0x10, 0x80];
        assert_eq!(router.route(&update("AA:BB", &payload)), RouteOutcome::Delivered);
        assert_eq!(*received.lock().unwrap(), vec![payload.to_vec()]);
    }

    #[test]
    fn test_stale_update_is_dropped() {
        let (_writer, mut router) = connected_router("AA:BB");
        let (received, handler) = recording_handler();
        let _registration = router.register(TEMPERATURE, handler);

        assert_eq!(router.route(&update("AA:BB", &[1])), RouteOutcome::NoSubscription);

        router.activate([subscription("AA:BB")]);
        assert_eq!(router.deactivate_device("AA:BB"), 1);
        assert_eq!(router.route(&update("AA:BB", &[1])), RouteOutcome::NoSubscription);
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_update_racing_disconnect_is_dropped() {
        let (writer, mut router) = connected_router("AA:BB");
        let (received, handler) = recording_handler();
        let _registration = router.register(TEMPERATURE, handler);
        router.activate([subscription("AA:BB")]);

        writer.clear();
        assert_eq!(router.route(&update("AA:BB", &[1])), RouteOutcome::DeviceNotConnected);
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dropping_registration_removes_handler() {
        let (_writer, mut router) = connected_router("AA:BB");
        router.activate([subscription("AA:BB")]);
        let (_, handler) = recording_handler();
        let registration = router.register(TEMPERATURE, handler);
        assert!(router.has_handler(TEMPERATURE));

        drop(registration);
        assert!(!router.has_handler(TEMPERATURE));
        assert_eq!(router.route(&update("AA:BB", &[1])), RouteOutcome::NoHandler);
    }

    #[test]
    fn test_stale_registration_does_not_remove_replacement() {
        let (_writer, mut router) = connected_router("AA:BB");
        let (_, first) = recording_handler();
        let (_, second) = recording_handler();
        let old = router.register(TEMPERATURE, first);
        let _new = router.register(TEMPERATURE, second);

        drop(old);
        assert!(router.has_handler(TEMPERATURE));
    }

    #[test]
    fn test_reactivation_replaces_inactive_entries() {
        let (_writer, mut router) = connected_router("AA:BB");
        router.activate([subscription("AA:BB")]);
        router.deactivate_device("AA:BB");
        router.activate([subscription("AA:BB")]);

        assert_eq!(router.subscriptions().len(), 1);
        assert_eq!(router.active_subscriptions().count(), 1);
    }

    #[test]
    fn test_decoding_handler() {
        let (_writer, mut router) = connected_router("AA:BB");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let decode = |bytes: &[u8]| -> Result<i16, DecodeError> {
            match bytes {
                [lo, hi] => Ok(i16::from_le_bytes([*lo, *hi])),
                _ => Err(DecodeError::new(format!("expected 2 bytes, got {}", bytes.len()))),
            }
        };
        let _registration = router.register(TEMPERATURE, DecodingHandler::new(decode, tx));
        router.activate([subscription("AA:BB")]);

        assert_eq!(router.route(&update("AA:BB", &[0x2c, 0x01])), RouteOutcome::Delivered);
        let reading = rx.try_recv().unwrap();
        assert_eq!(reading.value, 300);
        assert_eq!(reading.device_id, "AA:BB");

        let outcome = router.route(&update("AA:BB", &[0x01]));
        assert!(matches!(outcome, RouteOutcome::DecodeFailed(BleError::DecodeFailed { .. })));
        assert!(rx.try_recv().is_err());
    }
}
