//! Observable session state.
//!
//! A [`SessionObserver`] holds the latest snapshot of everything a UI needs:
//! session state, device kind, raw characteristic value, decoded reading and
//! the auxiliary characteristic values. Each snapshot is a `watch` channel,
//! so observers always see the newest value and never a history. Changes are
//! additionally fanned out as [`SessionEvent`]s on a broadcast channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, watch};
use tracing::debug;
use uuid::Uuid;

use crate::data::{DeviceKind, Reading};
use crate::session::SessionState;

/// Callback handle for unregistering callbacks.
///
/// Dropping the handle unregisters the callback.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle").field("id", &self.id).finish()
    }
}

/// Change notification published by a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session moved to a new state.
    StateChanged(SessionState),
    /// A permission request completed.
    PermissionResult {
        /// Whether the permission was granted.
        granted: bool,
    },
    /// The connected device was classified.
    DeviceClassified(DeviceKind),
    /// A raw characteristic value arrived.
    CharacteristicValue {
        /// Characteristic the value belongs to.
        uuid: Uuid,
        /// Raw value.
        value: Vec<u8>,
    },
    /// A reading was decoded from the primary characteristic.
    Reading(Reading),
    /// A full characteristic sweep completed.
    CharacteristicValues(HashMap<Uuid, String>),
}

/// Latest-value store for one session.
pub struct SessionObserver {
    state_tx: watch::Sender<SessionState>,
    device_kind_tx: watch::Sender<Option<DeviceKind>>,
    characteristic_value_tx: watch::Sender<Option<Vec<u8>>>,
    reading_tx: watch::Sender<Option<Reading>>,
    characteristic_values_tx: watch::Sender<HashMap<Uuid, String>>,
    event_tx: broadcast::Sender<SessionEvent>,
    callback_counter: AtomicU64,
}

impl SessionObserver {
    /// Create an observer in the `Disconnected` state.
    pub fn new(event_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));

        Self {
            state_tx: watch::channel(SessionState::Disconnected).0,
            device_kind_tx: watch::channel(None).0,
            characteristic_value_tx: watch::channel(None).0,
            reading_tx: watch::channel(None).0,
            characteristic_values_tx: watch::channel(HashMap::new()).0,
            event_tx,
            callback_counter: AtomicU64::new(0),
        }
    }

    // === Snapshots ===

    /// Get the current session state.
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Get the kind of the connected device.
    pub fn device_kind(&self) -> Option<DeviceKind> {
        *self.device_kind_tx.borrow()
    }

    /// Get the latest raw characteristic value.
    pub fn characteristic_value(&self) -> Option<Vec<u8>> {
        self.characteristic_value_tx.borrow().clone()
    }

    /// Get the latest decoded reading.
    pub fn reading(&self) -> Option<Reading> {
        self.reading_tx.borrow().clone()
    }

    /// Get the hex values of the last full characteristic sweep.
    pub fn characteristic_values(&self) -> HashMap<Uuid, String> {
        self.characteristic_values_tx.borrow().clone()
    }

    // === Watchers ===

    /// Watch the session state.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Watch the device kind.
    pub fn watch_device_kind(&self) -> watch::Receiver<Option<DeviceKind>> {
        self.device_kind_tx.subscribe()
    }

    /// Watch the raw characteristic value.
    pub fn watch_characteristic_value(&self) -> watch::Receiver<Option<Vec<u8>>> {
        self.characteristic_value_tx.subscribe()
    }

    /// Watch the decoded reading.
    pub fn watch_reading(&self) -> watch::Receiver<Option<Reading>> {
        self.reading_tx.subscribe()
    }

    /// Watch the auxiliary characteristic values.
    pub fn watch_characteristic_values(&self) -> watch::Receiver<HashMap<Uuid, String>> {
        self.characteristic_values_tx.subscribe()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    // === Callbacks ===

    /// Register a callback for every session event.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        self.register(move |event| {
            callback(event);
        })
    }

    /// Register a callback for decoded readings.
    pub fn on_reading<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(Reading) + Send + Sync + 'static,
    {
        self.register(move |event| {
            if let SessionEvent::Reading(reading) = event {
                callback(reading);
            }
        })
    }

    /// Register a callback for state changes.
    pub fn on_state_changed<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(SessionState) + Send + Sync + 'static,
    {
        self.register(move |event| {
            if let SessionEvent::StateChanged(state) = event {
                callback(state);
            }
        })
    }

    fn register<F>(&self, handler: F) -> CallbackHandle
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.event_tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Callback {} skipped {} events", callback_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    // === Publishing ===

    /// Update the session state, returning the previous one.
    pub(crate) fn set_state(&self, new_state: SessionState) -> SessionState {
        let old_state = self.state_tx.send_replace(new_state);

        if old_state != new_state {
            debug!("Session state changed: {} -> {}", old_state, new_state);
            self.emit(SessionEvent::StateChanged(new_state));
        }

        old_state
    }

    pub(crate) fn set_device_kind(&self, kind: Option<DeviceKind>) {
        self.device_kind_tx.send_replace(kind);
        if let Some(kind) = kind {
            self.emit(SessionEvent::DeviceClassified(kind));
        }
    }

    pub(crate) fn publish_characteristic_value(&self, uuid: Uuid, value: Vec<u8>) {
        self.characteristic_value_tx.send_replace(Some(value.clone()));
        self.emit(SessionEvent::CharacteristicValue { uuid, value });
    }

    pub(crate) fn publish_reading(&self, reading: Reading) {
        self.reading_tx.send_replace(Some(reading.clone()));
        self.emit(SessionEvent::Reading(reading));
    }

    pub(crate) fn publish_characteristic_values(&self, values: HashMap<Uuid, String>) {
        self.characteristic_values_tx.send_replace(values.clone());
        self.emit(SessionEvent::CharacteristicValues(values));
    }

    pub(crate) fn publish_permission_result(&self, granted: bool) {
        self.emit(SessionEvent::PermissionResult { granted });
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.event_tx.send(event);
    }
}

impl Default for SessionObserver {
    fn default() -> Self {
        Self::new(64)
    }
}

impl std::fmt::Debug for SessionObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionObserver")
            .field("state", &self.state())
            .field("device_kind", &self.device_kind())
            .finish()
    }
}
