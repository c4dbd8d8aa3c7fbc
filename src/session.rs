//! GATT session state machine.
//!
//! A [`GattSession`] owns one [`GattTransport`] and drives a single device
//! from connection through service discovery and classification to
//! streaming measurement notifications. Transport events are consumed by one
//! background task in arrival order; every outcome is published through the
//! session's [`SessionObserver`].

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::ble::permission::PermissionGate;
use crate::ble::transport::{GattCharacteristic, GattEvent, GattService, GattTransport, LinkState};
use crate::ble::uuids::{
    CCC_DESCRIPTOR_UUID, ENABLE_INDICATION_VALUE, ENABLE_NOTIFICATION_VALUE,
    GENERIC_CHARACTERISTICS,
};
use crate::config::SessionConfig;
use crate::data::{build_reading, DeviceInformation, DeviceKind};
use crate::error::{Error, Result};
use crate::state::SessionObserver;
use crate::utils::to_hex_string;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No connection.
    #[default]
    Disconnected,
    /// Waiting for the link to come up.
    Connecting,
    /// Link up, waiting for service discovery.
    ServicesDiscovering,
    /// Services known and device classified.
    Ready {
        /// Classified device kind.
        kind: DeviceKind,
        /// Primary measurement characteristic, if the kind has one.
        characteristic: Option<Uuid>,
    },
    /// Measurement notifications are enabled.
    StreamingReadings {
        /// Classified device kind.
        kind: DeviceKind,
        /// Characteristic delivering readings.
        characteristic: Uuid,
    },
}

impl SessionState {
    /// Check if a link is established.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            Self::ServicesDiscovering | Self::Ready { .. } | Self::StreamingReadings { .. }
        )
    }

    /// Check if services are discovered.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. } | Self::StreamingReadings { .. })
    }

    /// Check if readings are streaming.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::StreamingReadings { .. })
    }

    /// Get the classified device kind.
    pub fn device_kind(&self) -> Option<DeviceKind> {
        match self {
            Self::Ready { kind, .. } | Self::StreamingReadings { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::ServicesDiscovering => write!(f, "Discovering services"),
            Self::Ready { kind, .. } => write!(f, "Ready ({})", kind),
            Self::StreamingReadings { kind, .. } => write!(f, "Streaming ({})", kind),
        }
    }
}

type PendingReads = Mutex<HashMap<Uuid, oneshot::Sender<Result<Vec<u8>>>>>;

/// Per-connection data.
#[derive(Default)]
struct Connection {
    /// Debug name of the connected device.
    device: Option<String>,
    /// Services from the last successful discovery.
    services: Vec<GattService>,
    /// Classification of the connected device.
    kind: Option<DeviceKind>,
}

/// A GATT session with one health device.
pub struct GattSession<T: GattTransport> {
    /// Handle to this session for spawned tasks.
    weak_self: Weak<Self>,
    /// Platform transport.
    transport: T,
    /// Bluetooth permission source.
    permission: Arc<dyn PermissionGate>,
    /// Whether a permission request is outstanding.
    permission_requested: Arc<AtomicBool>,
    /// Session tunables.
    config: SessionConfig,
    /// Published state.
    observer: Arc<SessionObserver>,
    /// Current connection data.
    connection: RwLock<Connection>,
    /// In-flight reads by characteristic.
    pending_reads: PendingReads,
    /// Incremented on every connect and teardown.
    epoch: AtomicU64,
    /// Event loop task.
    event_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: GattTransport> GattSession<T> {
    /// Create a session and start consuming transport events.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(transport: T, permission: Arc<dyn PermissionGate>, config: SessionConfig) -> Arc<Self> {
        let events = transport.subscribe();
        let observer = Arc::new(SessionObserver::new(config.event_capacity));

        let session = Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            transport,
            permission,
            permission_requested: Arc::new(AtomicBool::new(false)),
            config,
            observer,
            connection: RwLock::new(Connection::default()),
            pending_reads: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
            event_handle: Mutex::new(None),
        });

        let handle = tokio::spawn(Self::run_event_loop(session.weak_self.clone(), events));
        *session.event_handle.lock() = Some(handle);

        session
    }

    async fn run_event_loop(session: Weak<Self>, mut events: broadcast::Receiver<GattEvent>) {
        debug!("Session event loop started");
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Session event loop lagged, {} transport events lost", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let Some(session) = session.upgrade() else {
                break;
            };
            session.handle_event(event).await;
        }
        debug!("Session event loop stopped");
    }

    // === Accessors ===

    /// Get the observable state.
    pub fn observer(&self) -> Arc<SessionObserver> {
        self.observer.clone()
    }

    /// Get the current session state.
    pub fn state(&self) -> SessionState {
        self.observer.state()
    }

    /// Get the kind of the connected device.
    pub fn device_kind(&self) -> Option<DeviceKind> {
        self.connection.read().kind
    }

    /// Get the services from the last discovery.
    pub fn services(&self) -> Vec<GattService> {
        self.connection.read().services.clone()
    }

    /// Get the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // === Permission ===

    /// Check the Bluetooth permission, requesting it when missing.
    ///
    /// When the permission is missing a request is started in the background
    /// and [`Error::PermissionDenied`] returned; the outcome is published as
    /// [`SessionEvent::PermissionResult`](crate::state::SessionEvent).
    pub fn ensure_permission(&self) -> Result<()> {
        if self.permission.has_permission() {
            return Ok(());
        }

        if self.permission_requested.swap(true, Ordering::SeqCst) {
            debug!("Permission request already pending");
            return Err(Error::PermissionDenied);
        }

        warn!("Bluetooth permission missing, requesting it");

        let permission = self.permission.clone();
        let requested = self.permission_requested.clone();
        let observer = self.observer.clone();
        tokio::spawn(async move {
            let granted = permission.request_permission().await;
            requested.store(false, Ordering::SeqCst);
            info!("Bluetooth permission request completed: granted={}", granted);
            observer.publish_permission_result(granted);
        });

        Err(Error::PermissionDenied)
    }

    // === Connection ===

    /// Open a GATT connection to a device.
    ///
    /// The session moves to `Connecting`; discovery and classification follow
    /// from transport events. If the session has not reached `Ready` within
    /// the configured connect timeout it is torn down.
    pub async fn connect(&self, device: &T::Device) -> Result<()> {
        self.ensure_permission()?;

        let state = self.state();
        if state.is_connected() {
            let requested = format!("{:?}", device);
            let current = self.connection.read().device.clone();
            if current.as_deref() != Some(requested.as_str()) {
                warn!(
                    "Connect to {} refused, session is bound to {}",
                    requested,
                    current.as_deref().unwrap_or("another device")
                );
                return Err(Error::ConnectionFailed {
                    reason: format!(
                        "Session already connected to {}",
                        current.as_deref().unwrap_or("another device")
                    ),
                });
            }
            debug!("Already connected ({})", state);
            return Ok(());
        }
        if state == SessionState::Connecting {
            return Err(Error::ConnectionFailed {
                reason: "Connection already in progress".to_string(),
            });
        }

        info!("Connecting to {:?}", device);

        *self.connection.write() = Connection {
            device: Some(format!("{:?}", device)),
            ..Connection::default()
        };
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.observer.set_state(SessionState::Connecting);
        self.start_connect_watchdog(epoch);

        self.transport.connect(device).await.map_err(|e| {
            error!("Failed to connect to {:?}: {}", device, e);
            e
        })
    }

    fn start_connect_watchdog(&self, epoch: u64) {
        let session = self.weak_self.clone();
        let timeout = self.config.connect_timeout;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let Some(session) = session.upgrade() else {
                return;
            };
            if session.epoch.load(Ordering::SeqCst) != epoch || session.state().is_ready() {
                return;
            }

            warn!("Connection not ready after {:?}, giving up", timeout);
            session.teardown().await;
        });
    }

    /// Close the connection.
    ///
    /// Cancels in-flight reads and releases the transport. Safe to call in
    /// any state, any number of times.
    pub async fn disconnect(&self) -> Result<()> {
        info!(
            "Disconnecting from {}",
            self.connection.read().device.as_deref().unwrap_or("no device")
        );
        self.teardown().await;
        Ok(())
    }

    async fn teardown(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.cancel_pending_reads();

        let had_kind = {
            let mut connection = self.connection.write();
            let had_kind = connection.kind.is_some();
            *connection = Connection::default();
            had_kind
        };
        if had_kind {
            self.observer.set_device_kind(None);
        }

        if let Err(e) = self.transport.disconnect().await {
            warn!("Transport disconnect failed: {}", e);
        }

        self.observer.set_state(SessionState::Disconnected);
    }

    fn cancel_pending_reads(&self) {
        let pending: Vec<_> = self.pending_reads.lock().drain().collect();
        for (uuid, tx) in pending {
            debug!("Cancelling read of {}", uuid);
            let _ = tx.send(Err(Error::Cancelled));
        }
    }

    // === Events ===

    /// Apply one transport event to the session.
    ///
    /// Called by the session's event loop; exposed for transports that
    /// deliver events through other means. A link-up outside `Connecting`
    /// or a discovery result outside `ServicesDiscovering` belongs to a
    /// released connection and is dropped.
    pub async fn handle_event(&self, event: GattEvent) {
        trace!("Handling {:?}", event);

        match event {
            GattEvent::ConnectionStateChanged(LinkState::Connected) => {
                let state = self.state();
                if state != SessionState::Connecting {
                    warn!("Ignoring link up while {}", state);
                    return;
                }
                self.on_link_up().await;
            }
            GattEvent::ConnectionStateChanged(LinkState::Disconnected) => {
                info!("Link down");
                self.teardown().await;
            }
            GattEvent::ServicesDiscovered { status, services } => {
                let state = self.state();
                if state != SessionState::ServicesDiscovering {
                    warn!("Ignoring service discovery result while {}", state);
                    return;
                }
                if status.is_success() {
                    self.on_services_discovered(services).await;
                } else {
                    error!("Service discovery failed: {}", status);
                    self.teardown().await;
                }
            }
            GattEvent::CharacteristicRead {
                uuid,
                value,
                status,
            } => {
                let waiter = self.pending_reads.lock().remove(&uuid);
                match waiter {
                    Some(tx) => {
                        let result = if status.is_success() {
                            Ok(value.to_vec())
                        } else {
                            Err(Error::Transport {
                                operation: "read",
                                reason: status.to_string(),
                            })
                        };
                        let _ = tx.send(result);
                    }
                    None if status.is_success() => {
                        self.observer.publish_characteristic_value(uuid, value.to_vec());
                    }
                    None => warn!("Read of {} failed: {}", uuid, status),
                }
            }
            GattEvent::CharacteristicChanged { uuid, value } => {
                self.on_characteristic_changed(uuid, &value);
            }
            GattEvent::DescriptorWrite {
                characteristic,
                descriptor,
                status,
            } => {
                if status.is_success() {
                    debug!("Descriptor {} on {} written", descriptor, characteristic);
                    return;
                }

                error!(
                    "Descriptor {} on {} write failed: {}",
                    descriptor, characteristic, status
                );
                if let SessionState::StreamingReadings {
                    kind,
                    characteristic: streaming,
                } = self.state()
                {
                    if streaming == characteristic {
                        self.observer.set_state(SessionState::Ready {
                            kind,
                            characteristic: Some(streaming),
                        });
                    }
                }
            }
        }
    }

    async fn on_link_up(&self) {
        info!("Link up");

        if let Err(e) = self.ensure_permission() {
            warn!("Cannot discover services: {}", e);
            return;
        }

        self.observer.set_state(SessionState::ServicesDiscovering);
        if let Err(e) = self.transport.discover_services().await {
            error!("Failed to start service discovery: {}", e);
            self.teardown().await;
        }
    }

    async fn on_services_discovered(&self, services: Vec<GattService>) {
        let service_uuids: Vec<Uuid> = services.iter().map(|s| s.uuid).collect();
        let kind = DeviceKind::classify(&service_uuids);

        info!(
            "Discovered {} services, classified as {}",
            services.len(),
            kind
        );

        {
            let mut connection = self.connection.write();
            connection.services = services.clone();
            connection.kind = Some(kind);
        }
        self.observer.set_device_kind(Some(kind));
        self.observer.set_state(SessionState::Ready {
            kind,
            characteristic: kind.primary_characteristic().map(|(_, c)| c),
        });

        if !kind.is_known() {
            warn!("No supported measurement service on this device");
            return;
        }

        if let Err(e) = self.handle_device_actions(&services, kind).await {
            error!("Could not start readings: {}", e);
        }
    }

    fn on_characteristic_changed(&self, uuid: Uuid, value: &[u8]) {
        trace!("{} changed: {}", uuid, to_hex_string(value));
        self.observer.publish_characteristic_value(uuid, value.to_vec());

        let Some(kind) = self.connection.read().kind else {
            return;
        };
        if kind.primary_characteristic().map(|(_, c)| c) != Some(uuid) {
            return;
        }

        let reading = build_reading(kind, Some(value));
        debug!("New {} reading with {} fields", kind, reading.len());
        self.observer.publish_reading(reading);
    }

    // === Characteristics ===

    fn find_characteristic(&self, service: &Uuid, characteristic: &Uuid) -> Result<GattCharacteristic> {
        if !self.state().is_connected() {
            error!("Not connected, cannot access {}", characteristic);
            return Err(Error::NotConnected);
        }

        let connection = self.connection.read();
        let Some(found) = connection.services.iter().find(|s| s.uuid == *service) else {
            error!("Service {} not found", service);
            return Err(Error::ServiceNotFound {
                uuid: service.to_string(),
            });
        };

        found.characteristic(characteristic).cloned().ok_or_else(|| {
            error!("Characteristic {} not found in service {}", characteristic, service);
            Error::CharacteristicNotFound {
                uuid: characteristic.to_string(),
            }
        })
    }

    /// Enable indications (preferred) or notifications on a characteristic.
    ///
    /// Calling it again for the characteristic already streaming is a no-op.
    pub async fn enable_notifications(&self, service: Uuid, characteristic: Uuid) -> Result<()> {
        self.ensure_permission()?;
        let target = self.find_characteristic(&service, &characteristic)?;

        if let SessionState::StreamingReadings {
            characteristic: streaming,
            ..
        } = self.state()
        {
            if streaming == characteristic {
                debug!("Already streaming from {}", characteristic);
                return Ok(());
            }
        }

        let value = if target.supports_indicate() {
            ENABLE_INDICATION_VALUE
        } else if target.supports_notify() {
            ENABLE_NOTIFICATION_VALUE
        } else {
            error!("{} supports neither notify nor indicate", characteristic);
            return Err(Error::NotificationsUnsupported {
                uuid: characteristic.to_string(),
            });
        };

        if !target.has_descriptor(&CCC_DESCRIPTOR_UUID) {
            error!("{} has no configuration descriptor", characteristic);
            return Err(Error::DescriptorNotFound {
                uuid: characteristic.to_string(),
            });
        }

        self.transport
            .set_notification(&target, true)
            .await
            .map_err(|e| {
                error!("Enabling notifications on {} failed: {}", characteristic, e);
                Error::NotificationSetupFailed {
                    uuid: characteristic.to_string(),
                }
            })?;

        if !self.state().is_ready() {
            warn!("Session torn down while enabling {}", characteristic);
            return Err(Error::NotConnected);
        }

        let kind = self.device_kind().unwrap_or_default();
        let previous = self.observer.set_state(SessionState::StreamingReadings {
            kind,
            characteristic,
        });

        if let Err(e) = self
            .transport
            .write_descriptor(&target, CCC_DESCRIPTOR_UUID, &value)
            .await
        {
            error!("Writing configuration descriptor on {} failed: {}", characteristic, e);
            self.observer.set_state(previous);
            return Err(Error::NotificationSetupFailed {
                uuid: characteristic.to_string(),
            });
        }

        info!("Streaming {} readings from {}", kind, characteristic);
        Ok(())
    }

    /// Request a characteristic read without waiting for the reply.
    ///
    /// The value is published to the observer when it arrives, unless a
    /// [`read_characteristic`](Self::read_characteristic) call is waiting on it.
    pub async fn read_characteristic_by_uuid(&self, service: Uuid, characteristic: Uuid) -> Result<()> {
        self.ensure_permission()?;
        let target = self.find_characteristic(&service, &characteristic)?;

        self.transport.read_characteristic(&target).await.map_err(|e| {
            error!("Read request for {} failed: {}", characteristic, e);
            e
        })
    }

    /// Read a characteristic and wait for its value.
    ///
    /// Only one read per characteristic may be in flight. The read fails
    /// with [`Error::Timeout`] after the configured read timeout and with
    /// [`Error::Cancelled`] if the session is torn down first.
    pub async fn read_characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending_reads.lock();
            if pending.contains_key(&characteristic) {
                warn!("Read of {} already in flight", characteristic);
                return Err(Error::ReadInProgress {
                    uuid: characteristic.to_string(),
                });
            }
            pending.insert(characteristic, tx);
        }

        if let Err(e) = self.read_characteristic_by_uuid(service, characteristic).await {
            self.pending_reads.lock().remove(&characteristic);
            return Err(e);
        }

        match tokio::time::timeout(self.config.read_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Cancelled),
            Err(_) => {
                self.pending_reads.lock().remove(&characteristic);
                warn!("Read of {} timed out", characteristic);
                Err(Error::Timeout {
                    uuid: characteristic.to_string(),
                })
            }
        }
    }

    /// Read every characteristic of the given services.
    ///
    /// Reads run one at a time. Excluded characteristics are skipped and
    /// failed reads are left out. The hex values are also published to the
    /// observer.
    pub async fn read_all_characteristics(
        &self,
        services: &[GattService],
    ) -> Result<HashMap<Uuid, String>> {
        let mut values = HashMap::new();

        for service in services {
            for characteristic in &service.characteristics {
                if self.config.is_excluded(&characteristic.uuid) {
                    debug!("Skipping excluded characteristic {}", characteristic.uuid);
                    continue;
                }

                match self.read_characteristic(service.uuid, characteristic.uuid).await {
                    Ok(value) => {
                        values.insert(characteristic.uuid, to_hex_string(&value));
                    }
                    Err(e) if e.is_session_fatal() => return Err(e),
                    Err(e) => warn!("Skipping {}: {}", characteristic.uuid, e),
                }
            }
        }

        info!("Read {} characteristics", values.len());
        self.observer.publish_characteristic_values(values.clone());
        Ok(values)
    }

    /// Enable readings from the primary characteristic of a device kind.
    ///
    /// Runs automatically after discovery; call it again to re-arm
    /// notifications.
    pub async fn handle_device_actions(&self, services: &[GattService], kind: DeviceKind) -> Result<()> {
        let Some((service, characteristic)) = kind.primary_characteristic() else {
            warn!("No measurement characteristic for {}", kind);
            return Err(Error::UnknownDevice);
        };

        if !services.iter().any(|s| s.uuid == service) {
            error!("{} service {} missing", kind, service);
            return Err(Error::ServiceNotFound {
                uuid: service.to_string(),
            });
        }

        self.enable_notifications(service, characteristic).await
    }

    /// Read manufacturer, model and battery level.
    ///
    /// Missing characteristics leave their field empty.
    pub async fn read_device_information(&self) -> Result<DeviceInformation> {
        let mut raw = HashMap::new();

        for (service, characteristic) in GENERIC_CHARACTERISTICS {
            match self.read_characteristic(service, characteristic).await {
                Ok(value) => {
                    raw.insert(characteristic, value);
                }
                Err(e) if e.is_session_fatal() => return Err(e),
                Err(e) => debug!("{} unavailable: {}", characteristic, e),
            }
        }

        let info = DeviceInformation::from_raw_values(&raw);
        info!("Device information: {}", info);
        Ok(info)
    }
}

impl<T: GattTransport> Drop for GattSession<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.event_handle.lock().take() {
            handle.abort();
        }
        self.cancel_pending_reads();
    }
}

impl<T: GattTransport> std::fmt::Debug for GattSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GattSession")
            .field("device", &self.connection.read().device)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state() {
        assert!(!SessionState::Disconnected.is_connected());
        assert!(!SessionState::Connecting.is_connected());
        assert!(SessionState::ServicesDiscovering.is_connected());
        assert!(!SessionState::ServicesDiscovering.is_ready());

        let ready = SessionState::Ready {
            kind: DeviceKind::Thermometer,
            characteristic: None,
        };
        assert!(ready.is_ready());
        assert!(!ready.is_streaming());
        assert_eq!(ready.device_kind(), Some(DeviceKind::Thermometer));
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Disconnected.to_string(), "Disconnected");
        assert_eq!(
            SessionState::StreamingReadings {
                kind: DeviceKind::WeightScale,
                characteristic: Uuid::nil(),
            }
            .to_string(),
            "Streaming (Weight Scale)"
        );
    }
}
