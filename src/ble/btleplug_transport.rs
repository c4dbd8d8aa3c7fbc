//! [`GattTransport`] over `btleplug`.
//!
//! btleplug exposes blocking-style async calls; this adapter turns their
//! outcomes into [`GattEvent`]s so a session sees the same event flow on
//! every platform.

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral};
use bytes::Bytes;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::ble::transport::{
    GattCharacteristic, GattEvent, GattService, GattStatus, GattTransport, LinkState,
};
use crate::ble::uuids::{CCC_DESCRIPTOR_UUID, DISABLE_NOTIFICATION_VALUE};
use crate::error::{Error, Result};

/// Status reported when btleplug fails an operation without a code.
pub const GATT_FAILURE: u8 = 0x85;

/// Transport driving one peripheral at a time on a btleplug adapter.
pub struct BtleplugTransport {
    /// Adapter the peripheral belongs to.
    adapter: Adapter,
    /// Peripheral of the current connection.
    peripheral: Arc<RwLock<Option<Peripheral>>>,
    /// Discovered characteristics by (service, characteristic).
    characteristics: Arc<RwLock<HashMap<(Uuid, Uuid), Characteristic>>>,
    /// Channel for transport events.
    event_tx: broadcast::Sender<GattEvent>,
    /// Notification listener task.
    listener_handle: RwLock<Option<JoinHandle<()>>>,
    /// Link-loss watcher task.
    watcher_handle: RwLock<Option<JoinHandle<()>>>,
}

impl BtleplugTransport {
    /// Create a transport on an adapter.
    pub fn new(adapter: Adapter, event_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));

        Self {
            adapter,
            peripheral: Arc::new(RwLock::new(None)),
            characteristics: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            listener_handle: RwLock::new(None),
            watcher_handle: RwLock::new(None),
        }
    }

    fn current_peripheral(&self) -> Result<Peripheral> {
        self.peripheral.read().clone().ok_or(Error::NotConnected)
    }

    fn lookup(&self, characteristic: &GattCharacteristic) -> Result<Characteristic> {
        self.characteristics
            .read()
            .get(&(characteristic.service_uuid, characteristic.uuid))
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: characteristic.uuid.to_string(),
            })
    }

    fn emit(&self, event: GattEvent) {
        trace!("Transport event: {:?}", event);
        let _ = self.event_tx.send(event);
    }

    /// Convert btleplug services into the transport model.
    fn to_services(services: impl IntoIterator<Item = btleplug::api::Service>) -> Vec<GattService> {
        services
            .into_iter()
            .map(|service| GattService {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| GattCharacteristic {
                        uuid: c.uuid,
                        service_uuid: c.service_uuid,
                        properties: c.properties,
                        descriptors: c.descriptors.iter().map(|d| d.uuid).collect(),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Start forwarding value notifications.
    fn start_notifications(&self, peripheral: Peripheral) {
        if self.listener_handle.read().is_some() {
            return;
        }

        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            let mut notifications = match peripheral.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    error!("Failed to get notifications stream: {}", e);
                    return;
                }
            };

            while let Some(notification) = notifications.next().await {
                trace!(
                    "Notification from {}: {} bytes",
                    notification.uuid,
                    notification.value.len()
                );
                let _ = event_tx.send(GattEvent::CharacteristicChanged {
                    uuid: notification.uuid,
                    value: Bytes::from(notification.value),
                });
            }

            debug!("Notification listener stopped");
        });

        *self.listener_handle.write() = Some(handle);
    }

    /// Watch adapter events for loss of the link.
    fn start_link_watcher(&self, peripheral: Peripheral) {
        let adapter = self.adapter.clone();
        let event_tx = self.event_tx.clone();
        let id = peripheral.id();

        let handle = tokio::spawn(async move {
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    error!("Failed to get adapter events: {}", e);
                    return;
                }
            };

            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(lost) = event {
                    if lost == id {
                        info!("Link lost to {:?}", lost);
                        let _ = event_tx.send(GattEvent::ConnectionStateChanged(
                            LinkState::Disconnected,
                        ));
                        break;
                    }
                }
            }
        });

        if let Some(old) = self.watcher_handle.write().replace(handle) {
            old.abort();
        }
    }

    fn stop_tasks(&self) {
        if let Some(handle) = self.listener_handle.write().take() {
            handle.abort();
        }
        if let Some(handle) = self.watcher_handle.write().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl GattTransport for BtleplugTransport {
    type Device = Peripheral;

    async fn connect(&self, device: &Peripheral) -> Result<()> {
        *self.peripheral.write() = Some(device.clone());
        self.characteristics.write().clear();

        if !device.is_connected().await.unwrap_or(false) {
            device.connect().await.map_err(|e| Error::Transport {
                operation: "connect",
                reason: e.to_string(),
            })?;
        } else {
            debug!("Peripheral already connected at BLE level");
        }

        self.start_link_watcher(device.clone());
        self.emit(GattEvent::ConnectionStateChanged(LinkState::Connected));

        Ok(())
    }

    async fn discover_services(&self) -> Result<()> {
        let peripheral = self.current_peripheral()?;
        let characteristics = self.characteristics.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let event = match peripheral.discover_services().await {
                Ok(()) => {
                    let services = peripheral.services();
                    {
                        let mut cache = characteristics.write();
                        cache.clear();
                        for service in &services {
                            for c in &service.characteristics {
                                cache.insert((c.service_uuid, c.uuid), c.clone());
                            }
                        }
                        debug!("Discovered {} characteristics", cache.len());
                    }
                    GattEvent::ServicesDiscovered {
                        status: GattStatus::Success,
                        services: Self::to_services(services),
                    }
                }
                Err(e) => {
                    warn!("Failed to discover services: {}", e);
                    GattEvent::ServicesDiscovered {
                        status: GattStatus::Failure(GATT_FAILURE),
                        services: Vec::new(),
                    }
                }
            };
            let _ = event_tx.send(event);
        });

        Ok(())
    }

    async fn read_characteristic(&self, characteristic: &GattCharacteristic) -> Result<()> {
        let peripheral = self.current_peripheral()?;
        let target = self.lookup(characteristic)?;
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let event = match peripheral.read(&target).await {
                Ok(value) => {
                    trace!("Read {} bytes from {}", value.len(), target.uuid);
                    GattEvent::CharacteristicRead {
                        uuid: target.uuid,
                        value: Bytes::from(value),
                        status: GattStatus::Success,
                    }
                }
                Err(e) => {
                    warn!("Read of {} failed: {}", target.uuid, e);
                    GattEvent::CharacteristicRead {
                        uuid: target.uuid,
                        value: Bytes::new(),
                        status: GattStatus::Failure(GATT_FAILURE),
                    }
                }
            };
            let _ = event_tx.send(event);
        });

        Ok(())
    }

    async fn set_notification(
        &self,
        characteristic: &GattCharacteristic,
        enabled: bool,
    ) -> Result<()> {
        let peripheral = self.current_peripheral()?;
        self.lookup(characteristic)?;

        if enabled {
            self.start_notifications(peripheral);
        }

        Ok(())
    }

    async fn write_descriptor(
        &self,
        characteristic: &GattCharacteristic,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<()> {
        let peripheral = self.current_peripheral()?;
        let target = self.lookup(characteristic)?;

        // The platform stacks own the CCC descriptor; subscribe/unsubscribe writes it.
        let outcome = if descriptor == CCC_DESCRIPTOR_UUID {
            if value == DISABLE_NOTIFICATION_VALUE {
                peripheral.unsubscribe(&target).await
            } else {
                peripheral.subscribe(&target).await
            }
        } else {
            let desc = target
                .descriptors
                .iter()
                .find(|d| d.uuid == descriptor)
                .cloned()
                .ok_or_else(|| Error::DescriptorNotFound {
                    uuid: target.uuid.to_string(),
                })?;
            peripheral.write_descriptor(&desc, value).await
        };

        let status = match outcome {
            Ok(()) => GattStatus::Success,
            Err(e) => {
                warn!("Descriptor write on {} failed: {}", target.uuid, e);
                GattStatus::Failure(GATT_FAILURE)
            }
        };

        self.emit(GattEvent::DescriptorWrite {
            characteristic: target.uuid,
            descriptor,
            status,
        });

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.stop_tasks();
        self.characteristics.write().clear();

        let Some(peripheral) = self.peripheral.write().take() else {
            return Ok(());
        };

        if peripheral.is_connected().await.unwrap_or(false) {
            peripheral.disconnect().await.map_err(|e| {
                error!("Failed to disconnect: {}", e);
                Error::Bluetooth(e)
            })?;
            info!("Disconnected from {:?}", peripheral.id());
        }

        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<GattEvent> {
        self.event_tx.subscribe()
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::*;
    use btleplug::api::{CharPropFlags, Descriptor, Service};
    use std::collections::BTreeSet;

    #[test]
    fn test_to_services() {
        let mut descriptors = BTreeSet::new();
        descriptors.insert(Descriptor {
            uuid: CCC_DESCRIPTOR_UUID,
            service_uuid: WEIGHT_SCALE_SERVICE_UUID,
            characteristic_uuid: WEIGHT_SCALE_CHARACTERISTIC_UUID,
        });
        let mut characteristics = BTreeSet::new();
        characteristics.insert(Characteristic {
            uuid: WEIGHT_SCALE_CHARACTERISTIC_UUID,
            service_uuid: WEIGHT_SCALE_SERVICE_UUID,
            properties: CharPropFlags::INDICATE,
            descriptors,
        });
        let service = Service {
            uuid: WEIGHT_SCALE_SERVICE_UUID,
            primary: true,
            characteristics,
        };

        let services = BtleplugTransport::to_services(vec![service]);
        assert_eq!(services.len(), 1);
        let c = services[0]
            .characteristic(&WEIGHT_SCALE_CHARACTERISTIC_UUID)
            .unwrap();
        assert!(c.supports_indicate());
        assert_eq!(c.descriptors, vec![CCC_DESCRIPTOR_UUID]);
    }
}
