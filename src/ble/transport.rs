//! Platform GATT transport abstraction.
//!
//! A transport issues GATT requests and reports their outcome asynchronously
//! as [`GattEvent`]s on a broadcast channel. Request methods only report
//! whether the request was accepted; results arrive as events.

use async_trait::async_trait;
use btleplug::api::CharPropFlags;
use bytes::Bytes;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::Result;

/// Completion status of a GATT operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GattStatus {
    /// The operation succeeded.
    #[default]
    Success,
    /// The operation failed with a platform status code.
    Failure(u8),
}

impl GattStatus {
    /// Check if the operation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for GattStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure(code) => write!(f, "failure (0x{:02X})", code),
        }
    }
}

/// Link-level connection state reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// The link is up.
    Connected,
    /// The link is down.
    Disconnected,
}

/// A discovered characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// UUID of the owning service.
    pub service_uuid: Uuid,
    /// Property bits.
    pub properties: CharPropFlags,
    /// UUIDs of the characteristic's descriptors.
    pub descriptors: Vec<Uuid>,
}

impl GattCharacteristic {
    /// Check if the characteristic can indicate.
    pub fn supports_indicate(&self) -> bool {
        self.properties.contains(CharPropFlags::INDICATE)
    }

    /// Check if the characteristic can notify.
    pub fn supports_notify(&self) -> bool {
        self.properties.contains(CharPropFlags::NOTIFY)
    }

    /// Check if a descriptor is present.
    pub fn has_descriptor(&self, uuid: &Uuid) -> bool {
        self.descriptors.contains(uuid)
    }
}

/// A discovered service with its characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics of the service.
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    /// Look up a characteristic by UUID.
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&GattCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }
}

/// Asynchronous event from a transport.
#[derive(Debug, Clone)]
pub enum GattEvent {
    /// The link came up or went down.
    ConnectionStateChanged(LinkState),
    /// Service discovery completed.
    ServicesDiscovered {
        /// Discovery status.
        status: GattStatus,
        /// Discovered services, empty on failure.
        services: Vec<GattService>,
    },
    /// A characteristic read completed.
    CharacteristicRead {
        /// Characteristic that was read.
        uuid: Uuid,
        /// Value read.
        value: Bytes,
        /// Read status.
        status: GattStatus,
    },
    /// A notification or indication arrived.
    CharacteristicChanged {
        /// Characteristic that changed.
        uuid: Uuid,
        /// New value.
        value: Bytes,
    },
    /// A descriptor write completed.
    DescriptorWrite {
        /// Characteristic owning the descriptor.
        characteristic: Uuid,
        /// Descriptor written.
        descriptor: Uuid,
        /// Write status.
        status: GattStatus,
    },
}

/// GATT client operations a session drives.
#[async_trait]
pub trait GattTransport: Send + Sync + 'static {
    /// Handle identifying a remote device.
    type Device: Clone + Send + Sync + std::fmt::Debug + 'static;

    /// Open a GATT connection. Completion arrives as
    /// [`GattEvent::ConnectionStateChanged`].
    async fn connect(&self, device: &Self::Device) -> Result<()>;

    /// Start service discovery. Completion arrives as
    /// [`GattEvent::ServicesDiscovered`].
    async fn discover_services(&self) -> Result<()>;

    /// Start a characteristic read. Completion arrives as
    /// [`GattEvent::CharacteristicRead`].
    async fn read_characteristic(&self, characteristic: &GattCharacteristic) -> Result<()>;

    /// Enable or disable local delivery of value changes.
    async fn set_notification(&self, characteristic: &GattCharacteristic, enabled: bool)
        -> Result<()>;

    /// Start a descriptor write. Completion arrives as
    /// [`GattEvent::DescriptorWrite`].
    async fn write_descriptor(
        &self,
        characteristic: &GattCharacteristic,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<()>;

    /// Close the connection and release platform resources.
    async fn disconnect(&self) -> Result<()>;

    /// Subscribe to transport events.
    fn subscribe(&self) -> broadcast::Receiver<GattEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::*;

    fn characteristic(properties: CharPropFlags) -> GattCharacteristic {
        GattCharacteristic {
            uuid: THERMOMETER_CHARACTERISTIC_UUID,
            service_uuid: THERMOMETER_SERVICE_UUID,
            properties,
            descriptors: vec![CCC_DESCRIPTOR_UUID],
        }
    }

    #[test]
    fn test_characteristic_properties() {
        let c = characteristic(CharPropFlags::INDICATE | CharPropFlags::READ);
        assert!(c.supports_indicate());
        assert!(!c.supports_notify());
        assert!(c.has_descriptor(&CCC_DESCRIPTOR_UUID));

        let c = characteristic(CharPropFlags::NOTIFY);
        assert!(c.supports_notify());
        assert!(!c.supports_indicate());
    }

    #[test]
    fn test_service_lookup() {
        let service = GattService {
            uuid: THERMOMETER_SERVICE_UUID,
            characteristics: vec![characteristic(CharPropFlags::INDICATE)],
        };
        assert!(service.characteristic(&THERMOMETER_CHARACTERISTIC_UUID).is_some());
        assert!(service.characteristic(&BPM_CHARACTERISTIC_UUID).is_none());
    }

    #[test]
    fn test_status() {
        assert!(GattStatus::Success.is_success());
        assert!(!GattStatus::Failure(0x85).is_success());
        assert_eq!(GattStatus::Failure(0x85).to_string(), "failure (0x85)");
    }
}
