//! Error types for the healthmate-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The platform has not granted Bluetooth access yet.
    ///
    /// A permission request has been issued; re-invoke the operation once
    /// [`SessionEvent::PermissionResult`](crate::state::SessionEvent) reports a grant.
    #[error("Bluetooth permission not granted")]
    PermissionDenied,

    /// Operation requires a connection but the device is not connected.
    #[error("Device not connected")]
    NotConnected,

    /// Failed to establish a connection to the device.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// The platform transport rejected or failed an operation.
    #[error("Transport fault during {operation}: {reason}")]
    Transport {
        /// The GATT operation that failed.
        operation: &'static str,
        /// Description reported by the transport.
        reason: String,
    },

    /// Service not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// The characteristic has no client characteristic configuration descriptor.
    #[error("Configuration descriptor missing on characteristic {uuid}")]
    DescriptorNotFound {
        /// The UUID of the characteristic lacking the descriptor.
        uuid: String,
    },

    /// The characteristic supports neither notifications nor indications.
    #[error("Characteristic {uuid} supports neither notify nor indicate")]
    NotificationsUnsupported {
        /// The UUID of the characteristic.
        uuid: String,
    },

    /// The transport refused to enable notifications.
    #[error("Enabling notifications failed for {uuid}")]
    NotificationSetupFailed {
        /// The UUID of the characteristic.
        uuid: String,
    },

    /// None of the discovered services belongs to a supported device kind.
    #[error("Unknown device: no supported measurement service")]
    UnknownDevice,

    /// A read for the same characteristic is already awaiting its reply.
    #[error("Read already in flight for {uuid}")]
    ReadInProgress {
        /// The UUID of the characteristic being read.
        uuid: String,
    },

    /// The peripheral did not answer in time.
    #[error("Timed out waiting for {uuid}")]
    Timeout {
        /// The UUID of the characteristic that timed out.
        uuid: String,
    },

    /// The operation was cancelled by session teardown.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Check if the error is fatal for the current session.
    ///
    /// Permission, lookup and decode problems leave the session usable.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::Cancelled | Self::BluetoothUnavailable
        )
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
