//! BLE communication module.
//!
//! This module provides the GATT transport abstraction, its btleplug
//! implementation, device listing and the permission gate.

pub mod btleplug_transport;
pub mod permission;
pub mod scanner;
pub mod transport;
pub mod uuids;

pub use btleplug_transport::BtleplugTransport;
pub use permission::{AlwaysGranted, PermissionGate};
pub use scanner::{BleScanner, DiscoveredDevice};
pub use transport::{GattCharacteristic, GattEvent, GattService, GattStatus, GattTransport, LinkState};
pub use uuids::*;
