// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # healthmate-ble
//!
//! A cross-platform Rust library for reading Bluetooth Low Energy health
//! devices: thermometers, blood-pressure monitors and weight scales.
//!
//! ## Features
//!
//! - **Device Listing**: List known and nearby devices, filtered by name
//! - **GATT Sessions**: Connect, discover services and classify the device
//! - **Live Readings**: Indications and notifications decoded into typed readings
//! - **Observable State**: Latest-value snapshots and event callbacks for any UI
//! - **Device Information**: Manufacturer, model and battery level
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use healthmate_ble::{DeviceManager, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = DeviceManager::new().await?;
//!
//!     let Some(device) = manager.known_devices().await?.into_iter().next() else {
//!         println!("No device found");
//!         return Ok(());
//!     };
//!
//!     let session = manager.connect(&device).await?;
//!     let _handle = session.observer().on_reading(|reading| {
//!         for (label, value) in reading.iter() {
//!             println!("{}: {}", label, value);
//!         }
//!     });
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization for data types

// Public modules
pub mod ble;
pub mod config;
pub mod data;
pub mod device_manager;
pub mod error;
pub mod protocol;
pub mod session;
pub mod state;
pub mod utils;

// Re-exports for convenience
pub use config::SessionConfig;
pub use device_manager::{BtleplugSession, DeviceManager};
pub use error::{Error, Result};
pub use session::{GattSession, SessionState};
pub use state::{CallbackHandle, SessionEvent, SessionObserver};
pub use utils::{celsius_to_fahrenheit, fahrenheit_to_celsius};

// Re-export commonly used types from submodules
pub use ble::{
    AlwaysGranted, GattCharacteristic, GattEvent, GattService, GattStatus, GattTransport,
    LinkState, PermissionGate,
};
pub use data::{build_reading, DeviceInformation, DeviceKind, Reading, ReadingValue, Unit};
pub use protocol::{FlagHeader, MeasurementSite};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        let _ = std::any::TypeId::of::<DeviceManager>();
        let _ = std::any::TypeId::of::<BtleplugSession>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<Reading>();
        let _ = std::any::TypeId::of::<SessionObserver>();
        let _ = std::any::TypeId::of::<DeviceInformation>();
    }

    #[test]
    fn test_temperature_conversion() {
        assert!((celsius_to_fahrenheit(100.0) - 212.0).abs() < 0.001);
        assert!((fahrenheit_to_celsius(212.0) - 100.0).abs() < 0.001);
    }
}
