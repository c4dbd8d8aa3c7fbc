//! Data structures for device readings.
//!
//! This module contains the device classifier, the decoded reading model
//! and the generic device information record.

pub mod device;
pub mod info;
pub mod reading;

pub use device::DeviceKind;
pub use info::DeviceInformation;
pub use reading::{build_reading, labels, Reading, ReadingValue, Unit};
