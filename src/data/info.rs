//! Generic device information.
//!
//! Every supported peripheral exposes the Device Information and Battery
//! services next to its measurement service.

use std::collections::HashMap;
use uuid::Uuid;

use crate::ble::uuids::{BATTERY_LEVEL_UUID, MANUFACTURER_NAME_UUID, MODEL_NUMBER_UUID};
use crate::utils::hex_to_bytes;

/// Manufacturer, model and battery state of a connected device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInformation {
    /// Manufacturer Name String.
    pub manufacturer_name: Option<String>,
    /// Model Number String.
    pub model_number: Option<String>,
    /// Battery level in percent (0-100).
    pub battery_level: Option<u8>,
}

impl DeviceInformation {
    /// Decode a UTF-8 string characteristic.
    ///
    /// Trailing NUL padding is stripped. Invalid UTF-8 is replaced lossily.
    pub fn decode_string(raw: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches('\0').trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    /// Decode a Battery Level value.
    ///
    /// Values above 100 are out of range and dropped.
    pub fn decode_battery_level(raw: &[u8]) -> Option<u8> {
        raw.first().copied().filter(|level| *level <= 100)
    }

    /// Build from raw characteristic values keyed by characteristic UUID.
    pub fn from_raw_values(values: &HashMap<Uuid, Vec<u8>>) -> Self {
        Self {
            manufacturer_name: values
                .get(&MANUFACTURER_NAME_UUID)
                .and_then(|raw| Self::decode_string(raw)),
            model_number: values
                .get(&MODEL_NUMBER_UUID)
                .and_then(|raw| Self::decode_string(raw)),
            battery_level: values
                .get(&BATTERY_LEVEL_UUID)
                .and_then(|raw| Self::decode_battery_level(raw)),
        }
    }

    /// Build from the hex display strings published by a full characteristic sweep.
    pub fn from_hex_values(values: &HashMap<Uuid, String>) -> Self {
        let raw: HashMap<Uuid, Vec<u8>> = values
            .iter()
            .map(|(uuid, hex)| (*uuid, hex_to_bytes(hex)))
            .collect();

        Self::from_raw_values(&raw)
    }

    /// Check if nothing could be read.
    pub fn is_empty(&self) -> bool {
        self.manufacturer_name.is_none() && self.model_number.is_none() && self.battery_level.is_none()
    }
}

impl std::fmt::Display for DeviceInformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}",
            self.manufacturer_name.as_deref().unwrap_or("?"),
            self.model_number.as_deref().unwrap_or("?"),
        )?;
        if let Some(level) = self.battery_level {
            write!(f, " ({}%)", level)?;
        }
        Ok(())
    }
}
