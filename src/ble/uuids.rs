//! BLE Service and Characteristic UUIDs.
//!
//! The service catalog: every identifier a health-device session touches.
//! All values are SIG-assigned numbers expanded onto the Bluetooth base UUID
//! `0000xxxx-0000-1000-8000-00805f9b34fb`.

use uuid::Uuid;

/// The Bluetooth base UUID with a zero short-form.
pub const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_00805f9b34fb;

/// Expand a 16-bit SIG short-form into a full 128-bit UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    uuid_from_u32(short as u32)
}

/// Expand a 32-bit SIG short-form into a full 128-bit UUID.
pub const fn uuid_from_u32(short: u32) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | BLUETOOTH_BASE_UUID)
}

// Health Thermometer
/// Health Thermometer service UUID.
pub const THERMOMETER_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1809_0000_1000_8000_00805f9b34fb);
/// Temperature Measurement characteristic UUID (Indicate).
pub const THERMOMETER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_2a1c_0000_1000_8000_00805f9b34fb);

// Blood Pressure
/// Blood Pressure service UUID.
pub const BPM_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1810_0000_1000_8000_00805f9b34fb);
/// Blood Pressure Measurement characteristic UUID (Indicate).
pub const BPM_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x0000_2a35_0000_1000_8000_00805f9b34fb);

// Weight Scale
/// Weight Scale service UUID.
pub const WEIGHT_SCALE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_181d_0000_1000_8000_00805f9b34fb);
/// Weight Measurement characteristic UUID (Indicate).
pub const WEIGHT_SCALE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_2a9d_0000_1000_8000_00805f9b34fb);

/// Client Characteristic Configuration descriptor UUID, shared by every kind.
pub const CCC_DESCRIPTOR_UUID: Uuid = Uuid::from_u128(0x0000_2902_0000_1000_8000_00805f9b34fb);

// Device Information Service (Standard BLE)
/// Standard BLE Device Information Service UUID.
pub const DEVICE_INFO_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180a_0000_1000_8000_00805f9b34fb);
/// Manufacturer Name characteristic UUID.
pub const MANUFACTURER_NAME_UUID: Uuid = Uuid::from_u128(0x0000_2a29_0000_1000_8000_00805f9b34fb);
/// Model Number characteristic UUID.
pub const MODEL_NUMBER_UUID: Uuid = Uuid::from_u128(0x0000_2a24_0000_1000_8000_00805f9b34fb);

// Battery Service
/// Battery service UUID.
pub const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180f_0000_1000_8000_00805f9b34fb);
/// Battery Level characteristic UUID.
pub const BATTERY_LEVEL_UUID: Uuid = Uuid::from_u128(0x0000_2a19_0000_1000_8000_00805f9b34fb);

/// Service Changed characteristic UUID (Generic Attribute service).
///
/// Indicate-only; a plain read is rejected by most peripherals.
pub const SERVICE_CHANGED_UUID: Uuid = Uuid::from_u128(0x0000_2a05_0000_1000_8000_00805f9b34fb);

/// CCC payload that enables indications.
pub const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];
/// CCC payload that enables notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
/// CCC payload that disables both.
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// Generic (service, characteristic) pairs read from every device.
pub const GENERIC_CHARACTERISTICS: [(Uuid, Uuid); 3] = [
    (DEVICE_INFO_SERVICE_UUID, MANUFACTURER_NAME_UUID),
    (DEVICE_INFO_SERVICE_UUID, MODEL_NUMBER_UUID),
    (BATTERY_SERVICE_UUID, BATTERY_LEVEL_UUID),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            THERMOMETER_SERVICE_UUID.to_string(),
            "00001809-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            BPM_CHARACTERISTIC_UUID.to_string(),
            "00002a35-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            CCC_DESCRIPTOR_UUID.to_string(),
            "00002902-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_short_form_expansion() {
        assert_eq!(uuid_from_u16(0x1809), THERMOMETER_SERVICE_UUID);
        assert_eq!(uuid_from_u16(0x2a1c), THERMOMETER_CHARACTERISTIC_UUID);
        assert_eq!(uuid_from_u16(0x180a), DEVICE_INFO_SERVICE_UUID);
        assert_eq!(uuid_from_u32(0x0000_2a19), BATTERY_LEVEL_UUID);
    }

    #[test]
    fn test_ccc_payloads_differ() {
        assert_ne!(ENABLE_INDICATION_VALUE, ENABLE_NOTIFICATION_VALUE);
        assert_eq!(DISABLE_NOTIFICATION_VALUE, [0, 0]);
    }
}
