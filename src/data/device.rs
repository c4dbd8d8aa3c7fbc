//! Device classification.
//!
//! A connected peripheral is classified once per connection from the set of
//! services it exposes. The classification selects the primary measurement
//! characteristic and the labels a reading can carry.

use uuid::Uuid;

use crate::ble::uuids::*;
use crate::data::reading::labels;

/// Kind of health device behind a GATT connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceKind {
    /// Health Thermometer profile.
    Thermometer,
    /// Blood Pressure profile.
    BloodPressureMonitor,
    /// Weight Scale profile.
    WeightScale,
    /// No supported measurement service was found.
    #[default]
    Unknown,
}

impl DeviceKind {
    /// Kinds in the order the classifier checks them.
    pub const CLASSIFICATION_ORDER: [DeviceKind; 3] = [
        DeviceKind::Thermometer,
        DeviceKind::BloodPressureMonitor,
        DeviceKind::WeightScale,
    ];

    /// Classify a device from its discovered service UUIDs.
    ///
    /// Thermometer wins over blood pressure, which wins over weight scale.
    ///
    /// # Example
    ///
    /// ```
    /// use healthmate_ble::ble::uuids::{BPM_SERVICE_UUID, THERMOMETER_SERVICE_UUID};
    /// use healthmate_ble::DeviceKind;
    ///
    /// let kind = DeviceKind::classify(&[BPM_SERVICE_UUID, THERMOMETER_SERVICE_UUID]);
    /// assert_eq!(kind, DeviceKind::Thermometer);
    /// ```
    pub fn classify(service_uuids: &[Uuid]) -> Self {
        Self::CLASSIFICATION_ORDER
            .into_iter()
            .find(|kind| {
                kind.service_uuid()
                    .map(|uuid| service_uuids.contains(&uuid))
                    .unwrap_or(false)
            })
            .unwrap_or(Self::Unknown)
    }

    /// Service UUID that identifies this kind.
    pub fn service_uuid(&self) -> Option<Uuid> {
        self.primary_characteristic().map(|(service, _)| service)
    }

    /// (service, characteristic) of the primary measurement characteristic.
    pub fn primary_characteristic(&self) -> Option<(Uuid, Uuid)> {
        match self {
            Self::Thermometer => Some((THERMOMETER_SERVICE_UUID, THERMOMETER_CHARACTERISTIC_UUID)),
            Self::BloodPressureMonitor => Some((BPM_SERVICE_UUID, BPM_CHARACTERISTIC_UUID)),
            Self::WeightScale => Some((WEIGHT_SCALE_SERVICE_UUID, WEIGHT_SCALE_CHARACTERISTIC_UUID)),
            Self::Unknown => None,
        }
    }

    /// Labels a reading of this kind may contain, in display order.
    ///
    /// The blood pressure monitor lists the labels its placeholder decoder
    /// emits; see [`has_complete_decoder`](Self::has_complete_decoder).
    pub fn display_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Thermometer => &[
                labels::TEMPERATURE,
                labels::TIMESTAMP,
                labels::MEASUREMENT_SITE,
            ],
            Self::BloodPressureMonitor => &[labels::TEMPERATURE, labels::TIMESTAMP],
            Self::WeightScale => &[
                labels::WEIGHT,
                labels::TIMESTAMP,
                labels::USER_ID,
                labels::BMI,
                labels::HEIGHT,
            ],
            Self::Unknown => &[],
        }
    }

    /// Whether the payload decoder implements the full profile format.
    ///
    /// The blood pressure decoder reuses the thermometer layout and does not
    /// yet extract systolic, diastolic and pulse values.
    pub fn has_complete_decoder(&self) -> bool {
        matches!(self, Self::Thermometer | Self::WeightScale)
    }

    /// Check if this is a supported kind.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Get a display name for the kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Thermometer => "Thermometer",
            Self::BloodPressureMonitor => "Blood Pressure Monitor",
            Self::WeightScale => "Weight Scale",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_single_service() {
        assert_eq!(
            DeviceKind::classify(&[THERMOMETER_SERVICE_UUID]),
            DeviceKind::Thermometer
        );
        assert_eq!(
            DeviceKind::classify(&[DEVICE_INFO_SERVICE_UUID, BPM_SERVICE_UUID]),
            DeviceKind::BloodPressureMonitor
        );
        assert_eq!(
            DeviceKind::classify(&[WEIGHT_SCALE_SERVICE_UUID]),
            DeviceKind::WeightScale
        );
    }

    #[test]
    fn test_classify_priority() {
        assert_eq!(
            DeviceKind::classify(&[BPM_SERVICE_UUID, THERMOMETER_SERVICE_UUID]),
            DeviceKind::Thermometer
        );
        assert_eq!(
            DeviceKind::classify(&[WEIGHT_SCALE_SERVICE_UUID, BPM_SERVICE_UUID]),
            DeviceKind::BloodPressureMonitor
        );
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(DeviceKind::classify(&[]), DeviceKind::Unknown);
        assert_eq!(
            DeviceKind::classify(&[DEVICE_INFO_SERVICE_UUID, BATTERY_SERVICE_UUID]),
            DeviceKind::Unknown
        );
    }

    #[test]
    fn test_primary_characteristic() {
        assert_eq!(
            DeviceKind::Thermometer.primary_characteristic(),
            Some((THERMOMETER_SERVICE_UUID, THERMOMETER_CHARACTERISTIC_UUID))
        );
        assert_eq!(DeviceKind::Unknown.primary_characteristic(), None);
        assert_eq!(DeviceKind::Unknown.service_uuid(), None);
    }

    #[test]
    fn test_display_keys() {
        assert_eq!(
            DeviceKind::Thermometer.display_keys(),
            &["Temperature", "Timestamp", "Measurement Site"]
        );
        assert!(DeviceKind::Unknown.display_keys().is_empty());
        assert!(!DeviceKind::BloodPressureMonitor.has_complete_decoder());
        assert!(DeviceKind::WeightScale.has_complete_decoder());
    }

    #[test]
    fn test_display() {
        assert_eq!(DeviceKind::BloodPressureMonitor.to_string(), "Blood Pressure Monitor");
        assert!(!DeviceKind::default().is_known());
    }
}
