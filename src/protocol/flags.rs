//! Measurement flag-header decoding.
//!
//! The first byte of a health-device measurement payload is a bitfield that
//! selects the unit and announces which optional fields trail the value:
//!
//! - Bit 0: unit (clear = Celsius / kilograms, set = Fahrenheit / pounds)
//! - Bit 1: timestamp present
//! - Bit 2: temperature-type present (thermometer) / user ID present (scale)
//! - Bit 3: BMI and height present (scale only)
//!
//! Remaining bits are reserved and ignored.

/// Decoded flag byte, shared by every device kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlagHeader {
    raw: u8,
}

impl FlagHeader {
    /// Wrap a raw flag byte.
    pub fn from_raw(raw: u8) -> Self {
        Self { raw }
    }

    /// Get the raw flag byte.
    pub fn raw(&self) -> u8 {
        self.raw
    }

    fn bit(&self, n: u8) -> bool {
        (self.raw >> n) & 1 == 1
    }

    /// Bit 0 clear: Celsius for thermometers, kilograms for scales.
    pub fn is_metric(&self) -> bool {
        !self.bit(0)
    }

    /// Bit 1: a timestamp block follows the measurement value.
    pub fn is_timestamp_present(&self) -> bool {
        self.bit(1)
    }

    /// Bit 2: a temperature-type byte follows (thermometer).
    pub fn is_temperature_type_present(&self) -> bool {
        self.bit(2)
    }

    /// Scale interpretation of the same byte.
    pub fn weight_scale(&self) -> WeightScaleFlags {
        WeightScaleFlags {
            is_in_kilograms: self.is_metric(),
            is_timestamp_present: self.is_timestamp_present(),
            is_user_id_present: self.bit(2),
            is_bmi_and_height_present: self.bit(3),
        }
    }
}

/// Flag bits as a weight scale reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WeightScaleFlags {
    /// Weight in kilograms (and height in meters) when set, pounds/inches otherwise.
    pub is_in_kilograms: bool,
    /// A timestamp block follows the weight.
    pub is_timestamp_present: bool,
    /// A user ID byte follows.
    pub is_user_id_present: bool,
    /// BMI and height follow.
    pub is_bmi_and_height_present: bool,
}

/// Decode the flag header from the first payload byte.
///
/// Returns `None` when there is no byte, meaning "no data yet".
pub fn decode_flag_header(byte: Option<u8>) -> Option<FlagHeader> {
    byte.map(FlagHeader::from_raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_missing_flag_byte() {
        assert_eq!(decode_flag_header(None), None);
    }

    #[test]
    fn test_zero_flags() {
        let flags = decode_flag_header(Some(0x00)).unwrap();
        assert!(flags.is_metric());
        assert!(!flags.is_timestamp_present());
        assert!(!flags.is_temperature_type_present());
    }

    #[test]
    fn test_fahrenheit_with_timestamp() {
        let flags = decode_flag_header(Some(0x03)).unwrap();
        assert!(!flags.is_metric());
        assert!(flags.is_timestamp_present());
        assert!(!flags.is_temperature_type_present());
    }

    #[test]
    fn test_weight_scale_view() {
        let flags = FlagHeader::from_raw(0b0000_1110).weight_scale();
        assert!(flags.is_in_kilograms);
        assert!(flags.is_timestamp_present);
        assert!(flags.is_user_id_present);
        assert!(flags.is_bmi_and_height_present);

        let flags = FlagHeader::from_raw(0b0000_0001).weight_scale();
        assert!(!flags.is_in_kilograms);
        assert!(!flags.is_user_id_present);
    }

    #[test]
    fn test_reserved_bits_ignored() {
        let flags = FlagHeader::from_raw(0xF0);
        assert!(flags.is_metric());
        assert!(!flags.is_timestamp_present());
        assert_eq!(flags.raw(), 0xF0);
    }

    proptest! {
        #[test]
        fn prop_bits_match_shifts(byte in any::<u8>()) {
            let flags = decode_flag_header(Some(byte)).unwrap();
            prop_assert_eq!(flags.is_metric(), byte & 0x01 == 0);
            prop_assert_eq!(flags.is_timestamp_present(), (byte >> 1) & 1 == 1);
            prop_assert_eq!(flags.is_temperature_type_present(), (byte >> 2) & 1 == 1);
            prop_assert_eq!(flags.weight_scale().is_bmi_and_height_present, (byte >> 3) & 1 == 1);
        }
    }
}
