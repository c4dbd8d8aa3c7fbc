//! Measurement field decoders.
//!
//! Pure functions turning byte ranges of a measurement payload into typed
//! values. Every decoder is partial: a missing or short slice yields `None`
//! instead of panicking, so callers can omit the field and carry on.

use chrono::{NaiveDate, NaiveDateTime};

/// Resolution of a weight measurement, in kilograms per count.
pub const WEIGHT_RESOLUTION_KG: f64 = 0.005;

/// Resolution of a BMI value.
pub const BMI_RESOLUTION: f64 = 0.1;

/// Resolution of a metric height value, in meters per count.
pub const HEIGHT_RESOLUTION_M: f64 = 0.001;

/// Resolution of an imperial height value, in inches per count.
pub const HEIGHT_RESOLUTION_IN: f64 = 0.1;

/// Length of an encoded date/time block.
pub const TIMESTAMP_LEN: usize = 7;

/// Decode a 4-byte mantissa/exponent scalar.
///
/// - Bytes 0-2: unsigned 24-bit mantissa (little-endian)
/// - Byte 3: signed 8-bit base-10 exponent
///
/// Returns `mantissa * 10^exponent`, or `None` for missing or short input.
///
/// # Example
///
/// ```
/// use healthmate_ble::protocol::decode_scalar_measurement;
///
/// // mantissa 250, exponent -1
/// let value = decode_scalar_measurement(Some(&[0xFA, 0x00, 0x00, 0xFF]));
/// assert_eq!(value, Some(25.0));
/// ```
pub fn decode_scalar_measurement(bytes: Option<&[u8]>) -> Option<f32> {
    let bytes = bytes?.get(0..4)?;

    let mantissa = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
    let exponent = bytes[3] as i8;

    Some((mantissa as f64 * 10f64.powi(exponent as i32)) as f32)
}

/// Decode a 2-byte weight at the fixed 0.005 resolution.
pub fn decode_weight_measurement(bytes: Option<&[u8]>) -> Option<f32> {
    let bytes = bytes?.get(0..2)?;
    let raw = u16::from_le_bytes([bytes[0], bytes[1]]);

    Some((raw as f64 * WEIGHT_RESOLUTION_KG) as f32)
}

/// Decode a 7-byte date/time block.
///
/// - Bytes 0-1: year (uint16 little-endian)
/// - Byte 2: month (1-12)
/// - Bytes 3-6: day, hours, minutes, seconds
///
/// Out-of-range calendar fields (month 0, day 32, hour 24, ...) are treated
/// as a decode failure and yield `None`.
pub fn decode_timestamp(bytes: Option<&[u8]>) -> Option<NaiveDateTime> {
    let bytes = bytes?.get(0..TIMESTAMP_LEN)?;

    let year = u16::from_le_bytes([bytes[0], bytes[1]]) as i32;
    let month = bytes[2] as u32;
    let day = bytes[3] as u32;
    let hour = bytes[4] as u32;
    let minute = bytes[5] as u32;
    let second = bytes[6] as u32;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Body location reported in a thermometer's temperature-type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MeasurementSite {
    /// Reserved or unrecognized value.
    Unknown = 0,
    /// Armpit.
    Armpit = 1,
    /// Body (general).
    Body = 2,
    /// Ear (usually earlobe).
    Ear = 3,
    /// Finger.
    Finger = 4,
    /// Gastro-intestinal tract.
    GastrointestinalTract = 5,
    /// Mouth.
    Mouth = 6,
    /// Rectum.
    Rectum = 7,
    /// Toe.
    Toe = 8,
    /// Tympanum (ear drum).
    Tympanum = 9,
}

impl MeasurementSite {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Self {
        match value {
            1 => Self::Armpit,
            2 => Self::Body,
            3 => Self::Ear,
            4 => Self::Finger,
            5 => Self::GastrointestinalTract,
            6 => Self::Mouth,
            7 => Self::Rectum,
            8 => Self::Toe,
            9 => Self::Tympanum,
            _ => Self::Unknown,
        }
    }

    /// Get a display name for the site.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Armpit => "Armpit",
            Self::Body => "Body",
            Self::Ear => "Ear",
            Self::Finger => "Finger",
            Self::GastrointestinalTract => "Gastrointestinal tract",
            Self::Mouth => "Mouth",
            Self::Rectum => "Rectum",
            Self::Toe => "Toe",
            Self::Tympanum => "Tympanum",
        }
    }
}

impl std::fmt::Display for MeasurementSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Decode the temperature-type byte.
pub fn decode_measurement_site(byte: Option<u8>) -> Option<MeasurementSite> {
    byte.map(MeasurementSite::from_raw)
}

/// Decode the 4-byte BMI + height block of a weight measurement.
///
/// Returns `(bmi, height)`; height is in meters, or inches when `imperial`.
pub fn decode_bmi_and_height(bytes: Option<&[u8]>, imperial: bool) -> Option<(f32, f32)> {
    let bytes = bytes?.get(0..4)?;

    let bmi = u16::from_le_bytes([bytes[0], bytes[1]]) as f64 * BMI_RESOLUTION;
    let height_raw = u16::from_le_bytes([bytes[2], bytes[3]]) as f64;
    let height = if imperial {
        height_raw * HEIGHT_RESOLUTION_IN
    } else {
        height_raw * HEIGHT_RESOLUTION_M
    };

    Some((bmi as f32, height as f32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use proptest::prelude::*;

    #[test]
    fn test_scalar_zero() {
        assert_eq!(decode_scalar_measurement(Some(&[0, 0, 0, 0])), Some(0.0));
    }

    #[test]
    fn test_scalar_negative_exponent() {
        // 250 * 10^-1
        assert_eq!(
            decode_scalar_measurement(Some(&[0xFA, 0x00, 0x00, 0xFF])),
            Some(25.0)
        );
        // 366 * 10^-1 = 36.6
        let value = decode_scalar_measurement(Some(&[0x6E, 0x01, 0x00, 0xFF])).unwrap();
        assert!((value - 36.6).abs() < 0.001);
    }

    #[test]
    fn test_scalar_uses_all_mantissa_bytes() {
        // 0x010203 = 66051, exponent 0
        assert_eq!(
            decode_scalar_measurement(Some(&[0x03, 0x02, 0x01, 0x00])),
            Some(66051.0)
        );
        // positive exponent
        assert_eq!(
            decode_scalar_measurement(Some(&[0x05, 0x00, 0x00, 0x02])),
            Some(500.0)
        );
    }

    #[test]
    fn test_scalar_short_or_missing() {
        assert_eq!(decode_scalar_measurement(None), None);
        assert_eq!(decode_scalar_measurement(Some(&[0x01, 0x02, 0x03])), None);
        assert_eq!(decode_scalar_measurement(Some(&[])), None);
    }

    #[test]
    fn test_weight() {
        // 14000 * 0.005 = 70 kg
        let weight = decode_weight_measurement(Some(&[0xB0, 0x36])).unwrap();
        assert!((weight - 70.0).abs() < 0.001);

        assert_eq!(decode_weight_measurement(None), None);
        assert_eq!(decode_weight_measurement(Some(&[0x01])), None);
    }

    #[test]
    fn test_timestamp() {
        // 2024-06-15 14:30:00
        let ts = decode_timestamp(Some(&[0xE8, 0x07, 6, 15, 14, 30, 0])).unwrap();
        assert_eq!(ts.year(), 2024);
        assert_eq!(ts.month(), 6);
        assert_eq!(ts.day(), 15);
        assert_eq!(ts.hour(), 14);
        assert_eq!(ts.minute(), 30);
        assert_eq!(ts.second(), 0);
    }

    #[test]
    fn test_timestamp_invalid_calendar_fields() {
        // month 0
        assert_eq!(decode_timestamp(Some(&[0xE8, 0x07, 0, 15, 14, 30, 0])), None);
        // day 32
        assert_eq!(decode_timestamp(Some(&[0xE8, 0x07, 6, 32, 14, 30, 0])), None);
        // hour 24
        assert_eq!(decode_timestamp(Some(&[0xE8, 0x07, 6, 15, 24, 30, 0])), None);
        // February 30th
        assert_eq!(decode_timestamp(Some(&[0xE8, 0x07, 2, 30, 0, 0, 0])), None);
    }

    #[test]
    fn test_timestamp_short_or_missing() {
        assert_eq!(decode_timestamp(None), None);
        assert_eq!(decode_timestamp(Some(&[0xE8, 0x07, 6, 15, 14, 30])), None);
    }

    #[test]
    fn test_measurement_site() {
        assert_eq!(decode_measurement_site(None), None);
        assert_eq!(decode_measurement_site(Some(1)), Some(MeasurementSite::Armpit));
        assert_eq!(decode_measurement_site(Some(9)), Some(MeasurementSite::Tympanum));
        assert_eq!(decode_measurement_site(Some(42)), Some(MeasurementSite::Unknown));
        assert_eq!(MeasurementSite::Ear.to_string(), "Ear");
    }

    #[test]
    fn test_bmi_and_height() {
        // BMI 22.5 (225), height 1.80 m (1800)
        let (bmi, height) = decode_bmi_and_height(Some(&[0xE1, 0x00, 0x08, 0x07]), false).unwrap();
        assert!((bmi - 22.5).abs() < 0.001);
        assert!((height - 1.8).abs() < 0.001);

        // height 70.0 in (700)
        let (_, height) = decode_bmi_and_height(Some(&[0, 0, 0xBC, 0x02]), true).unwrap();
        assert!((height - 70.0).abs() < 0.001);

        assert_eq!(decode_bmi_and_height(Some(&[0, 0, 0]), false), None);
    }

    proptest! {
        #[test]
        fn prop_scalar_matches_formula(bytes in proptest::array::uniform4(any::<u8>())) {
            let mantissa = (bytes[0] as u32) | ((bytes[1] as u32) << 8) | ((bytes[2] as u32) << 16);
            let exponent = bytes[3] as i8;
            let expected = (mantissa as f64 * 10f64.powi(exponent as i32)) as f32;

            let decoded = decode_scalar_measurement(Some(&bytes)).unwrap();
            prop_assert!(decoded == expected || (decoded.is_nan() && expected.is_nan()));
        }

        #[test]
        fn prop_decoders_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..16)) {
            let _ = decode_scalar_measurement(Some(&bytes));
            let _ = decode_weight_measurement(Some(&bytes));
            let _ = decode_timestamp(Some(&bytes));
            let _ = decode_bmi_and_height(Some(&bytes), false);
        }
    }
}
