//! Readings decoded from measurement payloads.
//!
//! A [`Reading`] is an ordered label → value map produced fresh from every
//! payload. Decoding is best-effort per field: a missing or short byte range
//! just leaves its label out.

use chrono::NaiveDateTime;

use crate::data::device::DeviceKind;
use crate::protocol::{
    decode_bmi_and_height, decode_flag_header, decode_measurement_site, decode_scalar_measurement,
    decode_timestamp, decode_weight_measurement, FlagHeader,
};
use crate::protocol::measurement::TIMESTAMP_LEN;
use crate::utils::{celsius_to_fahrenheit, fahrenheit_to_celsius};

/// Labels used as reading keys.
pub mod labels {
    /// Body or object temperature.
    pub const TEMPERATURE: &str = "Temperature";
    /// Time the device took the measurement.
    pub const TIMESTAMP: &str = "Timestamp";
    /// Where on the body a temperature was taken.
    pub const MEASUREMENT_SITE: &str = "Measurement Site";
    /// Body weight.
    pub const WEIGHT: &str = "Weight";
    /// Scale user slot.
    pub const USER_ID: &str = "User ID";
    /// Body mass index.
    pub const BMI: &str = "BMI";
    /// Body height.
    pub const HEIGHT: &str = "Height";
}

/// User ID value a scale sends for an unregistered user.
pub const UNKNOWN_USER_ID: u8 = 0xFF;

/// Unit attached to a measurement value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Unit {
    /// Degrees Celsius.
    Celsius,
    /// Degrees Fahrenheit.
    Fahrenheit,
    /// Kilograms.
    Kilogram,
    /// Pounds.
    Pound,
    /// Meters.
    Meter,
    /// Inches.
    Inch,
}

impl Unit {
    /// Get the unit symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
            Self::Kilogram => "kg",
            Self::Pound => "lb",
            Self::Meter => "m",
            Self::Inch => "in",
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A single decoded value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ReadingValue {
    /// A number with a unit, shown as `"<number> <unit>"`.
    Measurement {
        /// Numeric value.
        value: f32,
        /// Unit of `value`.
        unit: Unit,
    },
    /// A dimensionless number.
    Number(f32),
    /// Device-reported measurement time.
    Timestamp(NaiveDateTime),
    /// Free text.
    Text(String),
}

impl ReadingValue {
    /// Get the numeric value, if any.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Measurement { value, .. } | Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Get the timestamp as milliseconds since the Unix epoch.
    ///
    /// The device clock carries no zone, so it is read as UTC.
    pub fn epoch_millis(&self) -> Option<i64> {
        match self {
            Self::Timestamp(ts) => Some(ts.and_utc().timestamp_millis()),
            _ => None,
        }
    }

    /// Convert a temperature to another temperature unit.
    ///
    /// Returns `None` if either side is not a temperature.
    pub fn to_temperature_unit(&self, target: Unit) -> Option<ReadingValue> {
        let Self::Measurement { value, unit } = self else {
            return None;
        };
        let value = f64::from(*value);

        let converted = match (unit, target) {
            (Unit::Celsius, Unit::Celsius) | (Unit::Fahrenheit, Unit::Fahrenheit) => value,
            (Unit::Celsius, Unit::Fahrenheit) => celsius_to_fahrenheit(value),
            (Unit::Fahrenheit, Unit::Celsius) => fahrenheit_to_celsius(value),
            _ => return None,
        };

        Some(Self::Measurement {
            value: converted as f32,
            unit: target,
        })
    }
}

impl std::fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Measurement { value, unit } => write!(f, "{} {}", value, unit),
            Self::Number(value) => write!(f, "{}", value),
            Self::Timestamp(ts) => write!(f, "{}", ts.and_utc().timestamp_millis()),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Ordered label → value map decoded from one payload.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Reading {
    kind: DeviceKind,
    entries: Vec<(&'static str, ReadingValue)>,
}

impl Reading {
    /// Create an empty reading for a device kind.
    pub fn new(kind: DeviceKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Get the device kind that produced this reading.
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Look up a value by label.
    pub fn get(&self, label: &str) -> Option<&ReadingValue> {
        self.entries
            .iter()
            .find(|(key, _)| *key == label)
            .map(|(_, value)| value)
    }

    /// Get the temperature in the requested unit, whatever unit the device sent.
    pub fn temperature_in(&self, unit: Unit) -> Option<f32> {
        self.get(labels::TEMPERATURE)?
            .to_temperature_unit(unit)?
            .as_f32()
    }

    /// Check if a label is present.
    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    /// Labels in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(key, _)| *key)
    }

    /// Iterate over (label, value) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ReadingValue)> {
        self.entries.iter().map(|(key, value)| (*key, value))
    }

    /// Number of decoded fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was decoded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, label: &'static str, value: Option<ReadingValue>) {
        debug_assert!(self.kind.display_keys().contains(&label));
        if let Some(value) = value {
            self.entries.push((label, value));
        }
    }
}

/// Decode a measurement payload for a device kind.
///
/// A `None` payload means nothing has arrived yet and yields an empty reading.
pub fn build_reading(kind: DeviceKind, payload: Option<&[u8]>) -> Reading {
    let Some(payload) = payload else {
        return Reading::new(kind);
    };

    let flags = decode_flag_header(payload.first().copied());

    match kind {
        DeviceKind::Thermometer => decode_thermometer(flags, payload),
        DeviceKind::BloodPressureMonitor => decode_blood_pressure(payload),
        DeviceKind::WeightScale => decode_weight_scale(flags, payload),
        DeviceKind::Unknown => Reading::new(kind),
    }
}

/// Decode a Temperature Measurement payload.
///
/// `payload` is the full characteristic value; fields start at byte 1.
/// Without a flag header the temperature is read as Celsius and nothing else
/// is attempted, which tolerates peripherals that omit the flag byte.
pub fn decode_thermometer(flags: Option<FlagHeader>, payload: &[u8]) -> Reading {
    let mut reading = Reading::new(DeviceKind::Thermometer);
    let temperature = decode_scalar_measurement(payload.get(1..5));

    let Some(flags) = flags else {
        reading.insert(
            labels::TEMPERATURE,
            temperature.map(|value| ReadingValue::Measurement {
                value,
                unit: Unit::Celsius,
            }),
        );
        return reading;
    };

    let unit = if flags.is_metric() {
        Unit::Celsius
    } else {
        Unit::Fahrenheit
    };
    reading.insert(
        labels::TEMPERATURE,
        temperature.map(|value| ReadingValue::Measurement { value, unit }),
    );

    let mut offset = 5;
    if flags.is_timestamp_present() {
        reading.insert(
            labels::TIMESTAMP,
            decode_timestamp(payload.get(offset..offset + TIMESTAMP_LEN))
                .map(ReadingValue::Timestamp),
        );
        offset += TIMESTAMP_LEN;
    }

    if flags.is_temperature_type_present() {
        reading.insert(
            labels::MEASUREMENT_SITE,
            decode_measurement_site(payload.get(offset).copied())
                .map(|site| ReadingValue::Text(site.to_string())),
        );
    }

    reading
}

/// Decode a Blood Pressure Measurement payload.
///
/// Placeholder layout: a scalar at bytes 1-4 and a timestamp at bytes 5-11,
/// read unconditionally with the thermometer labels.
pub fn decode_blood_pressure(payload: &[u8]) -> Reading {
    let mut reading = Reading::new(DeviceKind::BloodPressureMonitor);

    reading.insert(
        labels::TEMPERATURE,
        decode_scalar_measurement(payload.get(1..5)).map(ReadingValue::Number),
    );
    reading.insert(
        labels::TIMESTAMP,
        decode_timestamp(payload.get(5..5 + TIMESTAMP_LEN)).map(ReadingValue::Timestamp),
    );

    reading
}

/// Decode a Weight Measurement payload.
///
/// Fields after the weight are packed back to back in flag-bit order:
/// timestamp, user ID, then BMI and height.
pub fn decode_weight_scale(flags: Option<FlagHeader>, payload: &[u8]) -> Reading {
    let mut reading = Reading::new(DeviceKind::WeightScale);
    let weight = decode_weight_measurement(payload.get(1..3));

    let Some(flags) = flags.map(|f| f.weight_scale()) else {
        reading.insert(
            labels::WEIGHT,
            weight.map(|value| ReadingValue::Measurement {
                value,
                unit: Unit::Kilogram,
            }),
        );
        return reading;
    };

    let unit = if flags.is_in_kilograms {
        Unit::Kilogram
    } else {
        Unit::Pound
    };
    reading.insert(
        labels::WEIGHT,
        weight.map(|value| ReadingValue::Measurement { value, unit }),
    );

    let mut offset = 3;
    if flags.is_timestamp_present {
        reading.insert(
            labels::TIMESTAMP,
            decode_timestamp(payload.get(offset..offset + TIMESTAMP_LEN))
                .map(ReadingValue::Timestamp),
        );
        offset += TIMESTAMP_LEN;
    }

    if flags.is_user_id_present {
        reading.insert(
            labels::USER_ID,
            payload.get(offset).map(|&id| {
                if id == UNKNOWN_USER_ID {
                    ReadingValue::Text("Unknown user".to_string())
                } else {
                    ReadingValue::Text(id.to_string())
                }
            }),
        );
        offset += 1;
    }

    if flags.is_bmi_and_height_present {
        let imperial = !flags.is_in_kilograms;
        if let Some((bmi, height)) = decode_bmi_and_height(payload.get(offset..offset + 4), imperial)
        {
            reading.insert(labels::BMI, Some(ReadingValue::Number(bmi)));
            reading.insert(
                labels::HEIGHT,
                Some(ReadingValue::Measurement {
                    value: height,
                    unit: if imperial { Unit::Inch } else { Unit::Meter },
                }),
            );
        }
    }

    reading
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TIMESTAMP_2024_06_15: [u8; 7] = [0xE8, 0x07, 6, 15, 14, 30, 0];

    fn thermometer_payload(flags: u8, with_timestamp: bool) -> Vec<u8> {
        // 366 * 10^-1 = 36.6
        let mut payload = vec![flags, 0x6E, 0x01, 0x00, 0xFF];
        if with_timestamp {
            payload.extend_from_slice(&TIMESTAMP_2024_06_15);
        }
        payload
    }

    #[test]
    fn test_no_payload_is_empty() {
        for kind in DeviceKind::CLASSIFICATION_ORDER {
            assert!(build_reading(kind, None).is_empty());
        }
    }

    #[test]
    fn test_thermometer_without_flags_uses_celsius() {
        let payload = thermometer_payload(0x00, false);
        let reading = decode_thermometer(None, &payload);

        assert_eq!(reading.len(), 1);
        assert_eq!(reading.get(labels::TEMPERATURE).unwrap().to_string(), "36.6 °C");
        assert!(!reading.contains(labels::TIMESTAMP));
    }

    #[test]
    fn test_thermometer_fahrenheit_with_timestamp() {
        let payload = thermometer_payload(0x03, true);
        let reading = build_reading(DeviceKind::Thermometer, Some(&payload));

        assert_eq!(reading.len(), 2);
        assert_eq!(reading.get(labels::TEMPERATURE).unwrap().to_string(), "36.6 °F");

        let expected = chrono::NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        assert_eq!(
            reading.get(labels::TIMESTAMP),
            Some(&ReadingValue::Timestamp(expected))
        );
        assert_eq!(
            reading.get(labels::TIMESTAMP).unwrap().epoch_millis(),
            Some(1_718_461_800_000)
        );
    }

    #[test]
    fn test_temperature_normalisation() {
        let reading = build_reading(DeviceKind::Thermometer, Some(&thermometer_payload(0x00, false)));
        assert!((reading.temperature_in(Unit::Fahrenheit).unwrap() - 97.88).abs() < 0.01);
        assert!((reading.temperature_in(Unit::Celsius).unwrap() - 36.6).abs() < 0.001);
        assert_eq!(reading.temperature_in(Unit::Kilogram), None);

        let fever = ReadingValue::Measurement {
            value: 102.2,
            unit: Unit::Fahrenheit,
        };
        let celsius = fever.to_temperature_unit(Unit::Celsius).unwrap();
        assert!((celsius.as_f32().unwrap() - 39.0).abs() < 0.01);
        assert_eq!(celsius.to_string().split(' ').last(), Some("°C"));

        let weight = ReadingValue::Measurement {
            value: 70.0,
            unit: Unit::Kilogram,
        };
        assert_eq!(weight.to_temperature_unit(Unit::Celsius), None);
        assert_eq!(
            build_reading(DeviceKind::WeightScale, Some(&[0x00, 0xB0, 0x36])).temperature_in(Unit::Celsius),
            None
        );
    }

    #[test]
    fn test_thermometer_timestamp_flag_with_short_payload() {
        // timestamp announced but not delivered: key omitted, no panic
        let payload = thermometer_payload(0x02, false);
        let reading = build_reading(DeviceKind::Thermometer, Some(&payload));

        assert_eq!(reading.keys().collect::<Vec<_>>(), vec![labels::TEMPERATURE]);
    }

    #[test]
    fn test_thermometer_measurement_site() {
        let mut payload = thermometer_payload(0x06, true);
        payload.push(0x03);
        let reading = build_reading(DeviceKind::Thermometer, Some(&payload));
        assert_eq!(
            reading.get(labels::MEASUREMENT_SITE),
            Some(&ReadingValue::Text("Ear".to_string()))
        );

        // without a timestamp the site byte directly follows the temperature
        let mut payload = thermometer_payload(0x04, false);
        payload.push(0x06);
        let reading = build_reading(DeviceKind::Thermometer, Some(&payload));
        assert_eq!(
            reading.get(labels::MEASUREMENT_SITE),
            Some(&ReadingValue::Text("Mouth".to_string()))
        );
    }

    #[test]
    fn test_thermometer_flag_only() {
        let reading = build_reading(DeviceKind::Thermometer, Some(&[0x00]));
        assert!(reading.is_empty());
    }

    #[test]
    fn test_blood_pressure_placeholder_labels() {
        let mut payload = vec![0x00, 0xFA, 0x00, 0x00, 0xFF];
        payload.extend_from_slice(&TIMESTAMP_2024_06_15);
        let reading = build_reading(DeviceKind::BloodPressureMonitor, Some(&payload));

        assert_eq!(
            reading.keys().collect::<Vec<_>>(),
            vec![labels::TEMPERATURE, labels::TIMESTAMP]
        );
        assert_eq!(
            reading.get(labels::TEMPERATURE),
            Some(&ReadingValue::Number(25.0))
        );
    }

    #[test]
    fn test_weight_scale_kilograms() {
        let reading = build_reading(DeviceKind::WeightScale, Some(&[0x00, 0xB0, 0x36]));
        assert_eq!(reading.get(labels::WEIGHT).unwrap().to_string(), "70 kg");
    }

    #[test]
    fn test_weight_scale_without_flags() {
        let reading = decode_weight_scale(None, &[0x01, 0xB0, 0x36]);
        assert_eq!(
            reading.get(labels::WEIGHT),
            Some(&ReadingValue::Measurement {
                value: 70.0,
                unit: Unit::Kilogram
            })
        );
        assert_eq!(reading.len(), 1);
    }

    #[test]
    fn test_weight_scale_all_fields() {
        let mut payload = vec![0b0000_1111, 0xB0, 0x36];
        payload.extend_from_slice(&TIMESTAMP_2024_06_15);
        payload.push(0x02); // user 2
        payload.extend_from_slice(&[0xE1, 0x00, 0xBC, 0x02]); // BMI 22.5, 70.0 in
        let reading = build_reading(DeviceKind::WeightScale, Some(&payload));

        assert_eq!(
            reading.keys().collect::<Vec<_>>(),
            vec![
                labels::WEIGHT,
                labels::TIMESTAMP,
                labels::USER_ID,
                labels::BMI,
                labels::HEIGHT
            ]
        );
        assert_eq!(reading.get(labels::WEIGHT).unwrap().to_string(), "70 lb");
        assert_eq!(reading.get(labels::USER_ID).unwrap().to_string(), "2");
        assert_eq!(reading.get(labels::HEIGHT).unwrap().to_string(), "70 in");
    }

    #[test]
    fn test_weight_scale_unknown_user() {
        let reading = build_reading(DeviceKind::WeightScale, Some(&[0x04, 0xB0, 0x36, 0xFF]));
        assert_eq!(reading.get(labels::USER_ID).unwrap().to_string(), "Unknown user");
    }

    #[test]
    fn test_unknown_kind_is_empty() {
        let reading = build_reading(DeviceKind::Unknown, Some(&[0x00, 0x01, 0x02, 0x03, 0x04]));
        assert!(reading.is_empty());
        assert_eq!(reading.kind(), DeviceKind::Unknown);
    }

    #[test]
    fn test_keys_subset_of_display_keys() {
        let payloads: [&[u8]; 4] = [&[], &[0xFF], &[0x0F, 1, 2, 3, 4, 5, 6], &[0x07; 20]];
        for kind in DeviceKind::CLASSIFICATION_ORDER {
            for payload in payloads {
                let reading = build_reading(kind, Some(payload));
                for key in reading.keys() {
                    assert!(kind.display_keys().contains(&key), "{kind}: {key}");
                }
            }
        }
    }
}
