//! Utility functions for the healthmate-ble crate.

/// Convert Celsius to Fahrenheit.
///
/// # Example
///
/// ```
/// use healthmate_ble::celsius_to_fahrenheit;
///
/// let fahrenheit = celsius_to_fahrenheit(100.0);
/// assert!((fahrenheit - 212.0).abs() < 0.001);
/// ```
#[inline]
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Convert Fahrenheit to Celsius.
///
/// # Example
///
/// ```
/// use healthmate_ble::fahrenheit_to_celsius;
///
/// let celsius = fahrenheit_to_celsius(212.0);
/// assert!((celsius - 100.0).abs() < 0.001);
/// ```
#[inline]
pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// Format bytes as space-separated uppercase hex pairs.
///
/// # Example
///
/// ```
/// use healthmate_ble::utils::to_hex_string;
///
/// assert_eq!(to_hex_string(&[0x41, 0x26, 0x0d]), "41 26 0D");
/// ```
pub fn to_hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a hex display string back into bytes.
///
/// Characters outside `0-9a-fA-F` are dropped first, so the output of
/// [`to_hex_string`] is accepted directly. A trailing odd nibble is ignored.
///
/// # Example
///
/// ```
/// use healthmate_ble::utils::hex_to_bytes;
///
/// assert_eq!(hex_to_bytes("41 26 44"), b"A&D".to_vec());
/// ```
pub fn hex_to_bytes(hex: &str) -> Vec<u8> {
    let digits: Vec<u8> = hex
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect();

    digits
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect()
}
