//! UTF-16 string values.

/// Decode a UTF-16 variable value in native byte order.
///
/// Firmware and boot loaders terminate strings inconsistently: no
/// terminator, one NUL code unit, or several NUL bytes (systemd-boot writes
/// three). A dangling odd byte is dropped, then every trailing NUL code unit
/// is removed. Unpaired surrogates become U+FFFD rather than failing.
pub fn decode_utf16_value(value: &[u8]) -> String {
    let even = value.len() - value.len() % 2;
    let mut units: Vec<u16> = value[..even]
        .chunks_exact(2)
        .map(|c| u16::from_ne_bytes([c[0], c[1]]))
        .collect();

    while units.last() == Some(&0) {
        units.pop();
    }

    String::from_utf16_lossy(&units)
}

/// Encode a string as a native byte order UTF-16 value without terminator.
pub fn encode_utf16_value(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|u| u.to_ne_bytes()).collect()
}
