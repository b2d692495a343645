//! GUID text/byte conversion.
//!
//! Firmware stores GUIDs with the first three fields in the platform's byte
//! order and the last eight bytes as-is. On little-endian machines that is
//! the familiar "mixed endian" layout.

use uuid::Uuid;

/// Parse a GUID in its canonical hyphenated text form. Case is ignored.
pub fn parse_guid(text: &str) -> Option<Uuid> {
    let text = text.trim();
    if text.len() != 36 {
        return None;
    }
    Uuid::parse_str(text).ok()
}

/// Encode a GUID the way firmware stores it in memory.
pub fn guid_to_bytes(guid: &Uuid) -> [u8; 16] {
    if cfg!(target_endian = "little") {
        guid.to_bytes_le()
    } else {
        *guid.as_bytes()
    }
}

/// Decode a GUID from its firmware in-memory representation.
pub fn guid_from_bytes(bytes: [u8; 16]) -> Uuid {
    if cfg!(target_endian = "little") {
        Uuid::from_bytes_le(bytes)
    } else {
        Uuid::from_bytes(bytes)
    }
}
