//! Percent codec for raw binary query values such as `info_hash` and `peer_id`.
//!
//! The tracker client and the announce server both go through this module so
//! the two sides agree on every byte.

/// Encodes every byte as `%XX`, including unreserved ASCII.
pub fn encode_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("%{b:02X}")).collect()
}

/// Reverses percent-encoding. Unescaped bytes and malformed escapes pass through as-is.
pub fn decode_bytes(value: &str) -> Vec<u8> {
    urlencoding::decode_binary(value.as_bytes()).into_owned()
}
