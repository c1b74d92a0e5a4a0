//! Trace and span identifier generation
//!
//! Identifiers are lowercase hex so they can be placed into any of the
//! supported header vocabularies without re-encoding: trace ids are 16 bytes
//! (32 hex chars), span ids 8 bytes (16 hex chars).

use uuid::Uuid;

/// Hex length of a trace id
pub const TRACE_ID_HEX_LEN: usize = 32;

/// Hex length of a span id
pub const SPAN_ID_HEX_LEN: usize = 16;

/// Generate a fresh random trace id
pub fn generate_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Generate a fresh random span id
pub fn generate_span_id() -> String {
    let uuid = Uuid::new_v4();
    hex::encode(&uuid.as_bytes()[..SPAN_ID_HEX_LEN / 2])
}

/// True if `value` is exactly `len` lowercase-or-uppercase hex characters and not all zero
pub fn is_valid_hex_id(value: &str, len: usize) -> bool {
    value.len() == len
        && value.bytes().all(|b| b.is_ascii_hexdigit())
        && value.bytes().any(|b| b != b'0')
}
