//! Type tags.
//!
//! Tag 0 is reserved for raw, untyped payloads.
//! Tags 1-255 are assigned to message types at registration time.

/// Raw payload, delivered to raw subscribers without decoding.
pub const RAW: u8 = 0;

/// Returns a human-readable name for a tag.
pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        RAW => "RAW",
        _ => "TYPED",
    }
}

/// Returns true if the tag carries a raw payload.
pub fn is_raw(tag: u8) -> bool {
    tag == RAW
}
