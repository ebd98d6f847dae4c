use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Size of the big-endian length prefix.
pub const LENGTH_SIZE: usize = 8;

/// Frame header: length (8) + tag (1) = 9 bytes.
pub const HEADER_SIZE: usize = LENGTH_SIZE + 1;

/// A framed message with its type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The type tag this message belongs to.
    pub tag: u8,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(tag: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    /// Payload length as carried in the header.
    pub fn payload_len(&self) -> u64 {
        self.payload.len() as u64
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode this frame into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        encode(&self.payload, self.tag)
    }
}

/// Append a frame to `dst` in the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────────────┬──────────┬──────────────────┐
/// │ Length (8B BE u64) │ Tag (1B) │ Payload          │
/// │                    │          │ (Length bytes)   │
/// └────────────────────┴──────────┴──────────────────┘
/// ```
pub fn encode_frame(tag: u8, payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u64(payload.len() as u64);
    dst.put_u8(tag);
    dst.put_slice(payload);
}

/// Encode `payload` under `tag` into a new buffer.
pub fn encode(payload: &[u8], tag: u8) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_frame(tag, payload, &mut buf);
    buf.freeze()
}

/// Decode exactly one frame from a complete message blob.
///
/// The payload shares the blob's allocation.
pub fn decode_frame(src: Bytes) -> Result<Frame> {
    let (tag, expected) = parse_header(&src)?;
    let payload = src.slice(HEADER_SIZE..HEADER_SIZE + expected);
    Ok(Frame { tag, payload })
}

/// Decode exactly one frame from a borrowed blob, copying the payload.
pub fn decode(src: &[u8]) -> Result<Frame> {
    let (tag, expected) = parse_header(src)?;
    let payload = Bytes::copy_from_slice(&src[HEADER_SIZE..HEADER_SIZE + expected]);
    Ok(Frame { tag, payload })
}

/// Validate the header against the blob and return `(tag, payload_len)`.
fn parse_header(src: &[u8]) -> Result<(u8, usize)> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            available: src.len(),
            needed: HEADER_SIZE,
        });
    }

    let mut length = [0u8; LENGTH_SIZE];
    length.copy_from_slice(&src[..LENGTH_SIZE]);
    let expected = u64::from_be_bytes(length);
    let tag = src[LENGTH_SIZE];

    let available = src.len() - HEADER_SIZE;
    if (available as u64) < expected {
        return Err(FrameError::Incomplete {
            expected,
            available,
        });
    }
    if (available as u64) > expected {
        return Err(FrameError::TrailingData {
            expected,
            extra: available - expected as usize,
        });
    }

    Ok((tag, expected as usize))
}
