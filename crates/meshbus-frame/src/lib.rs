//! Length-prefixed, type-tagged message framing for meshbus.
//!
//! Every message blob handed to the transport is framed with:
//! - An 8-byte big-endian payload length
//! - A 1-byte type tag (0 = raw payload, 1-255 = registered message type)
//!
//! The transport preserves message boundaries, so one blob carries exactly
//! one frame. Short, incomplete or over-long blobs are explicit errors.

pub mod codec;
pub mod error;
pub mod tag;

pub use codec::{decode, decode_frame, encode, encode_frame, Frame, HEADER_SIZE, LENGTH_SIZE};
pub use error::{FrameError, Result};
pub use tag::{is_raw, tag_name, RAW};
