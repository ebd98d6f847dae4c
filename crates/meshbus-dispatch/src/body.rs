use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::BodyError;

/// Pluggable message-body serialization.
///
/// The frame layer never looks inside a body; this is the only place the
/// byte format of a typed message is decided.
pub trait BodyCodec: Send + Sync + 'static {
    /// Short codec name for diagnostics.
    fn name(&self) -> &'static str;

    fn encode<M: Serialize>(&self, message: &M) -> Result<Vec<u8>, BodyError>;

    fn decode<M: DeserializeOwned>(&self, bytes: &[u8]) -> Result<M, BodyError>;
}

/// JSON bodies via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl BodyCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<M: Serialize>(&self, message: &M) -> Result<Vec<u8>, BodyError> {
        Ok(serde_json::to_vec(message)?)
    }

    fn decode<M: DeserializeOwned>(&self, bytes: &[u8]) -> Result<M, BodyError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
