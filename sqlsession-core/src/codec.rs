//! Session blob encoding
//!
//! The store and provider only see opaque bytes; the codec owns the format.

use crate::error::{CodecDirection, SessionError, SessionResult};
use crate::types::SessionData;

/// Encode/decode pair for the persisted session blob.
///
/// Implementations must round-trip losslessly: `decode(encode(m)) == m` for every
/// map, including the empty one.
pub trait SessionCodec: Send + Sync + std::fmt::Debug {
    /// Short name used in logs and error metadata
    fn name(&self) -> &'static str;

    fn encode(&self, data: &SessionData) -> SessionResult<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> SessionResult<SessionData>;
}

/// JSON object encoding of the session map
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl SessionCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, data: &SessionData) -> SessionResult<Vec<u8>> {
        serde_json::to_vec(data)
            .map_err(|e| SessionError::codec(CodecDirection::Encode, self.name(), e))
    }

    fn decode(&self, bytes: &[u8]) -> SessionResult<SessionData> {
        serde_json::from_slice(bytes)
            .map_err(|e| SessionError::codec(CodecDirection::Decode, self.name(), e))
    }
}
