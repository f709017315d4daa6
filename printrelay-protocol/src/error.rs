//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding outbound frames or parsing protocol values.
///
/// Inbound decoding never fails: malformed frames are downgraded to notices
/// and unknown kinds are dropped, see [`crate::codec::Decoder`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown message kind: {0}")]
    UnknownKind(String),
}
