//! Client error types.

use thiserror::Error;

/// Client errors.
///
/// A dropped connection is never reported through this type: it only shows
/// up as a state transition followed by a reconnect.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] printrelay_protocol::ProtocolError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Low-level send attempted without a live link.
    #[error("not connected")]
    NotConnected,

    /// Job submitted while the printing daemon is unreachable.
    #[error("no active connection to the printing daemon")]
    TransportUnavailable,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("connection already started")]
    AlreadyStarted,

    #[error("connection timeout")]
    Timeout,

    #[error("nothing to print")]
    EmptyPayload,
}

impl ClientError {
    /// Returns whether the caller may try the same operation again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::WebSocket(_) => true,
            ClientError::NotConnected => true,
            ClientError::TransportUnavailable => true,
            ClientError::ConnectionClosed => true,
            ClientError::Timeout => true,
            _ => false,
        }
    }
}
