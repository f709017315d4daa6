//! # printrelay-protocol
//!
//! Wire protocol spoken between printrelay clients and the receipt-printing
//! daemon.
//!
//! This crate provides:
//! - Message kinds and the outbound `{"tipo", "datos"}` envelope
//! - Classification of inbound `ack` / `info` frames
//! - JSON encoder and decoder for text frames
//! - Typed payload models for printer configuration, templates and tickets

pub mod codec;
pub mod error;
pub mod message;
pub mod models;

pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use message::{InboundMessage, MessageKind, OutboundMessage, Reply};

/// Default port the printing daemon listens on.
pub const DEFAULT_PORT: u16 = 8766;

/// Path of the WebSocket endpoint on the daemon.
pub const WS_PATH: &str = "/ws";

/// Default endpoint used when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8766/ws";

/// Builds the daemon endpoint for a bare host name or address.
///
/// A host that already carries a port is used as-is.
pub fn endpoint_for_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.rsplit_once(':').is_some_and(|(_, port)| port.parse::<u16>().is_ok()) {
        format!("ws://{}{}", host, WS_PATH)
    } else {
        format!("ws://{}:{}{}", host, DEFAULT_PORT, WS_PATH)
    }
}
