//! Encoder and decoder for JSON text frames.

use crate::error::ProtocolError;
use crate::message::{InboundMessage, OutboundMessage, Reply};
use serde_json::Value;

/// Encodes messages into text frames.
pub struct Encoder;

impl Encoder {
    /// Encodes an outbound job into a frame.
    pub fn encode(message: &OutboundMessage) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(message)?)
    }

    /// Encodes a daemon reply into a frame.
    pub fn encode_reply(reply: &Reply) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(reply)?)
    }
}

/// Decodes and classifies inbound frames.
pub struct Decoder;

impl Decoder {
    /// Classifies an inbound frame.
    ///
    /// - Text that is not JSON, or is JSON `null`, becomes a
    ///   [`InboundMessage::Notice`] carrying the frame verbatim.
    /// - `"ack"` frames become acknowledgements; a missing `success` reads as
    ///   failure and a missing `message` as empty text.
    /// - `"info"` frames become notices.
    /// - Anything else, including other JSON that is not an object, yields `None`
    ///   and must be dropped without a trace.
    pub fn decode(frame: &str) -> Option<InboundMessage> {
        let value: Value = match serde_json::from_str(frame) {
            Ok(Value::Null) | Err(_) => return Some(InboundMessage::notice(frame)),
            Ok(v) => v,
        };

        let text = || {
            value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        match value.get("tipo").and_then(Value::as_str) {
            Some(Reply::ACK) => {
                let succeeded = value
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                Some(InboundMessage::acknowledgement(succeeded, text()))
            }
            Some(Reply::INFO) => Some(InboundMessage::notice(text())),
            _ => None,
        }
    }

    /// Parses an outbound frame, as the daemon side would.
    pub fn decode_outbound(frame: &str) -> Result<OutboundMessage, ProtocolError> {
        Ok(serde_json::from_str(frame)?)
    }
}
