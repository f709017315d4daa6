//! JSON message types for outbound jobs and inbound daemon replies.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Kind of job submitted to the printing daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Printer selection and daemon settings.
    Config,
    /// Ticket layout template.
    Template,
    /// Sale ticket to print.
    Ticket,
    /// Free text to print.
    Print,
}

impl MessageKind {
    /// All kinds, in the order the daemon expects them to be configured.
    pub const ALL: [MessageKind; 4] = [
        MessageKind::Config,
        MessageKind::Template,
        MessageKind::Ticket,
        MessageKind::Print,
    ];

    /// Returns the `tipo` discriminator used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Config => "config",
            MessageKind::Template => "template",
            MessageKind::Ticket => "ticket",
            MessageKind::Print => "print",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "config" | "print configuration" => Ok(MessageKind::Config),
            "template" | "print template" => Ok(MessageKind::Template),
            "ticket" | "print ticket" => Ok(MessageKind::Ticket),
            "print" | "text" | "print free text" => Ok(MessageKind::Print),
            _ => Err(ProtocolError::UnknownKind(s.to_string())),
        }
    }
}

/// Outbound job envelope.
///
/// Serializes as `{"tipo": <kind>, "datos": {"data": <payload>}}`. The
/// payload is caller-assembled and passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Job kind.
    #[serde(rename = "tipo")]
    pub kind: MessageKind,

    /// Caller-assembled payload.
    #[serde(rename = "datos", with = "data_envelope")]
    pub payload: Value,
}

impl OutboundMessage {
    pub fn new(kind: MessageKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// Builds a free-text job, optionally cutting the paper afterwards.
    pub fn text(text: impl Into<String>, cut: bool) -> Self {
        Self::new(
            MessageKind::Print,
            serde_json::json!({
                "texto": text.into(),
                "cortar": cut,
            }),
        )
    }
}

mod data_envelope {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    #[derive(Serialize)]
    struct Borrowed<'a> {
        data: &'a Value,
    }

    #[derive(Deserialize)]
    struct Owned {
        #[serde(default)]
        data: Value,
    }

    pub fn serialize<S>(payload: &Value, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Borrowed { data: payload }.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        Owned::deserialize(deserializer).map(|owned| owned.data)
    }
}

/// Classified message received from the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Informational text with no success/failure meaning.
    Notice { text: String },
    /// Outcome of some earlier submission. Carries no reference to which one.
    Acknowledgement { succeeded: bool, text: String },
}

impl InboundMessage {
    pub fn notice(text: impl Into<String>) -> Self {
        InboundMessage::Notice { text: text.into() }
    }

    pub fn acknowledgement(succeeded: bool, text: impl Into<String>) -> Self {
        InboundMessage::Acknowledgement {
            succeeded,
            text: text.into(),
        }
    }

    /// Returns the human-readable text.
    pub fn text(&self) -> &str {
        match self {
            InboundMessage::Notice { text } => text,
            InboundMessage::Acknowledgement { text, .. } => text,
        }
    }

    pub fn is_acknowledgement(&self) -> bool {
        matches!(self, InboundMessage::Acknowledgement { .. })
    }
}

/// Reply frame as the daemon writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Discriminator, `"ack"` or `"info"`.
    pub tipo: String,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,

    /// Outcome, only meaningful for `"ack"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl Reply {
    pub const ACK: &'static str = "ack";
    pub const INFO: &'static str = "info";

    pub fn ack(success: bool, message: impl Into<String>) -> Self {
        Self {
            tipo: Self::ACK.to_string(),
            message: message.into(),
            success: Some(success),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            tipo: Self::INFO.to_string(),
            message: message.into(),
            success: None,
        }
    }
}

impl From<InboundMessage> for Reply {
    fn from(msg: InboundMessage) -> Self {
        match msg {
            InboundMessage::Notice { text } => Reply::info(text),
            InboundMessage::Acknowledgement { succeeded, text } => Reply::ack(succeeded, text),
        }
    }
}
