//! High-level client API.

use crate::connection::{ConnectionConfig, ConnectionManager, ConnectionState};
use crate::error::ClientError;
use crate::exchange::MessageExchange;
use crate::transport::{Connector, WsConnector};
use printrelay_protocol::models::{PrinterConfig, Ticket, TicketTemplate, ToJob};
use printrelay_protocol::{InboundMessage, MessageKind, OutboundMessage};
use serde_json::Value;
use std::sync::Arc;

/// High-level client for the printing daemon.
///
/// One client owns one connection. Jobs go out only while connected; there
/// is no outbound queue, so a job submitted while disconnected is rejected
/// with [`ClientError::TransportUnavailable`] and must be resubmitted by the
/// caller.
pub struct PrintClient<C: Connector = WsConnector> {
    manager: Arc<ConnectionManager<C>>,
    exchange: MessageExchange<C>,
}

impl PrintClient<WsConnector> {
    /// Creates a WebSocket client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, WsConnector::new())
    }
}

impl<C: Connector> PrintClient<C> {
    /// Creates a client over a custom transport.
    pub fn with_connector(config: ConnectionConfig, connector: C) -> Self {
        let manager = Arc::new(ConnectionManager::new(config, connector));
        let exchange = MessageExchange::new(manager.clone());
        Self { manager, exchange }
    }

    /// Starts connecting to `endpoint` and keeps reconnecting until stopped.
    pub fn start(&self, endpoint: impl Into<String>) -> Result<(), ClientError> {
        self.manager.start(endpoint)
    }

    /// Stops the connection.
    pub fn stop(&self) {
        self.manager.stop()
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Returns whether a job is awaiting its acknowledgement.
    pub fn is_busy(&self) -> bool {
        self.exchange.is_busy()
    }

    /// Registers a callback invoked on every connection state transition.
    pub fn on_state_change(&self, observer: impl Fn(ConnectionState) + Send + Sync + 'static) {
        self.manager.on_state_change(observer)
    }

    /// Registers a callback invoked with every acknowledgement and notice.
    pub fn on_frame(&self, observer: impl Fn(&InboundMessage) + Send + Sync + 'static) {
        self.exchange.on_message(observer)
    }

    /// Registers a callback invoked when the busy hint flips.
    pub fn on_busy_change(&self, observer: impl Fn(bool) + Send + Sync + 'static) {
        self.exchange.on_busy_change(observer)
    }

    /// Returns the underlying connection manager.
    pub fn manager(&self) -> &Arc<ConnectionManager<C>> {
        &self.manager
    }

    // =========================================================================
    // Jobs
    // =========================================================================

    /// Submits a job with a caller-assembled payload.
    pub fn submit(&self, kind: MessageKind, payload: Value) -> Result<(), ClientError> {
        self.exchange.submit(kind, payload)
    }

    /// Submits any typed payload.
    pub fn submit_job<T: ToJob>(&self, job: &T) -> Result<(), ClientError> {
        self.exchange.submit_message(&job.to_job()?)
    }

    /// Selects the printer on the daemon host.
    pub fn print_config(&self, config: &PrinterConfig) -> Result<(), ClientError> {
        self.submit_job(config)
    }

    /// Sends the ticket layout template.
    pub fn print_template(&self, template: &TicketTemplate) -> Result<(), ClientError> {
        self.submit_job(template)
    }

    /// Prints a sale ticket.
    pub fn print_ticket(&self, ticket: &Ticket) -> Result<(), ClientError> {
        self.submit_job(ticket)
    }

    /// Prints free text, optionally cutting the paper afterwards.
    ///
    /// Surrounding whitespace is trimmed before sending.
    pub fn print_text(&self, text: &str, cut: bool) -> Result<(), ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyPayload);
        }
        self.exchange.submit_message(&OutboundMessage::text(text, cut))
    }
}
