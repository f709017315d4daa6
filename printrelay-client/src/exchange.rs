//! Job submission and reply classification on top of a connection manager.

use crate::connection::ConnectionManager;
use crate::error::ClientError;
use crate::transport::Connector;
use parking_lot::Mutex;
use printrelay_protocol::{Decoder, Encoder, InboundMessage, MessageKind, OutboundMessage};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type MessageObserver = Arc<dyn Fn(&InboundMessage) + Send + Sync>;
type BusyObserver = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Default)]
struct Inner {
    busy: AtomicBool,
    message_observers: Mutex<Vec<MessageObserver>>,
    busy_observers: Mutex<Vec<BusyObserver>>,
}

impl Inner {
    fn set_busy(&self, busy: bool) {
        if self.busy.swap(busy, Ordering::SeqCst) == busy {
            return;
        }
        let observers = self.busy_observers.lock().clone();
        for observer in observers {
            observer(busy);
        }
    }

    fn decode(&self, frame: &str) -> Option<InboundMessage> {
        let message = Decoder::decode(frame)?;

        if message.is_acknowledgement() {
            self.set_busy(false);
        }

        let observers = self.message_observers.lock().clone();
        for observer in observers {
            observer(&message);
        }
        Some(message)
    }
}

/// Encodes jobs onto a [`ConnectionManager`] and classifies what comes back.
///
/// The exchange keeps a busy hint: set when a job is sent, cleared by the
/// next acknowledgement. It is advisory only and never blocks submission.
pub struct MessageExchange<C: Connector> {
    manager: Arc<ConnectionManager<C>>,
    inner: Arc<Inner>,
}

impl<C: Connector> MessageExchange<C> {
    /// Wraps `manager` and subscribes to its inbound frames.
    pub fn new(manager: Arc<ConnectionManager<C>>) -> Self {
        let inner = Arc::new(Inner::default());
        let decoder = inner.clone();
        manager.on_frame(move |frame| {
            decoder.decode(frame);
        });
        Self { manager, inner }
    }

    /// Sends one job of `kind` with `payload` as its data object.
    ///
    /// Without a live connection nothing is sent or queued and
    /// [`ClientError::TransportUnavailable`] is returned. No observer hears
    /// about the rejection; the caller is responsible for surfacing it.
    pub fn submit(&self, kind: MessageKind, payload: Value) -> Result<(), ClientError> {
        self.submit_message(&OutboundMessage::new(kind, payload))
    }

    /// Sends an already built job.
    pub fn submit_message(&self, message: &OutboundMessage) -> Result<(), ClientError> {
        if !self.manager.is_connected() {
            tracing::warn!("No connection to the printing daemon, dropping {} job", message.kind);
            return Err(ClientError::TransportUnavailable);
        }

        let frame = Encoder::encode(message)?;
        self.manager.send(frame).map_err(|e| match e {
            ClientError::NotConnected | ClientError::ConnectionClosed => {
                tracing::warn!("Connection lost, dropping {} job", message.kind);
                ClientError::TransportUnavailable
            }
            other => other,
        })?;

        tracing::debug!("Sent {} job", message.kind);
        self.inner.set_busy(true);
        Ok(())
    }

    /// Classifies one inbound frame and notifies message observers.
    ///
    /// Frames with an unknown `tipo` yield `None` and reach no observer.
    pub fn decode(&self, frame: &str) -> Option<InboundMessage> {
        self.inner.decode(frame)
    }

    /// Registers a callback invoked with every classified inbound message.
    pub fn on_message(&self, observer: impl Fn(&InboundMessage) + Send + Sync + 'static) {
        self.inner.message_observers.lock().push(Arc::new(observer));
    }

    /// Registers a callback invoked when the busy hint flips.
    pub fn on_busy_change(&self, observer: impl Fn(bool) + Send + Sync + 'static) {
        self.inner.busy_observers.lock().push(Arc::new(observer));
    }

    /// Returns whether a job was sent and no acknowledgement has arrived yet.
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst)
    }

    pub fn manager(&self) -> &Arc<ConnectionManager<C>> {
        &self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionConfig, ConnectionState};
    use crate::transport::mock::{MockConnector, MockRemote};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    async fn connected() -> (MessageExchange<MockConnector>, MockRemote) {
        let (connector, mut remotes) = MockConnector::new();
        let manager = Arc::new(ConnectionManager::new(ConnectionConfig::default(), connector));
        let (tx, mut states) = mpsc::unbounded_channel();
        manager.on_state_change(move |state| {
            let _ = tx.send(state);
        });
        let exchange = MessageExchange::new(manager.clone());
        manager.start("ws://localhost:8766/ws").unwrap();

        let remote = remotes.recv().await.unwrap();
        while let Some(state) = states.recv().await {
            if state == ConnectionState::Connected {
                break;
            }
        }
        (exchange, remote)
    }

    fn record_messages<C: Connector>(
        exchange: &MessageExchange<C>,
    ) -> mpsc::UnboundedReceiver<InboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        exchange.on_message(move |message| {
            let _ = tx.send(message.clone());
        });
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_frame_shape() {
        let (exchange, mut remote) = connected().await;
        let payload = json!({"folio": "F-1", "total": 10.5});

        exchange.submit(MessageKind::Ticket, payload.clone()).unwrap();

        let frame = remote.next_frame().await.unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"tipo": "ticket", "datos": {"data": payload}}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_without_connection() {
        let (connector, _remotes) = MockConnector::refusing();
        let manager = Arc::new(ConnectionManager::new(ConnectionConfig::default(), connector));
        let exchange = MessageExchange::new(manager);

        let result = exchange.submit(MessageKind::Print, json!({"texto": "hola", "cortar": false}));
        assert!(matches!(result, Err(ClientError::TransportUnavailable)));
        assert!(!exchange.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_after_close_is_not_queued() {
        let (exchange, mut remote) = connected().await;
        let (tx, mut states) = mpsc::unbounded_channel();
        exchange.manager().on_state_change(move |state| {
            let _ = tx.send(state);
        });

        remote.close();
        assert_eq!(states.recv().await, Some(ConnectionState::Disconnected));

        let result = exchange.submit(MessageKind::Config, json!({"printer": "P1"}));
        assert!(matches!(result, Err(ClientError::TransportUnavailable)));
        assert_eq!(remote.try_frame(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_job_then_ack() {
        let (exchange, mut remote) = connected().await;
        let mut messages = record_messages(&exchange);

        exchange
            .submit(MessageKind::Config, json!({"printer": "80mm EC-PM-80250"}))
            .unwrap();
        let frame = remote.next_frame().await.unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&frame).unwrap(),
            json!({"tipo": "config", "datos": {"data": {"printer": "80mm EC-PM-80250"}}})
        );
        assert_eq!(remote.try_frame(), None);

        remote.send_frame(r#"{"tipo":"ack","success":true,"message":"done"}"#);
        assert_eq!(
            messages.recv().await,
            Some(InboundMessage::acknowledgement(true, "done"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_delivered_to_observers() {
        let (exchange, remote) = connected().await;
        let mut messages = record_messages(&exchange);

        remote.send_frame(r#"{"tipo":"ack","success":true,"message":"TICKET ok"}"#);
        assert_eq!(
            messages.recv().await,
            Some(InboundMessage::acknowledgement(true, "TICKET ok"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_kind_reaches_no_observer() {
        let (exchange, remote) = connected().await;
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        exchange.on_message(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut messages = record_messages(&exchange);

        remote.send_frame(r#"{"tipo":"unknown"}"#);
        remote.send_frame(r#"{"tipo":"info","message":"hi"}"#);

        assert_eq!(messages.recv().await, Some(InboundMessage::notice("hi")));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_raw_text_frame_is_notice() {
        let (exchange, remote) = connected().await;
        let mut messages = record_messages(&exchange);

        remote.send_frame("printer warming up");
        assert_eq!(
            messages.recv().await,
            Some(InboundMessage::notice("printer warming up"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_hint() {
        let (exchange, mut remote) = connected().await;
        let (tx, mut busy) = mpsc::unbounded_channel();
        exchange.on_busy_change(move |value| {
            let _ = tx.send(value);
        });
        let mut messages = record_messages(&exchange);
        assert!(!exchange.is_busy());

        exchange.submit(MessageKind::Print, json!({"texto": "a", "cortar": true})).unwrap();
        assert!(exchange.is_busy());
        assert_eq!(busy.recv().await, Some(true));

        // Busy does not block a second submission.
        exchange.submit(MessageKind::Print, json!({"texto": "b", "cortar": true})).unwrap();
        assert!(remote.next_frame().await.is_some());
        assert!(remote.next_frame().await.is_some());

        // Notices leave the hint alone.
        remote.send_frame(r#"{"tipo":"info","message":"queued"}"#);
        messages.recv().await.unwrap();
        assert!(exchange.is_busy());

        remote.send_frame(r#"{"tipo":"ack","success":false,"message":"no paper"}"#);
        messages.recv().await.unwrap();
        assert!(!exchange.is_busy());
        assert_eq!(busy.recv().await, Some(false));
    }

    #[test]
    fn test_decode_direct() {
        let (connector, _remotes) = MockConnector::new();
        let manager = Arc::new(ConnectionManager::new(ConnectionConfig::default(), connector));
        let exchange = MessageExchange::new(manager);

        assert_eq!(exchange.decode(r#"{"tipo":"nope"}"#), None);
        assert_eq!(
            exchange.decode(r#"{"tipo":"ack"}"#),
            Some(InboundMessage::acknowledgement(false, ""))
        );
    }
}
