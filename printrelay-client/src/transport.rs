//! Transport seam between the connection manager and the socket.
//!
//! A [`Connector`] opens a [`Link`]: a sender for outbound text frames and a
//! receiver of inbound [`TransportEvent`]s. The manager owns the link for as
//! long as it stays open and never touches the socket directly.

use crate::error::ClientError;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Event delivered by an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One complete inbound text frame.
    Frame(String),
    /// The link is gone, by either side or by network fault.
    Closed,
}

/// An open transport link.
///
/// Dropping the `outbound` sender asks the transport to shut the link down.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens links to an endpoint.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, endpoint: &str) -> impl Future<Output = Result<Link, ClientError>> + Send;
}

/// WebSocket connector backed by tokio-tungstenite.
///
/// `wss://` endpoints are handled through rustls with webpki roots.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link, ClientError> {
        let (ws, _response) = connect_async(endpoint).await?;
        tracing::debug!("WebSocket handshake with {} complete", endpoint);

        let (mut sink, mut stream) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel::<TransportEvent>();

        let reader_tx = inbound_tx.clone();
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let frame = match msg {
                    Ok(Message::Text(text)) => text.as_str().to_owned(),
                    Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                    Ok(Message::Close(frame)) => {
                        tracing::debug!("Received close frame: {:?}", frame);
                        break;
                    }
                    // Ping/pong are answered by tungstenite.
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!("WebSocket read error: {}", e);
                        break;
                    }
                };
                if reader_tx.send(TransportEvent::Frame(frame)).is_err() {
                    return;
                }
            }
            let _ = reader_tx.send(TransportEvent::Closed);
        });

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                tracing::debug!("Sending frame ({} bytes)", frame.len());
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    tracing::warn!("WebSocket send failed: {}", e);
                    let _ = inbound_tx.send(TransportEvent::Closed);
                    return;
                }
            }
            tracing::debug!("Link released, closing socket");
            let _ = sink.close().await;
        });

        Ok(Link { outbound, inbound })
    }
}
