//! Transport capability the telemetry client runs on.
//!
//! A [`Transport`] opens a [`Connection`] without blocking; everything that
//! happens afterwards (handshake result, frames, errors, close) is reported
//! as [`TransportEvent`]s on the connection's event channel.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

use crate::config::Endpoint;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection attempt timed out")]
    ConnectTimeout,
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("websocket error: {0}")]
    Protocol(String),
    #[error("connection is not open")]
    NotOpen,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(Vec<u8>),
    Error(TransportError),
    Closed,
}

pub trait Transport: Send + Sync + 'static {
    /// Starts opening a connection. Failures arrive later as events, never here.
    fn open(&self, endpoint: &Endpoint) -> Connection;
}

/// Handle to one transport session. Dropping it tears the session down.
pub struct Connection {
    events: mpsc::Receiver<TransportEvent>,
    outbound: mpsc::Sender<String>,
    task: Option<JoinHandle<()>>,
}

impl Connection {
    pub fn new(events: mpsc::Receiver<TransportEvent>, outbound: mpsc::Sender<String>) -> Self {
        Self { events, outbound, task: None }
    }

    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn send(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.outbound.try_send(text.into()).map_err(|_| TransportError::NotOpen)
    }

    /// `None` once the transport side has gone away.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Plain `ws://` transport over tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl Transport for WsTransport {
    fn open(&self, endpoint: &Endpoint) -> Connection {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (outbound_tx, outbound_rx) = mpsc::channel(16);
        let task = tokio::spawn(ws_session(endpoint.url(), events_tx, outbound_rx));
        Connection::new(events_rx, outbound_tx).with_task(task)
    }
}

async fn ws_session(
    url: String,
    events: mpsc::Sender<TransportEvent>,
    mut outbound: mpsc::Receiver<String>,
) {
    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            let _ = events.send(TransportEvent::Error(TransportError::Handshake(e.to_string()))).await;
            let _ = events.send(TransportEvent::Closed).await;
            return;
        }
    };
    debug!(%url, "WebSocket handshake complete");
    if events.send(TransportEvent::Opened).await.is_err() {
        return;
    }

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            frame = read.next() => {
                let event = match frame {
                    Some(Ok(Message::Text(text))) => TransportEvent::Message(text.into_bytes()),
                    Some(Ok(Message::Binary(bytes))) => TransportEvent::Message(bytes),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "WebSocket close frame received");
                        break;
                    }
                    Some(Ok(other)) => {
                        // ping/pong are answered by tungstenite itself
                        trace!(?other, "Ignoring control frame");
                        continue;
                    }
                    Some(Err(e)) => {
                        let _ = events.send(TransportEvent::Error(TransportError::Protocol(e.to_string()))).await;
                        break;
                    }
                    None => break,
                };
                if events.send(event).await.is_err() {
                    return;
                }
            }
            out = outbound.recv() => {
                let Some(text) = out else {
                    let _ = write.close().await;
                    return;
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    let _ = events.send(TransportEvent::Error(TransportError::Protocol(e.to_string()))).await;
                    break;
                }
            }
        }
    }
    let _ = events.send(TransportEvent::Closed).await;
}
