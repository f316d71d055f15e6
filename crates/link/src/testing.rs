// In-memory transport driving the client in tests.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::config::Endpoint;
use crate::transport::{Connection, Transport, TransportError, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Script {
    /// Stay in the handshake until the test says otherwise.
    #[default]
    Silent,
    Accept,
    Refuse,
}

#[derive(Default)]
struct Inner {
    script: Script,
    sessions: Vec<mpsc::Sender<TransportEvent>>,
}

#[derive(Clone, Default)]
pub(crate) struct ChannelTransport {
    inner: Arc<Mutex<Inner>>,
}

impl ChannelTransport {
    pub(crate) fn scripted(script: Script) -> Self {
        let t = Self::default();
        t.set_script(script);
        t
    }

    pub(crate) fn set_script(&self, script: Script) {
        self.inner.lock().unwrap().script = script;
    }

    pub(crate) fn open_count(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }

    /// Pushes an event into the `index`-th opened session (0-based).
    pub(crate) async fn emit(&self, index: usize, event: TransportEvent) {
        let tx = self.inner.lock().unwrap().sessions[index].clone();
        let _ = tx.send(event).await;
    }
}

impl Transport for ChannelTransport {
    fn open(&self, _endpoint: &Endpoint) -> Connection {
        let (tx, rx) = mpsc::channel(32);
        let (out_tx, _out_rx) = mpsc::channel(1);
        let mut inner = self.inner.lock().unwrap();
        match inner.script {
            Script::Silent => {}
            Script::Accept => {
                let _ = tx.try_send(TransportEvent::Opened);
            }
            Script::Refuse => {
                let _ = tx.try_send(TransportEvent::Error(TransportError::Handshake("connection refused".into())));
                let _ = tx.try_send(TransportEvent::Closed);
            }
        }
        inner.sessions.push(tx);
        Connection::new(rx, out_tx)
    }
}
