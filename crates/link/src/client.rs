use std::time::Duration;

use armview_core::{DisplayState, LinkStatus, Reading};
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Endpoint, LinkConfig};
use crate::transport::{Connection, Transport, TransportError, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Observations published by the client. Consumers never mutate the client through these.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Opened { generation: u64 },
    Closed { generation: u64 },
    Reading(Reading),
    DecodeFailed { generation: u64, error: String },
    TransportFailed { generation: u64, error: TransportError },
    Reset { generation: u64 },
    Reconnecting { attempt: u32, delay: Duration },
}

/// Context object for one client instance: the live connection, its state
/// and the display it drives. All transport callbacks go through here.
pub struct TelemetryClient {
    endpoint: Endpoint,
    generation: u64,
    connection: Option<Connection>,
    state: ConnectionState,
    connect_deadline: Instant,
    display: DisplayState,
    events: broadcast::Sender<LinkEvent>,
}

impl TelemetryClient {
    pub fn connect(
        transport: &dyn Transport,
        config: &LinkConfig,
        generation: u64,
        events: broadcast::Sender<LinkEvent>,
    ) -> Self {
        info!(endpoint = %config.endpoint, generation, "Connecting to telemetry source");
        let connection = transport.open(&config.endpoint);
        Self {
            endpoint: config.endpoint.clone(),
            generation,
            connection: Some(connection),
            state: ConnectionState::Connecting,
            connect_deadline: Instant::now() + config.connect_timeout,
            display: DisplayState::default(),
            events,
        }
    }

    /// Opens a fresh connection on this same client, keeping what is on display.
    pub fn reconnect(&mut self, transport: &dyn Transport, config: &LinkConfig) {
        info!(endpoint = %self.endpoint, generation = self.generation, "Reconnecting to telemetry source");
        self.connection = Some(transport.open(&self.endpoint));
        self.state = ConnectionState::Connecting;
        self.connect_deadline = Instant::now() + config.connect_timeout;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn connect_deadline(&self) -> Instant {
        self.connect_deadline
    }

    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        match self.connection.as_mut() {
            Some(conn) => conn.next_event().await,
            None => None,
        }
    }

    /// Dispatches one transport event. Returns true when the display changed.
    pub fn handle(&mut self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Message(payload) => self.on_message(&payload),
            TransportEvent::Error(err) => {
                self.on_error(err);
                false
            }
            TransportEvent::Closed => self.on_close(),
        }
    }

    pub fn on_open(&mut self) -> bool {
        if self.state != ConnectionState::Connecting {
            debug!(state = ?self.state, "Ignoring open on a connection that is not connecting");
            return false;
        }
        self.state = ConnectionState::Open;
        info!(endpoint = %self.endpoint, generation = self.generation, "Telemetry connection open");
        self.publish(LinkEvent::Opened { generation: self.generation });
        self.display.set_status(LinkStatus::Connected)
    }

    pub fn on_message(&mut self, payload: &[u8]) -> bool {
        if self.state != ConnectionState::Open {
            debug!(state = ?self.state, "Dropping frame received outside an open connection");
            return false;
        }
        match Reading::decode(payload) {
            Ok(reading) => {
                self.display.apply_reading(reading, Utc::now());
                self.publish(LinkEvent::Reading(reading));
                true
            }
            Err(e) => {
                warn!(error = %e, generation = self.generation, len = payload.len(), "Discarding malformed telemetry frame");
                self.publish(LinkEvent::DecodeFailed { generation: self.generation, error: e.to_string() });
                false
            }
        }
    }

    pub fn on_close(&mut self) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        self.state = ConnectionState::Closed;
        self.connection = None;
        info!(endpoint = %self.endpoint, generation = self.generation, "Telemetry connection closed");
        self.publish(LinkEvent::Closed { generation: self.generation });
        self.display.set_status(LinkStatus::Disconnected);
        true
    }

    pub fn on_error(&mut self, err: TransportError) {
        warn!(error = %err, endpoint = %self.endpoint, generation = self.generation, "Telemetry transport error");
        self.publish(LinkEvent::TransportFailed { generation: self.generation, error: err });
    }

    /// Gives up on a connection still handshaking past its deadline.
    pub fn expire_connect(&mut self) -> bool {
        if self.state != ConnectionState::Connecting {
            return false;
        }
        self.on_error(TransportError::ConnectTimeout);
        self.on_close()
    }

    fn publish(&self, event: LinkEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
