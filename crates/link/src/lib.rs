pub mod client;
pub mod config;
pub mod service;
pub mod transport;

pub use client::{ConnectionState, LinkEvent, TelemetryClient};
pub use config::{Endpoint, LinkConfig, RecoveryMode};
pub use service::LinkService;
pub use transport::{Connection, Transport, TransportError, TransportEvent, WsTransport};

#[cfg(test)]
mod testing;
