use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use armview_core::DisplayState;
use armview_link::LinkEvent;
use prometheus::{IntCounter, IntGauge, Registry};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

pub struct Metrics {
    pub connected: IntGauge,
    pub readings_total: IntCounter,
    pub decode_errors_total: IntCounter,
    pub transport_errors_total: IntCounter,
    pub resets_total: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Arc<Self>> {
        Self::register(prometheus::default_registry())
    }

    pub fn register(registry: &Registry) -> prometheus::Result<Arc<Self>> {
        let connected = IntGauge::new("armview_connected", "Telemetry link status (1 connected, 0 otherwise)")?;
        let readings_total = IntCounter::new("armview_readings_total", "Readings decoded and displayed")?;
        let decode_errors_total = IntCounter::new("armview_decode_errors_total", "Frames discarded as malformed")?;
        let transport_errors_total = IntCounter::new("armview_transport_errors_total", "Transport errors observed")?;
        let resets_total = IntCounter::new("armview_resets_total", "Full client resets performed by the watchdog")?;

        registry.register(Box::new(connected.clone()))?;
        registry.register(Box::new(readings_total.clone()))?;
        registry.register(Box::new(decode_errors_total.clone()))?;
        registry.register(Box::new(transport_errors_total.clone()))?;
        registry.register(Box::new(resets_total.clone()))?;

        Ok(Arc::new(Self { connected, readings_total, decode_errors_total, transport_errors_total, resets_total }))
    }

    pub fn observe(&self, event: &LinkEvent) {
        match event {
            LinkEvent::Opened { .. } => self.connected.set(1),
            LinkEvent::Closed { .. } => self.connected.set(0),
            LinkEvent::Reading(_) => self.readings_total.inc(),
            LinkEvent::DecodeFailed { .. } => self.decode_errors_total.inc(),
            LinkEvent::TransportFailed { .. } => self.transport_errors_total.inc(),
            LinkEvent::Reset { .. } => self.resets_total.inc(),
            LinkEvent::Reconnecting { .. } => {}
        }
    }
}

// ----- Background consumer: link events -> metrics -----
pub async fn metrics_consumer_loop(mut rx: broadcast::Receiver<LinkEvent>, metrics: Arc<Metrics>) {
    loop {
        match rx.recv().await {
            Ok(event) => metrics.observe(&event),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Metrics consumer lagged behind link events"),
            Err(RecvError::Closed) => break,
        }
    }
    debug!("Metrics consumer stopped");
}

/// Terminal display surface: redraws the grid on every display change.
pub async fn terminal_surface_loop(mut display: watch::Receiver<DisplayState>) {
    let clear = io::stdout().is_terminal();
    loop {
        let state = display.borrow_and_update().clone();
        {
            let mut out = io::stdout().lock();
            if let Err(e) = draw(&mut out, &state, clear) {
                warn!(error = %e, "Failed to draw telemetry display");
            }
        }
        if display.changed().await.is_err() {
            break;
        }
    }
}

pub fn draw<W: Write>(out: &mut W, state: &DisplayState, clear: bool) -> io::Result<()> {
    if clear {
        out.write_all(b"\x1b[2J\x1b[H")?;
    }
    out.write_all(state.render_text().as_bytes())?;
    out.flush()
}
