use std::sync::Arc;
use std::time::Duration;

use armview_core::DisplayState;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ConnectionState, LinkEvent, TelemetryClient};
use crate::config::{LinkConfig, RecoveryMode};
use crate::transport::Transport;

/// Owns the supervisor task. Cheap to clone; every clone observes the same client.
#[derive(Clone)]
pub struct LinkService {
    display_rx: watch::Receiver<DisplayState>,
    events_tx: broadcast::Sender<LinkEvent>,
    cancel: CancellationToken,
    _loop_handle: Arc<JoinHandle<()>>,
}

impl LinkService {
    /// Spawns the supervisor on the current runtime and starts the first connection.
    pub fn start<T: Transport>(config: LinkConfig, transport: T) -> Self {
        let (display_tx, display_rx) = watch::channel(DisplayState::default());
        let (events_tx, _) = broadcast::channel(256);
        let cancel = CancellationToken::new();

        let loop_handle = tokio::spawn(run_supervisor(
            config,
            transport,
            display_tx,
            events_tx.clone(),
            cancel.clone(),
        ));

        Self {
            display_rx,
            events_tx,
            cancel,
            _loop_handle: Arc::new(loop_handle),
        }
    }

    pub fn display(&self) -> watch::Receiver<DisplayState> {
        self.display_rx.clone()
    }

    pub fn snapshot(&self) -> DisplayState {
        self.display_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.display_rx.borrow().is_connected()
    }

    pub fn events(&self) -> broadcast::Receiver<LinkEvent> {
        self.events_tx.subscribe()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

fn watchdog_timer(period: Duration) -> Interval {
    // first check one full period after (re)start, not immediately
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Single event loop: transport callbacks, connect deadline, watchdog and
/// backoff timer are all handled here, one at a time.
async fn run_supervisor<T: Transport>(
    config: LinkConfig,
    transport: T,
    display_tx: watch::Sender<DisplayState>,
    events_tx: broadcast::Sender<LinkEvent>,
    cancel: CancellationToken,
) {
    let mut generation: u64 = 1;
    let mut client = TelemetryClient::connect(&transport, &config, generation, events_tx.clone());
    display_tx.send_replace(client.display().clone());

    let mut watchdog = watchdog_timer(config.reconnect_interval);
    let mut attempt: u32 = 0;
    let mut retry_at: Option<Instant> = None;

    loop {
        let state = client.state();
        let connect_deadline = client.connect_deadline();
        let retry_pending = retry_at.is_some();
        let retry_deadline = retry_at.unwrap_or_else(Instant::now);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Telemetry supervisor stopping");
                break;
            }
            event = client.next_event(), if state != ConnectionState::Closed => {
                let changed = match event {
                    Some(event) => client.handle(event),
                    // session task vanished without reporting a close
                    None => client.on_close(),
                };
                if changed {
                    display_tx.send_replace(client.display().clone());
                }
            }
            _ = time::sleep_until(connect_deadline), if state == ConnectionState::Connecting => {
                if client.expire_connect() {
                    display_tx.send_replace(client.display().clone());
                }
            }
            _ = watchdog.tick(), if config.recovery == RecoveryMode::Reset => {
                if client.state() == ConnectionState::Closed {
                    generation += 1;
                    warn!(endpoint = %config.endpoint, generation, "Telemetry connection closed; resetting client");
                    let _ = events_tx.send(LinkEvent::Reset { generation });
                    client = TelemetryClient::connect(&transport, &config, generation, events_tx.clone());
                    display_tx.send_replace(client.display().clone());
                    watchdog = watchdog_timer(config.reconnect_interval);
                }
            }
            _ = time::sleep_until(retry_deadline), if retry_pending => {
                retry_at = None;
                client.reconnect(&transport, &config);
            }
        }

        if config.recovery == RecoveryMode::Backoff {
            match client.state() {
                ConnectionState::Open => attempt = 0,
                ConnectionState::Closed if retry_at.is_none() => {
                    attempt = attempt.saturating_add(1);
                    let delay = config.backoff_delay(attempt);
                    info!(endpoint = %config.endpoint, attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
                    let _ = events_tx.send(LinkEvent::Reconnecting { attempt, delay });
                    retry_at = Some(Instant::now() + delay);
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ChannelTransport, Script};
    use crate::transport::TransportEvent;
    use armview_core::LinkStatus;

    const GOOD: &[u8] = br#"{"M1":10,"M2":20,"M3":30,"M4":40,"M5":50,"M6":60}"#;

    fn reset_config() -> LinkConfig {
        LinkConfig::default()
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn displays_readings_while_open() {
        let transport = ChannelTransport::scripted(Script::Accept);
        let svc = LinkService::start(reset_config(), transport.clone());
        settle().await;
        assert!(svc.is_connected());

        transport.emit(0, TransportEvent::Message(GOOD.to_vec())).await;
        settle().await;
        let shown = svc.snapshot();
        assert_eq!(shown.status, LinkStatus::Connected);
        assert_eq!(shown.reading.unwrap().values(), [10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);

        let before = svc.snapshot();
        transport.emit(0, TransportEvent::Message(br#"{"M1":10}"#.to_vec())).await;
        settle().await;
        assert_eq!(svc.snapshot(), before);
        svc.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn closed_connection_is_reset_after_one_interval() {
        let transport = ChannelTransport::scripted(Script::Accept);
        let svc = LinkService::start(reset_config(), transport.clone());
        let mut events = svc.events();
        settle().await;

        transport.emit(0, TransportEvent::Message(GOOD.to_vec())).await;
        transport.emit(0, TransportEvent::Closed).await;
        settle().await;
        assert_eq!(svc.snapshot().status, LinkStatus::Disconnected);
        assert_eq!(transport.open_count(), 1);

        time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(transport.open_count(), 1);

        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(transport.open_count(), 2);
        // full reset: the new client starts from a blank display and reopens
        let shown = svc.snapshot();
        assert!(shown.reading.is_none());
        assert_eq!(shown.status, LinkStatus::Connected);

        let mut saw_reset = false;
        while let Ok(ev) = events.try_recv() {
            if ev == (LinkEvent::Reset { generation: 2 }) {
                saw_reset = true;
            }
        }
        assert!(saw_reset);
        svc.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn one_reset_per_interval_while_refused() {
        let transport = ChannelTransport::scripted(Script::Refuse);
        let svc = LinkService::start(reset_config(), transport.clone());
        settle().await;
        assert_eq!(transport.open_count(), 1);

        time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(transport.open_count(), 2);
        time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(transport.open_count(), 2);
        time::sleep(Duration::from_millis(3_000)).await;
        assert_eq!(transport.open_count(), 3);
        time::sleep(Duration::from_millis(15_000)).await;
        assert_eq!(transport.open_count(), 6);
        assert_eq!(svc.snapshot().status, LinkStatus::Disconnected);
        svc.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn open_connection_is_never_reset() {
        let transport = ChannelTransport::scripted(Script::Accept);
        let svc = LinkService::start(reset_config(), transport.clone());
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.open_count(), 1);
        assert!(svc.is_connected());
        svc.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handshake_is_abandoned_and_reset() {
        let transport = ChannelTransport::scripted(Script::Silent);
        let svc = LinkService::start(reset_config(), transport.clone());
        let mut events = svc.events();

        time::sleep(Duration::from_millis(4_000)).await;
        assert_eq!(transport.open_count(), 1);

        // connect deadline and watchdog tick coincide at 5s
        time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(transport.open_count(), 2);

        // the abandoned session finally answering must not touch the new client
        transport.emit(0, TransportEvent::Opened).await;
        settle().await;
        assert_eq!(svc.snapshot().status, LinkStatus::Disconnected);

        let mut timed_out = false;
        while let Ok(ev) = events.try_recv() {
            if let LinkEvent::TransportFailed { error, .. } = ev {
                timed_out |= error == crate::transport::TransportError::ConnectTimeout;
            }
        }
        assert!(timed_out);
        svc.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_reconnects_same_client_and_keeps_reading() {
        let config = LinkConfig { recovery: RecoveryMode::Backoff, ..LinkConfig::default() };
        let transport = ChannelTransport::scripted(Script::Accept);
        let svc = LinkService::start(config, transport.clone());
        let mut events = svc.events();
        settle().await;

        transport.emit(0, TransportEvent::Message(GOOD.to_vec())).await;
        transport.set_script(Script::Refuse);
        transport.emit(0, TransportEvent::Closed).await;
        settle().await;

        // attempts after 1s, then 2s, then 4s
        time::sleep(Duration::from_millis(1_050)).await;
        assert_eq!(transport.open_count(), 2);
        time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(transport.open_count(), 3);
        time::sleep(Duration::from_millis(4_000)).await;
        assert_eq!(transport.open_count(), 4);

        transport.set_script(Script::Accept);
        time::sleep(Duration::from_millis(8_000)).await;
        assert_eq!(transport.open_count(), 5);
        let shown = svc.snapshot();
        assert_eq!(shown.status, LinkStatus::Connected);
        // same client: the reading from before the outage is still shown
        assert_eq!(shown.reading.unwrap().values()[0], 10.0);

        let mut resets = 0;
        let mut attempts = Vec::new();
        while let Ok(ev) = events.try_recv() {
            match ev {
                LinkEvent::Reset { .. } => resets += 1,
                LinkEvent::Reconnecting { attempt, .. } => attempts.push(attempt),
                _ => {}
            }
        }
        assert_eq!(resets, 0);
        assert_eq!(attempts, vec![1, 2, 3, 4]);
        svc.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_supervisor() {
        let transport = ChannelTransport::scripted(Script::Refuse);
        let svc = LinkService::start(reset_config(), transport.clone());
        settle().await;
        svc.shutdown();
        settle().await;
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.open_count(), 1);
    }
}
