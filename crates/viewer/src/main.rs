use std::net::SocketAddr;

use anyhow::Context;
use armview_link::{Endpoint, LinkConfig, LinkService, WsTransport};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{routing::get, Json, Router};
use dotenvy::dotenv;
use prometheus::{Encoder, TextEncoder};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod models;
mod services;

use models::{DisplayResponse, VersionResponse};
use services::Metrics;

#[derive(Clone)]
struct AppState {
    link: LinkService,
    endpoint: Endpoint,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let link_cfg = LinkConfig::from_env();
    info!(
        endpoint = %link_cfg.endpoint,
        reconnect_interval_ms = link_cfg.reconnect_interval.as_millis() as u64,
        recovery = ?link_cfg.recovery,
        "Configuring telemetry link"
    );
    let endpoint = link_cfg.endpoint.clone();
    let link = LinkService::start(link_cfg, WsTransport);

    let metrics = Metrics::new().context("failed to register metrics")?;
    tokio::spawn(services::metrics_consumer_loop(link.events(), metrics));

    if terminal_enabled() {
        tokio::spawn(services::terminal_surface_loop(link.display()));
    }

    let state = AppState { link: link.clone(), endpoint };
    let app = Router::new()
        .route("/", get(|| async { Redirect::temporary("/display") }))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/version", get(version))
        .route("/metrics", get(metrics_handler))
        .route("/display", get(display_text))
        .route("/api/display", get(api_display))
        .with_state(state);

    let addr: SocketAddr = std::env::var("ARMVIEW_HTTP_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8081".to_string())
        .parse()
        .context("Invalid ARMVIEW_HTTP_ADDR")?;

    info!(%addr, "Starting HTTP status server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    link.shutdown();
    info!("Telemetry viewer stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,armview_link=info,tungstenite=warn,tokio_tungstenite=warn"));
    // stdout belongs to the terminal display
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn terminal_enabled() -> bool {
    match std::env::var("ARMVIEW_TERMINAL") {
        Ok(v) => !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off"),
        Err(_) => true,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn healthz() -> &'static str { "ok" }

async fn readyz(State(state): State<AppState>) -> StatusCode {
    if state.link.is_connected() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE }
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    (
        [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
        buf,
    )
        .into_response()
}

async fn display_text(State(state): State<AppState>) -> String {
    state.link.snapshot().render_text()
}

async fn api_display(State(state): State<AppState>) -> Json<DisplayResponse> {
    Json(DisplayResponse::from_state(&state.link.snapshot(), &state.endpoint))
}
