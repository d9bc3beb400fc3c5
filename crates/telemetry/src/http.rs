use axum::{
    body::Bytes,
    http::{header::CONTENT_TYPE, HeaderName},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use tokio::signal;

async fn metrics_handler() -> ([(HeaderName, String); 1], Bytes) {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::with_capacity(1 << 16);
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::error!(error=%e, "failed to encode prometheus metrics");
    }
    (
        [(CONTENT_TYPE, encoder.format_type().to_string())],
        buf.into(),
    )
}

async fn healthz_handler() -> &'static str {
    "OK"
}

async fn readyz_handler() -> &'static str {
    "OK"
}

/// Serves `/metrics`, `/healthz`, and `/readyz` on `addr` until `ctrl_c`.
/// Runs alongside the main API router on its own listener (spec §6.3).
pub async fn run_server(addr: SocketAddr) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(target = "telemetry", error = %e, "failed to bind telemetry http server");
            return;
        }
    };
    tracing::info!(target = "telemetry", addr = %addr, "telemetry server listening");

    let graceful = axum::serve(listener, app.into_make_service()).with_graceful_shutdown(async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(target = "telemetry", error = %e, "failed to install ctrl-c handler");
        }
        tracing::info!(target = "telemetry", "telemetry server shutting down");
    });

    if let Err(e) = graceful.await {
        tracing::error!(target = "telemetry", error = %e, "telemetry server error");
    }
}
