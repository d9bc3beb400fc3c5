#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo
    )
)]

//! Observability for the content-admission and mint-authorization core:
//! structured JSON logging, Prometheus metrics, and the `/metrics`,
//! `/healthz`, `/readyz` surface.

/// A lightweight HTTP server exposing `/metrics`, `/healthz`, and `/readyz`.
pub mod http;
/// Initialization routine for global structured logging.
pub mod init;
/// The concrete Prometheus-backed implementation of the metrics sinks.
pub mod prometheus;
/// Abstract traits (`*MetricsSink`) decoupling instrumentation from backend.
pub mod sinks;
/// A simple RAII timer for measuring the duration of a scope.
pub mod time;

pub use sinks::{api_metrics, mint_metrics, similarity_metrics};
