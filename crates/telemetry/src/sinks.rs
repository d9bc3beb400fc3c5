//! Abstract traits for metrics reporting, decoupling core logic from the
//! backend (spec §6.3).

use once_cell::sync::OnceCell;

/// A no-op sink used before [`crate::prometheus::install`] has run, and in tests.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns the configured mint-authorization metrics sink, or a no-op sink
/// if [`crate::prometheus::install`] has not been called.
pub fn mint_metrics() -> &'static dyn MintMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns the configured similarity-pipeline metrics sink.
pub fn similarity_metrics() -> &'static dyn SimilarityMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns the configured HTTP-surface metrics sink.
pub fn api_metrics() -> &'static dyn ApiMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Metrics for the mint-authorization state machine (C1, C7, C9).
pub trait MintMetricsSink: Send + Sync + std::fmt::Debug {
    /// A nonce was allocated and a pending authorization issued.
    fn inc_issued(&self, asset_type: &str);
    /// A pending authorization transitioned to `used`.
    fn inc_used(&self);
    /// A `used` authorization transitioned to `registered`.
    fn inc_finalized(&self);
    /// A pending or used authorization transitioned to `revoked`.
    fn inc_revoked(&self);
    /// The expiry worker swept `count` pending authorizations to `expired`.
    fn inc_expired(&self, count: u64);
    /// A state-transition attempt observed a conflicting current state.
    fn inc_conflict(&self, transition: &'static str);
}
impl MintMetricsSink for NopSink {
    fn inc_issued(&self, _asset_type: &str) {}
    fn inc_used(&self) {}
    fn inc_finalized(&self) {}
    fn inc_revoked(&self) {}
    fn inc_expired(&self, _count: u64) {}
    fn inc_conflict(&self, _transition: &'static str) {}
}

/// Metrics for the content-similarity pipeline (C3-C6).
pub trait SimilarityMetricsSink: Send + Sync + std::fmt::Debug {
    /// A `checkAndAdmit` call completed with the given verdict.
    fn inc_check(&self, asset_type: &str, verdict: &'static str);
    /// Observes the end-to-end latency of a `checkAndAdmit` call.
    fn observe_check_duration(&self, asset_type: &str, duration_secs: f64);
    /// An upstream embedding/vector-index/LLM call failed or timed out.
    fn inc_upstream_failure(&self, upstream: &'static str, reason: &'static str);
    /// The LLM adjudicator fell back to the deterministic classifier.
    fn inc_llm_fallback(&self);
}
impl SimilarityMetricsSink for NopSink {
    fn inc_check(&self, _asset_type: &str, _verdict: &'static str) {}
    fn observe_check_duration(&self, _asset_type: &str, _duration_secs: f64) {}
    fn inc_upstream_failure(&self, _upstream: &'static str, _reason: &'static str) {}
    fn inc_llm_fallback(&self) {}
}

/// Metrics for the public HTTP surface (spec §6.1).
pub trait ApiMetricsSink: Send + Sync + std::fmt::Debug {
    /// Observes request latency, labeled by route and status code.
    fn observe_request_duration(&self, route: &str, status: u16, duration_secs: f64);
    /// Increments the total requests counter, labeled by route and status.
    fn inc_requests_total(&self, route: &str, status: u16);
    /// A request was rejected by the per-IP rate limiter.
    fn inc_rate_limited(&self);
}
impl ApiMetricsSink for NopSink {
    fn observe_request_duration(&self, _route: &str, _status: u16, _duration_secs: f64) {}
    fn inc_requests_total(&self, _route: &str, _status: u16) {}
    fn inc_rate_limited(&self) {}
}

/// A unified sink implementing every domain trait, giving metrics backends
/// (e.g. Prometheus) a single point of implementation.
pub trait MetricsSink: MintMetricsSink + SimilarityMetricsSink + ApiMetricsSink {}

impl<T> MetricsSink for T where T: MintMetricsSink + SimilarityMetricsSink + ApiMetricsSink {}
