//! The concrete Prometheus-backed implementation of the metrics sinks
//! (spec §6.3).

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_histogram_vec, register_int_counter_vec, HistogramVec,
    IntCounterVec,
};

static MINT_ISSUED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static MINT_USED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static MINT_FINALIZED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static MINT_REVOKED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static MINT_EXPIRED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static MINT_CONFLICTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

static SIMILARITY_CHECKS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static SIMILARITY_CHECK_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static SIMILARITY_UPSTREAM_FAILURES_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static SIMILARITY_LLM_FALLBACKS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

static API_REQUESTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static API_REQUEST_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static API_RATE_LIMITED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Fetches a metric from its `OnceCell`. Panics if [`install`] was never
/// called, which is intentional: it indicates a startup-ordering bug.
macro_rules! get_metric {
    ($metric:ident) => {
        $metric
            .get()
            .expect("prometheus sink not initialized; call telemetry::prometheus::install() first")
    };
}

impl MintMetricsSink for PrometheusSink {
    fn inc_issued(&self, asset_type: &str) {
        get_metric!(MINT_ISSUED_TOTAL)
            .with_label_values(&[asset_type])
            .inc();
    }
    fn inc_used(&self) {
        get_metric!(MINT_USED_TOTAL).with_label_values(&[]).inc();
    }
    fn inc_finalized(&self) {
        get_metric!(MINT_FINALIZED_TOTAL)
            .with_label_values(&[])
            .inc();
    }
    fn inc_revoked(&self) {
        get_metric!(MINT_REVOKED_TOTAL).with_label_values(&[]).inc();
    }
    fn inc_expired(&self, count: u64) {
        get_metric!(MINT_EXPIRED_TOTAL)
            .with_label_values(&[])
            .inc_by(count);
    }
    fn inc_conflict(&self, transition: &'static str) {
        get_metric!(MINT_CONFLICTS_TOTAL)
            .with_label_values(&[transition])
            .inc();
    }
}

impl SimilarityMetricsSink for PrometheusSink {
    fn inc_check(&self, asset_type: &str, verdict: &'static str) {
        get_metric!(SIMILARITY_CHECKS_TOTAL)
            .with_label_values(&[asset_type, verdict])
            .inc();
    }
    fn observe_check_duration(&self, asset_type: &str, duration_secs: f64) {
        get_metric!(SIMILARITY_CHECK_DURATION_SECONDS)
            .with_label_values(&[asset_type])
            .observe(duration_secs);
    }
    fn inc_upstream_failure(&self, upstream: &'static str, reason: &'static str) {
        get_metric!(SIMILARITY_UPSTREAM_FAILURES_TOTAL)
            .with_label_values(&[upstream, reason])
            .inc();
    }
    fn inc_llm_fallback(&self) {
        get_metric!(SIMILARITY_LLM_FALLBACKS_TOTAL)
            .with_label_values(&[])
            .inc();
    }
}

impl ApiMetricsSink for PrometheusSink {
    fn observe_request_duration(&self, route: &str, status: u16, duration_secs: f64) {
        get_metric!(API_REQUEST_DURATION_SECONDS)
            .with_label_values(&[route, &status.to_string()])
            .observe(duration_secs);
    }
    fn inc_requests_total(&self, route: &str, status: u16) {
        get_metric!(API_REQUESTS_TOTAL)
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }
    fn inc_rate_limited(&self) {
        get_metric!(API_RATE_LIMITED_TOTAL)
            .with_label_values(&[])
            .inc();
    }
}

/// Registers every collector and returns a static reference to the sink.
/// Must be called exactly once at process startup, before any handler runs.
#[allow(clippy::expect_used)]
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    MINT_ISSUED_TOTAL
        .set(register_int_counter_vec!(
            "prov_mint_issued_total",
            "Total pending mint authorizations issued.",
            &["asset_type"]
        )?)
        .expect("static already initialized");
    MINT_USED_TOTAL
        .set(register_int_counter_vec!(
            "prov_mint_used_total",
            "Total authorizations transitioned to used.",
            &[] as &[&str]
        )?)
        .expect("static already initialized");
    MINT_FINALIZED_TOTAL
        .set(register_int_counter_vec!(
            "prov_mint_finalized_total",
            "Total authorizations transitioned to registered.",
            &[] as &[&str]
        )?)
        .expect("static already initialized");
    MINT_REVOKED_TOTAL
        .set(register_int_counter_vec!(
            "prov_mint_revoked_total",
            "Total authorizations transitioned to revoked.",
            &[] as &[&str]
        )?)
        .expect("static already initialized");
    MINT_EXPIRED_TOTAL
        .set(register_int_counter_vec!(
            "prov_mint_expired_total",
            "Total authorizations swept to expired by the background worker.",
            &[] as &[&str]
        )?)
        .expect("static already initialized");
    MINT_CONFLICTS_TOTAL
        .set(register_int_counter_vec!(
            "prov_mint_conflicts_total",
            "Total state-transition attempts that observed a conflicting current state.",
            &["transition"]
        )?)
        .expect("static already initialized");
    SIMILARITY_CHECKS_TOTAL
        .set(register_int_counter_vec!(
            "prov_similarity_checks_total",
            "Total checkAndAdmit calls, labeled by asset type and verdict.",
            &["asset_type", "verdict"]
        )?)
        .expect("static already initialized");
    SIMILARITY_CHECK_DURATION_SECONDS
        .set(register_histogram_vec!(
            "prov_similarity_check_duration_seconds",
            "Latency of checkAndAdmit calls.",
            &["asset_type"],
            exponential_buckets(0.05, 2.0, 12)?
        )?)
        .expect("static already initialized");
    SIMILARITY_UPSTREAM_FAILURES_TOTAL
        .set(register_int_counter_vec!(
            "prov_similarity_upstream_failures_total",
            "Total upstream embedding/vector-index/LLM call failures.",
            &["upstream", "reason"]
        )?)
        .expect("static already initialized");
    SIMILARITY_LLM_FALLBACKS_TOTAL
        .set(register_int_counter_vec!(
            "prov_similarity_llm_fallbacks_total",
            "Total times the LLM adjudicator fell back to the deterministic classifier.",
            &[] as &[&str]
        )?)
        .expect("static already initialized");
    API_REQUESTS_TOTAL
        .set(register_int_counter_vec!(
            "prov_api_requests_total",
            "Total HTTP requests, labeled by route and status code.",
            &["route", "status"]
        )?)
        .expect("static already initialized");
    API_REQUEST_DURATION_SECONDS
        .set(register_histogram_vec!(
            "prov_api_request_duration_seconds",
            "Latency of HTTP requests.",
            &["route", "status"],
            exponential_buckets(0.001, 2.0, 15)?
        )?)
        .expect("static already initialized");
    API_RATE_LIMITED_TOTAL
        .set(register_int_counter_vec!(
            "prov_api_rate_limited_total",
            "Total requests rejected by the per-IP rate limiter.",
            &[] as &[&str]
        )?)
        .expect("static already initialized");

    static INSTANCE: PrometheusSink = PrometheusSink;
    crate::sinks::SINK
        .set(&INSTANCE)
        .map_err(|_| ())
        .unwrap_or(());
    Ok(&INSTANCE)
}
