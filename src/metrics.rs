use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    // Facade metrics
    pub static ref HTTP_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "ua_proxy_http_requests_total",
        "Total number of requests received per route",
        &["route"]
    ).unwrap();

    pub static ref HTTP_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "ua_proxy_http_request_duration_seconds",
        "Request duration in seconds per route",
        &["route"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 15.0]
    ).unwrap();

    // Upstream metrics
    pub static ref UPSTREAM_QUERIES: IntCounterVec = register_int_counter_vec!(
        "ua_proxy_upstream_queries_total",
        "Total number of calls made to Prometheus",
        &["kind"]
    ).unwrap();

    pub static ref UPSTREAM_FAILURES: IntCounterVec = register_int_counter_vec!(
        "ua_proxy_upstream_failures_total",
        "Total number of failed calls to Prometheus",
        &["kind"]
    ).unwrap();

    pub static ref UPSTREAM_DURATION: HistogramVec = register_histogram_vec!(
        "ua_proxy_upstream_query_duration_seconds",
        "Duration of calls to Prometheus in seconds",
        &["kind"],
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 15.0]
    ).unwrap();

    pub static ref BATCH_SIZE: Histogram = register_histogram!(
        "ua_proxy_batch_size",
        "Number of queries per aggregated batch",
        vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0]
    ).unwrap();

    pub static ref PROMETHEUS_UP: IntGauge = register_int_gauge!(
        "ua_proxy_prometheus_up",
        "Whether the upstream Prometheus answered its last health probe (1) or not (0)"
    ).unwrap();
}

pub fn init_metrics() {
    PROMETHEUS_UP.set(0);
}

/// Times one facade request; the duration is observed on drop.
pub struct RequestTimer {
    route: &'static str,
    start: Instant,
}

impl RequestTimer {
    pub fn new(route: &'static str) -> Self {
        HTTP_REQUESTS.with_label_values(&[route]).inc();
        Self {
            route,
            start: Instant::now(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        HTTP_REQUEST_DURATION
            .with_label_values(&[self.route])
            .observe(duration);
    }
}

pub fn record_upstream_call(kind: &str, duration: f64, success: bool) {
    UPSTREAM_QUERIES.with_label_values(&[kind]).inc();
    UPSTREAM_DURATION.with_label_values(&[kind]).observe(duration);
    if !success {
        UPSTREAM_FAILURES.with_label_values(&[kind]).inc();
    }
}

pub fn record_batch_size(size: usize) {
    BATCH_SIZE.observe(size as f64);
}

pub fn set_prometheus_up(up: bool) {
    PROMETHEUS_UP.set(if up { 1 } else { 0 });
}

/// Renders every registered metric in the Prometheus text format.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
