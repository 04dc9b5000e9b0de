use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::normalize::{normalize_instant, normalize_range};
use crate::{metrics, models::QueryResult, DashboardError, Result};

pub const DEFAULT_PROMETHEUS_URL: &str = "http://localhost:9090";
pub const DEFAULT_RANGE_STEP: &str = "15s";

pub const INSTANT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
pub const RANGE_QUERY_TIMEOUT: Duration = Duration::from_secs(15);
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Operations the aggregator and HTTP handlers need from a Prometheus server.
#[async_trait]
pub trait PrometheusApi: Send + Sync {
    async fn instant_query(&self, query: &str, at_time: Option<&str>) -> Result<QueryResult>;

    async fn range_query(
        &self,
        query: &str,
        start: f64,
        end: f64,
        step: Option<&str>,
    ) -> Result<QueryResult>;

    /// Never fails: any error is reported as `false`.
    async fn health_check(&self) -> bool;

    fn base_url(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    /// Ignore `HTTP_PROXY`/`HTTPS_PROXY`/`ALL_PROXY` for calls to Prometheus.
    pub bypass_proxy: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROMETHEUS_URL.to_string(),
            bypass_proxy: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    status: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone)]
pub struct PrometheusClient {
    base_url: String,
    http: reqwest::Client,
}

impl PrometheusClient {
    pub fn new(options: ClientOptions) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if options.bypass_proxy {
            builder = builder.no_proxy();
        }
        let http = builder
            .build()
            .map_err(|e| DashboardError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: options.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Issues a GET against the query API and unwraps the `data` object of a
    /// successful envelope.
    async fn fetch_data(
        &self,
        path: &str,
        params: &[(&str, String)],
        timeout: Duration,
        label: &str,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, params);

        let response = self
            .http
            .get(&url)
            .query(params)
            .timeout(timeout)
            .send()
            .await?;

        let http_status = response.status();
        let body = response.bytes().await?;
        let envelope: ApiEnvelope = serde_json::from_slice(&body).map_err(|e| {
            if http_status.is_success() {
                DashboardError::Upstream(format!("invalid response body: {}", e))
            } else {
                DashboardError::Upstream(format!("HTTP {}", http_status))
            }
        })?;

        if envelope.status != "success" {
            let reason = match (envelope.error_type, envelope.error) {
                (Some(kind), Some(error)) => format!("{}: {}", kind, error),
                (None, Some(error)) => error,
                (_, None) => format!("status {} (HTTP {})", envelope.status, http_status),
            };
            return Err(DashboardError::Upstream(format!("{} failed: {}", label, reason)));
        }

        envelope
            .data
            .ok_or_else(|| DashboardError::Upstream(format!("{} returned no data", label)))
    }
}

fn observe<T>(kind: &str, started: Instant, result: Result<T>, context: &str) -> Result<T> {
    metrics::record_upstream_call(kind, started.elapsed().as_secs_f64(), result.is_ok());
    result.map_err(|e| {
        warn!("{} error: {}", context, e);
        DashboardError::Upstream(format!("Failed to execute {}: {}", context, e))
    })
}

#[async_trait]
impl PrometheusApi for PrometheusClient {
    async fn instant_query(&self, query: &str, at_time: Option<&str>) -> Result<QueryResult> {
        let started = Instant::now();
        let mut params = vec![("query", query.to_string())];
        if let Some(time) = at_time.filter(|t| !t.is_empty()) {
            params.push(("time", time.to_string()));
        }

        let result = match self
            .fetch_data("/api/v1/query", &params, INSTANT_QUERY_TIMEOUT, "Prometheus query")
            .await
        {
            Ok(data) => normalize_instant(data),
            Err(e) => Err(e),
        };
        observe("instant", started, result, "Prometheus query")
    }

    async fn range_query(
        &self,
        query: &str,
        start: f64,
        end: f64,
        step: Option<&str>,
    ) -> Result<QueryResult> {
        let started = Instant::now();
        let step = step.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_RANGE_STEP);
        let params = [
            ("query", query.to_string()),
            ("start", start.to_string()),
            ("end", end.to_string()),
            ("step", step.to_string()),
        ];

        let result = match self
            .fetch_data(
                "/api/v1/query_range",
                &params,
                RANGE_QUERY_TIMEOUT,
                "Prometheus range query",
            )
            .await
        {
            Ok(data) => normalize_range(data),
            Err(e) => Err(e),
        };
        observe("range", started, result, "Prometheus range query")
    }

    async fn health_check(&self) -> bool {
        let started = Instant::now();
        let url = format!("{}/-/healthy", self.base_url);
        let healthy = match self
            .http
            .get(&url)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!("Prometheus unreachable at {}: {}", url, e);
                false
            }
        };
        metrics::record_upstream_call("health", started.elapsed().as_secs_f64(), healthy);
        healthy
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
