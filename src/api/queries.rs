use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::AppState;
use crate::{
    aggregator::{execute_submitted, resolve_stored_queries},
    metrics::RequestTimer,
    store::read_global_queries,
    DashboardError, Result,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/query", get(instant_query))
        .route("/query_range", get(range_query))
        .route("/query/multiple", post(multiple_queries))
        .route("/global", get(global_metrics))
        .route("/ua/:name", get(ua_metrics))
        .route("/health", get(prometheus_health))
}

#[derive(Debug, Deserialize)]
pub struct InstantParams {
    pub query: Option<String>,
    pub time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub query: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub step: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MultipleQueryRequest {
    #[serde(default)]
    pub queries: Option<Vec<Value>>,
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_seconds(name: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DashboardError::Validation(format!("{} must be a unix timestamp", name)))
}

fn query_params<T>(params: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    params
        .map(|Query(params)| params)
        .map_err(|e| DashboardError::Validation(e.body_text()))
}

async fn instant_query(
    State(state): State<AppState>,
    params: std::result::Result<Query<InstantParams>, QueryRejection>,
) -> Result<Json<Value>> {
    let _timer = RequestTimer::new("query");
    let params = query_params(params)?;
    let query = required(params.query)
        .ok_or_else(|| DashboardError::Validation("Query parameter is required".to_string()))?;

    let result = state
        .client
        .instant_query(&query, params.time.as_deref())
        .await?;
    Ok(Json(json!({ "success": true, "data": result })))
}

async fn range_query(
    State(state): State<AppState>,
    params: std::result::Result<Query<RangeParams>, QueryRejection>,
) -> Result<Json<Value>> {
    let _timer = RequestTimer::new("query_range");
    let params = query_params(params)?;
    let (Some(query), Some(start), Some(end)) = (
        required(params.query),
        required(params.start),
        required(params.end),
    ) else {
        return Err(DashboardError::Validation(
            "query, start, and end parameters are required".to_string(),
        ));
    };
    let start = parse_seconds("start", &start)?;
    let end = parse_seconds("end", &end)?;

    let result = state
        .client
        .range_query(&query, start, end, params.step.as_deref())
        .await?;
    Ok(Json(json!({ "success": true, "data": result })))
}

async fn multiple_queries(
    State(state): State<AppState>,
    payload: std::result::Result<Json<MultipleQueryRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let _timer = RequestTimer::new("query_multiple");
    let Json(request) = payload.map_err(|e| DashboardError::Validation(e.body_text()))?;
    let queries = request
        .queries
        .filter(|q| !q.is_empty())
        .ok_or_else(|| DashboardError::Validation("queries array is required".to_string()))?;

    let outcomes = execute_submitted(state.client.as_ref(), queries).await;
    Ok(Json(json!({ "success": true, "data": outcomes })))
}

async fn global_metrics(State(state): State<AppState>) -> Result<Json<Value>> {
    let _timer = RequestTimer::new("global");
    let stored = read_global_queries(&state.global_queries_path).await?;

    let enriched =
        resolve_stored_queries(state.client.as_ref(), stored, Utc::now().timestamp()).await;
    Ok(Json(json!({ "success": true, "data": enriched })))
}

async fn ua_metrics(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let _timer = RequestTimer::new("ua");
    let page = state.store.get(&name).await?;
    info!("Resolving {} queries for UA {}", page.prometheus_queries.len(), name);

    let enriched = resolve_stored_queries(
        state.client.as_ref(),
        page.prometheus_queries,
        Utc::now().timestamp(),
    )
    .await;
    Ok(Json(json!({ "success": true, "data": enriched })))
}

async fn prometheus_health(State(state): State<AppState>) -> Json<Value> {
    let _timer = RequestTimer::new("prometheus_health");
    let healthy = state.client.health_check().await;

    Json(json!({
        "success": true,
        "healthy": healthy,
        "timestamp": Utc::now().timestamp_millis(),
        "prometheusUrl": state.client.base_url(),
    }))
}
