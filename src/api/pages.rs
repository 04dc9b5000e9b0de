use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use super::AppState;
use crate::{metrics::RequestTimer, models::{UaIndex, UaPage}, DashboardError, Result};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/ua-pages", get(list_pages))
        .route(
            "/api/ua-pages/:name",
            get(get_page).post(save_page).delete(delete_page),
        )
        .route("/api/ua-pages-index", get(get_index))
        .route("/api/health", get(service_health))
}

async fn list_pages(State(state): State<AppState>) -> Result<Json<Value>> {
    let _timer = RequestTimer::new("ua_pages_list");
    let uas = state.store.list().await?;
    let count = uas.len();
    Ok(Json(json!({ "uas": uas, "count": count })))
}

async fn get_page(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let _timer = RequestTimer::new("ua_pages_get");
    Ok(Json(state.store.get_raw(&name).await?))
}

async fn save_page(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: std::result::Result<Json<UaPage>, JsonRejection>,
) -> Result<Json<Value>> {
    let _timer = RequestTimer::new("ua_pages_save");
    let Json(page) = payload.map_err(|e| DashboardError::Validation(e.body_text()))?;

    state.store.save(&name, &page).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Page {} saved", name),
        "data": page,
    })))
}

async fn delete_page(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let _timer = RequestTimer::new("ua_pages_delete");
    state.store.delete(&name).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Page {} deleted", name),
    })))
}

async fn get_index(State(state): State<AppState>) -> Result<Json<UaIndex>> {
    let _timer = RequestTimer::new("ua_pages_index");
    Ok(Json(state.store.read_index().await?))
}

async fn service_health() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "UA pages API online" }))
}
