pub mod pages;
pub mod queries;

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use axum::{http::header, response::IntoResponse, routing::get, Router};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    config::Config,
    metrics,
    polling::Poller,
    upstream::{ClientOptions, PrometheusApi, PrometheusClient},
    store::PageStore,
    DashboardError, Result,
};

const HEALTH_POLL_KEY: &str = "prometheus-health";

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn PrometheusApi>,
    pub store: PageStore,
    pub global_queries_path: PathBuf,
}

impl AppState {
    pub fn new(
        client: Arc<dyn PrometheusApi>,
        store: PageStore,
        global_queries_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            store,
            global_queries_path: global_queries_path.into(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/prometheus", queries::router())
        .merge(pages::router())
        .route("/metrics", get(export_metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn export_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        metrics::gather_text(),
    )
}

/// Probes Prometheus every `config.health_poll_interval` and keeps the
/// `ua_proxy_prometheus_up` gauge current.
pub fn spawn_health_poll(poller: &Poller, client: Arc<dyn PrometheusApi>, config: &Config) {
    let last_state = Arc::new(AtomicBool::new(metrics::PROMETHEUS_UP.get() == 1));
    poller.start_polling(HEALTH_POLL_KEY, config.health_poll_interval, move || {
        let client = Arc::clone(&client);
        let last_state = Arc::clone(&last_state);
        async move {
            let healthy = client.health_check().await;
            metrics::set_prometheus_up(healthy);
            if last_state.swap(healthy, Ordering::SeqCst) != healthy {
                if healthy {
                    info!("Prometheus at {} is reachable again", client.base_url());
                } else {
                    warn!("Prometheus at {} is unreachable", client.base_url());
                }
            }
        }
    });
}

pub async fn start_server(config: Config) -> Result<()> {
    let client: Arc<dyn PrometheusApi> = Arc::new(PrometheusClient::new(ClientOptions {
        base_url: config.prometheus_url.clone(),
        bypass_proxy: config.bypass_proxy,
    })?);
    info!(
        "Prometheus client for {} (proxy bypass: {})",
        client.base_url(),
        config.bypass_proxy
    );

    let store = PageStore::new(&config.ua_pages_dir);
    store.ensure_dir().await?;

    let healthy = client.health_check().await;
    metrics::set_prometheus_up(healthy);
    if healthy {
        info!("Prometheus reachable at {}", client.base_url());
    } else {
        warn!("Prometheus not reachable at {}", client.base_url());
    }

    let poller = Poller::new();
    spawn_health_poll(&poller, Arc::clone(&client), &config);

    let state = AppState::new(client, store, &config.global_queries_path);
    let app = build_router(state);

    let addr = config.listen_addr();
    info!("UA pages directory: {}", config.ua_pages_dir.display());
    info!("Starting API server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DashboardError::Internal(format!("Failed to bind to address: {}", e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| DashboardError::Internal(format!("Server error: {}", e)))?;

    poller.cancel_all();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
