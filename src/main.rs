use tracing::error;
use ua_metrics_proxy::{api, config::Config, logging, metrics};

#[tokio::main]
async fn main() {
    // Initialize logging
    logging::init_logger();

    let config = Config::from_env();

    // Initialize metrics
    metrics::init_metrics();

    if let Err(e) = api::start_server(config).await {
        error!("Server failed: {}", e);
        std::process::exit(1);
    }
}
