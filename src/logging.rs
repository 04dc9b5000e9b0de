use std::env;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "ua_metrics_proxy=info,tower_http=info";

/// Sets up the logging subscriber for the application.
///
/// The filter comes from `RUST_LOG` when set. `LOG_FORMAT=json` switches to
/// one JSON object per event. Calling this twice is harmless; the second
/// subscriber is ignored.
pub fn init_logger() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = env::var("LOG_FORMAT").map_or(false, |v| v.eq_ignore_ascii_case("json"));

    let compact_layer = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_level(true)
            .compact()
    });
    let json_layer = json.then(|| fmt::layer().json().with_current_span(false));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(compact_layer)
        .with(json_layer)
        .try_init();
}
