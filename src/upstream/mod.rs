pub mod client;
pub mod normalize;

pub use client::{ClientOptions, PrometheusApi, PrometheusClient};
pub use normalize::{normalize_instant, normalize_range};
