pub mod aggregator;
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod polling;
pub mod store;
pub mod upstream;

pub use error::{DashboardError, Result};
