use std::{env, path::PathBuf, str::FromStr, time::Duration};

use tracing::warn;

use crate::upstream::client::DEFAULT_PROMETHEUS_URL;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub prometheus_url: String,
    pub bypass_proxy: bool,
    pub ua_pages_dir: PathBuf,
    pub global_queries_path: PathBuf,
    pub health_poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            prometheus_url: DEFAULT_PROMETHEUS_URL.to_string(),
            bypass_proxy: true,
            ua_pages_dir: PathBuf::from("public/ua-pages"),
            global_queries_path: PathBuf::from("public/prometheus-global.json"),
            health_poll_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            port: parse_or(var("PORT"), "PORT", defaults.port),
            prometheus_url: var("PROMETHEUS_URL").unwrap_or(defaults.prometheus_url),
            bypass_proxy: var("PROMETHEUS_BYPASS_PROXY")
                .map(|v| parse_flag(&v, defaults.bypass_proxy))
                .unwrap_or(defaults.bypass_proxy),
            ua_pages_dir: var("UA_PAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.ua_pages_dir),
            global_queries_path: var("GLOBAL_QUERIES_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.global_queries_path),
            health_poll_interval: Duration::from_secs(parse_or(
                var("HEALTH_POLL_INTERVAL_SECS"),
                "HEALTH_POLL_INTERVAL_SECS",
                defaults.health_poll_interval.as_secs(),
            )),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {}={:?}, using {}", key, raw, default);
            default
        }),
        None => default,
    }
}

fn parse_flag(raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!("Invalid boolean {:?}, using {}", raw, default);
            default
        }
    }
}
