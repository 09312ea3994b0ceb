use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const MIN_POLL_INTERVAL_MS: u64 = 1000;
const MAX_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 300;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_base_url: String,
    pub poll_interval: Duration,
    /// 0 means poll until a terminal status.
    pub max_poll_attempts: u32,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Load `.env` files, then read settings from the environment. Call once,
    /// after logging is set up.
    pub fn load() -> Self {
        load_env();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_base_url = lookup("INVOICE_API_URL")
            .or_else(|| lookup("REACT_APP_API_URL"))
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                info!("INVOICE_API_URL not set, using default: {DEFAULT_API_URL}");
                DEFAULT_API_URL.to_string()
            });

        let interval_ms: u64 =
            try_load(&lookup, "INVOICE_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS);
        let clamped = interval_ms.clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS);
        if clamped != interval_ms {
            warn!("INVOICE_POLL_INTERVAL_MS={interval_ms} out of range, using {clamped}");
        }

        Self {
            api_base_url,
            poll_interval: Duration::from_millis(clamped),
            max_poll_attempts: try_load(
                &lookup,
                "INVOICE_POLL_MAX_ATTEMPTS",
                DEFAULT_MAX_POLL_ATTEMPTS,
            ),
            http_timeout: Duration::from_secs(try_load(
                &lookup,
                "INVOICE_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )),
        }
    }

    pub fn with_api_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.map(|u| u.trim().trim_end_matches('/').to_string()) {
            if !url.is_empty() {
                self.api_base_url = url;
            }
        }
        self
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        None => {
            info!("{key} not set, using default: {default}");
            default
        }
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}; using default: {default}");
            default
        }),
    }
}

/// Directory holding the user's `.env` (e.g. ~/.config/invoice-reconciler).
pub fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("invoice-reconciler"))
}

/// `.env` from the app config dir, then from the working directory.
/// Values already in the environment win over both files.
fn load_env() {
    if let Some(path) = app_config_dir().map(|d| d.join(".env")) {
        if path.exists() {
            if let Err(e) = dotenvy::from_path(&path) {
                warn!("Could not read {}: {}", path.display(), e);
            }
        }
    }
    let _ = dotenvy::dotenv();
}
