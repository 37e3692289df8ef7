use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub host: HostConfig,
    #[serde(default)]
    pub requests: RequestConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// WebSocket endpoint of the host bridge, e.g. `ws://127.0.0.1:7777/ipc`.
    pub url: String,
}

/// Tunables of the pending-request bookkeeping.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Calls per identifier and bucket above which an alert is logged.
    pub alert_threshold: u64,
    /// Age after which a pending request is reported as stale.
    pub stale_threshold_secs: u64,
    pub stale_report_interval_secs: u64,
    pub enable_stale_report: bool,
    pub history_bucket_secs: u64,
    pub history_max_len: usize,
    pub history_debug: bool,
    /// Identifiers never alerted on, in addition to the error reporter's own
    /// method, which is always exempt.
    pub exempt_identifiers: Vec<String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        RequestConfig {
            alert_threshold: 20,
            stale_threshold_secs: 300,
            stale_report_interval_secs: 60,
            enable_stale_report: true,
            history_bucket_secs: 15,
            history_max_len: 25,
            history_debug: false,
            exempt_identifiers: vec!["codestream/reporting/message".to_string()],
        }
    }
}

impl RequestConfig {
    /// Defaults without the background stale reporter.
    pub fn without_stale_report() -> Self {
        RequestConfig {
            enable_stale_report: false,
            ..Self::default()
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from("config.toml")
    }

    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&config_str).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(config_str: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(config_str)?;
        Ok(config)
    }
}
