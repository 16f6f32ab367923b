//! fleetcycle.toml configuration parser.
//!
//! Every field is optional; CLI flags override file values, and
//! built-in defaults (15s poll interval, 10m per-phase wait) cover
//! the rest.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleConfig {
    pub provider: Option<ProviderConfig>,
    pub polling: Option<PollingConfig>,
    pub run: Option<RunConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Fleet-management API endpoint, e.g. "127.0.0.1:8640".
    pub endpoint: String,
    /// Per-request timeout (e.g. "10s").
    pub request_timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Interval between polls on the success path (e.g. "15s").
    pub interval: Option<String>,
    /// Deadline per wait phase (e.g. "10m").
    pub max_wait: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run identifier used in template names. Defaults to the unix
    /// timestamp at run start when unset.
    pub run_id: Option<String>,
}

impl CycleConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CycleConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Poll interval from config, or the 15s default.
    pub fn poll_interval(&self) -> Duration {
        self.polling
            .as_ref()
            .and_then(|p| p.interval.as_deref())
            .and_then(parse_duration)
            .unwrap_or(Duration::from_secs(15))
    }

    /// Per-request provider timeout, when configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.provider
            .as_ref()
            .and_then(|p| p.request_timeout.as_deref())
            .and_then(parse_duration)
    }

    /// Per-phase max wait from config, or the 10m default.
    pub fn max_wait(&self) -> Duration {
        self.polling
            .as_ref()
            .and_then(|p| p.max_wait.as_deref())
            .and_then(parse_duration)
            .unwrap_or(Duration::from_secs(600))
    }
}

/// Parse a duration string like "15s", "500ms", "10m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config: CycleConfig = toml::from_str(
            r#"
            [provider]
            endpoint = "fleet.internal:8640"
            request_timeout = "5s"

            [polling]
            interval = "5s"
            max_wait = "2m"

            [run]
            run_id = "deploy-42"
            "#,
        )
        .unwrap();

        assert_eq!(config.provider.as_ref().unwrap().endpoint, "fleet.internal:8640");
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.max_wait(), Duration::from_secs(120));
        assert_eq!(config.run.unwrap().run_id.as_deref(), Some("deploy-42"));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: CycleConfig = toml::from_str("").unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.max_wait(), Duration::from_secs(600));
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn parse_duration_forms() {
        assert_eq!(parse_duration("15s"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("10m"), Some(Duration::from_secs(600)));
        assert_eq!(parse_duration("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("bogus"), None);
    }
}
