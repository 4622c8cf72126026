//! Process configuration loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::api::ApiEndpoints;
use crate::notification::MarkAllScope;
use crate::{Error, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SETTINGS_REFRESH_SECS: u64 = 300;

/// Runtime configuration of the notifier.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Base URL of the loan service API.
    pub api_url: String,
    pub endpoints: ApiEndpoints,
    pub request_timeout: Duration,
    /// File backing the local key-value store.
    pub state_file: PathBuf,
    /// How often `watch` re-reads the remote settings.
    pub settings_refresh: Duration,
    pub mark_all_scope: MarkAllScope,
    /// Directory for rolling log files; console only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            endpoints: ApiEndpoints::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            state_file: default_state_file(),
            settings_refresh: Duration::from_secs(DEFAULT_SETTINGS_REFRESH_SECS),
            mark_all_scope: MarkAllScope::default(),
            log_dir: None,
        }
    }
}

/// `<data dir>/loantrek/state.json`, or `./loantrek-state.json` when the
/// platform has no data directory.
fn default_state_file() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("loantrek").join("state.json"))
        .unwrap_or_else(|| PathBuf::from("loantrek-state.json"))
}

impl AppConfig {
    /// Load configuration from `LOANTREK_*` environment variables.
    ///
    /// A `.env` file in the working directory is honoured when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(url) = get("LOANTREK_API_URL") {
            config.api_url = url;
        }
        if let Some(path) = get("LOANTREK_OVERDUE_PATH") {
            config.endpoints.overdue_loans = path;
        }
        if let Some(path) = get("LOANTREK_SETTINGS_PATH") {
            config.endpoints.settings = path;
        }
        if let Some(path) = get("LOANTREK_STATS_PATH") {
            config.endpoints.stats = path;
        }
        if let Some(raw) = get("LOANTREK_REQUEST_TIMEOUT_SECS") {
            config.request_timeout =
                Duration::from_secs(parse_secs("LOANTREK_REQUEST_TIMEOUT_SECS", &raw)?);
        }
        if let Some(path) = get("LOANTREK_STATE_FILE") {
            config.state_file = PathBuf::from(path);
        }
        if let Some(raw) = get("LOANTREK_SETTINGS_REFRESH_SECS") {
            config.settings_refresh =
                Duration::from_secs(parse_secs("LOANTREK_SETTINGS_REFRESH_SECS", &raw)?);
        }
        if let Some(raw) = get("LOANTREK_MARK_ALL_SCOPE") {
            config.mark_all_scope = raw.parse()?;
        }
        if let Some(dir) = get("LOANTREK_LOG_DIR") {
            config.log_dir = Some(PathBuf::from(dir));
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the notifier cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            return Err(Error::config("API URL must not be empty"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("request timeout must be greater than zero"));
        }
        if self.settings_refresh.is_zero() {
            return Err(Error::config("settings refresh interval must be greater than zero"));
        }
        for (name, path) in [
            ("overdue", &self.endpoints.overdue_loans),
            ("settings", &self.endpoints.settings),
            ("stats", &self.endpoints.stats),
        ] {
            if path.trim().is_empty() {
                return Err(Error::config(format!("{name} endpoint path must not be empty")));
            }
        }
        Ok(())
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>()
        .map_err(|e| Error::config(format!("{key}: expected whole seconds, got '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.endpoints.overdue_loans, "/overdue-loans");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.mark_all_scope, MarkAllScope::Displayed);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("LOANTREK_API_URL", "https://loans.example.com/api"),
            ("LOANTREK_OVERDUE_PATH", "/overdue/detailed"),
            ("LOANTREK_REQUEST_TIMEOUT_SECS", "5"),
            ("LOANTREK_STATE_FILE", "/tmp/loantrek.json"),
            ("LOANTREK_MARK_ALL_SCOPE", "all"),
            ("LOANTREK_LOG_DIR", "/var/log/loantrek"),
            ("LOANTREK_SETTINGS_PATH", "  "),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "https://loans.example.com/api");
        assert_eq!(config.endpoints.overdue_loans, "/overdue/detailed");
        assert_eq!(config.endpoints.settings, "/settings");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.state_file, PathBuf::from("/tmp/loantrek.json"));
        assert_eq!(config.mark_all_scope, MarkAllScope::All);
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/loantrek")));
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        let err = AppConfig::from_lookup(lookup(&[("LOANTREK_REQUEST_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = AppConfig::from_lookup(lookup(&[("LOANTREK_REQUEST_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err =
            AppConfig::from_lookup(lookup(&[("LOANTREK_MARK_ALL_SCOPE", "some")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
