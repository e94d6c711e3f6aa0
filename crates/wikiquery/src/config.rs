//! Downloader configuration and wiki endpoint description.

use url::Url;

use crate::types::{WikiError, WikiResult};

/// Default path of the API entry point below the wiki's base URL.
pub const DEFAULT_API_PATH: &str = "/w/api.php";

/// Settings fixed for the lifetime of a [`Downloader`](crate::download::Downloader).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderConfig {
    /// Send `maxlag` so the server can turn requests away while replicas lag.
    pub use_maxlag: bool,
    /// Log every outgoing request before it is sent.
    pub log_requests: bool,
    /// Per-request timeout.
    pub timeout_ms: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            use_maxlag: true,
            log_requests: false,
            timeout_ms: 30_000,
        }
    }
}

impl DownloaderConfig {
    /// Defaults overridden by `WIKIQUERY_MAXLAG`, `WIKIQUERY_LOG_REQUESTS`
    /// and `WIKIQUERY_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            use_maxlag: lookup("WIKIQUERY_MAXLAG")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.use_maxlag),
            log_requests: lookup("WIKIQUERY_LOG_REQUESTS")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.log_requests),
            timeout_ms: lookup("WIKIQUERY_TIMEOUT_MS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.timeout_ms),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Where a wiki's API lives and how to identify ourselves to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiInfo {
    pub user_agent: String,
    pub base_url: String,
    pub api_path: String,
}

impl WikiInfo {
    pub fn new(
        user_agent: impl Into<String>,
        base_url: impl Into<String>,
        api_path: Option<&str>,
    ) -> WikiResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| WikiError::Configuration(format!("invalid base URL '{base_url}': {e}")))?;

        Ok(Self {
            user_agent: user_agent.into(),
            base_url,
            api_path: api_path.unwrap_or(DEFAULT_API_PATH).to_string(),
        })
    }

    /// Absolute URL of the API entry point.
    pub fn api_url(&self) -> String {
        format!("{}{}", self.base_url, self.api_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = DownloaderConfig::default();
        assert!(config.use_maxlag);
        assert!(!config.log_requests);
    }

    #[test]
    fn test_lookup_overrides() {
        let env: HashMap<&str, &str> = [
            ("WIKIQUERY_MAXLAG", "off"),
            ("WIKIQUERY_LOG_REQUESTS", "1"),
            ("WIKIQUERY_TIMEOUT_MS", "500"),
        ]
        .into();
        let config = DownloaderConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert!(!config.use_maxlag);
        assert!(config.log_requests);
        assert_eq!(config.timeout_ms, 500);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = DownloaderConfig::from_lookup(|_| Some("maybe".to_string()));
        assert_eq!(config, DownloaderConfig::default());
    }

    #[test]
    fn test_wiki_info() {
        let wiki = WikiInfo::new("Bot/1.0", "https://en.wikipedia.org/", None).unwrap();
        assert_eq!(wiki.api_url(), "https://en.wikipedia.org/w/api.php");

        let wiki = WikiInfo::new("Bot/1.0", "http://localhost:8080", Some("/api.php")).unwrap();
        assert_eq!(wiki.api_url(), "http://localhost:8080/api.php");

        assert!(WikiInfo::new("Bot/1.0", "not a url", None).is_err());
    }
}
