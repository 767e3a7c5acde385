//! Configuration loading for chat export
//!
//! Session cookies come from the command line (inline JSON or `@file`).
//! Gateway endpoint and sync options are loaded, in order of priority, from:
//! 1. An explicit path or value given by the caller
//! 2. A JSON file in the config directory (~/.config/chatexport/)
//! 3. Built-in defaults (sync options only)

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sync::SyncOptions;

/// Sync options filename in the config directory
const SYNC_FILE: &str = "sync.json";

/// Gateway settings filename in the config directory
const REMOTE_FILE: &str = "remote.json";

/// Session cookies authenticating against the remote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCookies(BTreeMap<String, String>);

impl SessionCookies {
    /// Parse a JSON object mapping cookie names to values
    pub fn parse(json: &str) -> Result<Self> {
        let cookies: Self =
            serde_json::from_str(json.trim()).context("Failed to parse session cookies JSON")?;
        anyhow::ensure!(!cookies.0.is_empty(), "Session cookies are empty");
        Ok(cookies)
    }

    /// Parse a command-line argument: inline JSON, or `@path` to a file holding it
    pub fn from_arg(arg: &str) -> Result<Self> {
        match arg.strip_prefix('@') {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read cookies file: {}", path))?;
                Self::parse(&content)
            }
            None => Self::parse(arg),
        }
    }

    /// Render as a `Cookie` request header value
    pub fn to_header(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Gateway connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
}

impl RemoteConfig {
    /// Resolve the gateway URL: explicit value first, then remote.json
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        if let Some(base_url) = explicit {
            return Ok(Self {
                base_url: base_url.to_string(),
            });
        }

        config::load_json_opt(REMOTE_FILE)?.with_context(|| {
            format!(
                "No gateway configured; pass --endpoint or create {}",
                config::config_path(REMOTE_FILE)
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| REMOTE_FILE.to_string())
            )
        })
    }
}

impl SyncOptions {
    /// Load sync options: explicit file first, then sync.json, then defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return config::load_json_file(path);
        }
        Ok(config::load_json_opt(SYNC_FILE)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Location;

    #[test]
    fn test_parse_cookies() {
        let cookies = SessionCookies::parse(r#"{"xs": "abc", "c_user": "1000"}"#).unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies.to_header(), "c_user=1000; xs=abc");
    }

    #[test]
    fn test_empty_cookies_rejected() {
        assert!(SessionCookies::parse("{}").is_err());
        assert!(SessionCookies::parse("not json").is_err());
    }

    #[test]
    fn test_cookies_from_file_arg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(&path, "{\"c_user\": \"1000\"}\n").unwrap();

        let cookies = SessionCookies::from_arg(&format!("@{}", path.display())).unwrap();
        assert_eq!(cookies.to_header(), "c_user=1000");
    }

    #[test]
    fn test_explicit_endpoint_wins() {
        let remote = RemoteConfig::load(Some("https://gateway.example.com")).unwrap();
        assert_eq!(remote.base_url, "https://gateway.example.com");
    }

    #[test]
    fn test_sync_options_defaults() {
        let options = serde_json::from_str::<SyncOptions>("{}").unwrap();
        assert_eq!(options, SyncOptions::default());
        assert_eq!(options.page_size, 100);
        assert_eq!(options.retry.max_elapsed_secs, 600);
        assert_eq!(
            options.locations,
            vec![Location::Archived, Location::Inbox, Location::Other]
        );
    }

    #[test]
    fn test_sync_options_partial_override() {
        let options = serde_json::from_str::<SyncOptions>(
            r#"{ "page_size": 20, "locations": ["INBOX"], "retry": { "max_elapsed_secs": 30 } }"#,
        )
        .unwrap();
        assert_eq!(options.page_size, 20);
        assert_eq!(options.locations, vec![Location::Inbox]);
        assert_eq!(options.retry.max_elapsed_secs, 30);
        assert_eq!(options.retry.initial_delay_ms, 500);
    }

    #[test]
    fn test_sync_options_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.json");
        std::fs::write(&path, r#"{ "page_size": 10 }"#).unwrap();

        let options = SyncOptions::load(Some(&path)).unwrap();
        assert_eq!(options.page_size, 10);
    }
}
