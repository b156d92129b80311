//! Worker configuration
//!
//! Everything the interceptor needs to know about its deployment is injected
//! through a [`WorkerConfig`]: the current generation name, the origin it
//! serves, the pre-populate list and the reserved sync/message identifiers.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Generation name of the current deployment
pub const DEFAULT_CACHE_NAME: &str = "nutritrack-v1";
/// Origin used when none is configured
pub const DEFAULT_ORIGIN: &str = "http://localhost:8080/";
/// Sync tag reserved for nutrition data
pub const DEFAULT_SYNC_TAG: &str = "sync-nutrition-data";
/// Message action that forces activation
pub const DEFAULT_SKIP_WAITING_ACTION: &str = "skipWaiting";

/// Resources written to the cache at install time
pub const DEFAULT_PRECACHE: &[&str] = &["/", "/index.html", "/manifest.json"];

/// Error types for loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for a worker config
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    /// The origin is not an absolute http(s) URL
    #[error("Invalid origin: '{0}'")]
    InvalidOrigin(String),

    /// A pre-populate entry cannot be resolved against the origin
    #[error("Invalid precache entry: '{0}'")]
    InvalidPrecache(String),
}

/// Configuration injected into a cache interceptor
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Name of the current cache generation
    pub cache_name: String,
    /// Origin the controlled pages are served from
    pub origin: Url,
    /// Resources fetched and stored unconditionally at install time
    pub precache: Vec<String>,
    /// Sync tag that triggers nutrition data synchronization
    pub sync_tag: String,
    /// Message action that forces this worker to activate immediately
    pub skip_waiting_action: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            origin: Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid URL"),
            precache: DEFAULT_PRECACHE.iter().map(|s| s.to_string()).collect(),
            sync_tag: DEFAULT_SYNC_TAG.to_string(),
            skip_waiting_action: DEFAULT_SKIP_WAITING_ACTION.to_string(),
        }
    }
}

/// On-disk shape of the configuration; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "snake_case", deny_unknown_fields)]
struct ConfigFile {
    cache_name: Option<String>,
    origin: Option<String>,
    precache: Option<Vec<String>>,
    sync_tag: Option<String>,
    skip_waiting_action: Option<String>,
}

impl WorkerConfig {
    /// Loads a configuration from a JSON file, filling gaps with defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a configuration from JSON text, filling gaps with defaults
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(content)?;
        let mut config = WorkerConfig::default();

        if let Some(name) = file.cache_name {
            config.cache_name = name;
        }
        if let Some(origin) = file.origin {
            config.origin = parse_origin(&origin)?;
        }
        if let Some(precache) = file.precache {
            config.precache = precache;
        }
        if let Some(tag) = file.sync_tag {
            config.sync_tag = tag;
        }
        if let Some(action) = file.skip_waiting_action {
            config.skip_waiting_action = action;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that every pre-populate entry resolves against the origin
    pub fn validate(&self) -> Result<(), ConfigError> {
        for entry in &self.precache {
            self.resolve(entry)
                .map_err(|_| ConfigError::InvalidPrecache(entry.clone()))?;
        }
        Ok(())
    }

    /// Resolves a path or absolute URL against the configured origin
    pub fn resolve(&self, target: &str) -> Result<Url, url::ParseError> {
        self.origin.join(target)
    }

    /// Absolute URLs of the pre-populate list, in order
    pub fn precache_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.precache
            .iter()
            .map(|entry| {
                self.resolve(entry)
                    .map_err(|_| ConfigError::InvalidPrecache(entry.clone()))
            })
            .collect()
    }
}

/// Parses an origin URL, accepting only absolute http(s) URLs
pub fn parse_origin(s: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(s).map_err(|_| ConfigError::InvalidOrigin(s.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(ConfigError::InvalidOrigin(s.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.cache_name, "nutritrack-v1");
        assert_eq!(config.origin.as_str(), "http://localhost:8080/");
        assert_eq!(config.precache, vec!["/", "/index.html", "/manifest.json"]);
        assert_eq!(config.sync_tag, "sync-nutrition-data");
        assert_eq!(config.skip_waiting_action, "skipWaiting");
    }

    #[test]
    fn test_from_json_partial_keeps_defaults() {
        let config = WorkerConfig::from_json(r#"{"cache_name": "nutritrack-v2"}"#).unwrap();
        assert_eq!(config.cache_name, "nutritrack-v2");
        assert_eq!(config.sync_tag, "sync-nutrition-data");
        assert_eq!(config.precache.len(), 3);
    }

    #[test]
    fn test_from_json_full() {
        let config = WorkerConfig::from_json(
            r#"{
                "cache_name": "v2",
                "origin": "https://nutritrack.example",
                "precache": ["/", "/app.css"],
                "sync_tag": "sync-meals",
                "skip_waiting_action": "activateNow"
            }"#,
        )
        .unwrap();

        assert_eq!(config.cache_name, "v2");
        assert_eq!(config.origin.as_str(), "https://nutritrack.example/");
        assert_eq!(config.precache, vec!["/", "/app.css"]);
        assert_eq!(config.sync_tag, "sync-meals");
        assert_eq!(config.skip_waiting_action, "activateNow");
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        let result = WorkerConfig::from_json(r#"{"cache": "v2"}"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_origin() {
        let err = WorkerConfig::from_json(r#"{"origin": "not a url"}"#).unwrap_err();
        assert!(err.to_string().contains("Invalid origin"));

        assert!(parse_origin("file:///tmp/app").is_err());
        assert!(parse_origin("https://nutritrack.example").is_ok());
    }

    #[test]
    fn test_precache_urls_resolve_against_origin() {
        let config = WorkerConfig::default();
        let urls = config.precache_urls().unwrap();
        assert_eq!(urls[0].as_str(), "http://localhost:8080/");
        assert_eq!(urls[2].as_str(), "http://localhost:8080/manifest.json");
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("worker.json");
        fs::write(&path, r#"{"precache": ["/offline.html"]}"#).unwrap();

        let config = WorkerConfig::from_file(&path).unwrap();
        assert_eq!(config.precache, vec!["/offline.html"]);
    }

    #[test]
    fn test_from_file_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = WorkerConfig::from_file(&temp_dir.path().join("missing.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
