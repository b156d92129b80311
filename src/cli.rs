//! Command-line interface parsing for the offline worker host
//!
//! Each invocation of `nutritrack-sw` delivers exactly one event to the worker
//! (install, activate, fetch, message or sync) against a cache store on disk.
//! Global flags override values loaded from an optional JSON config file.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use reqwest::Method;
use serde_json::Value;
use thiserror::Error;

use crate::config::{parse_origin, ConfigError, WorkerConfig};
use crate::fetch::Request;
use crate::worker::WorkerEvent;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The fetch target is neither an absolute URL nor a path on the origin
    #[error("Invalid fetch target: '{0}'")]
    InvalidTarget(String),

    /// The HTTP method is not a valid token
    #[error("Invalid method: '{0}'")]
    InvalidMethod(String),

    /// A header argument is not of the form NAME:VALUE
    #[error("Invalid header: '{0}'. Expected NAME:VALUE")]
    InvalidHeader(String),

    /// The message payload is not JSON
    #[error("Invalid message payload: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}

/// NutriTrack offline worker - cache-first request handling and cache lifecycle
#[derive(Parser, Debug)]
#[command(name = "nutritrack-sw")]
#[command(about = "Cache-first offline worker for NutriTrack")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the cache generations (defaults to the XDG cache dir)
    #[arg(long, value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Origin the controlled pages are served from
    #[arg(long, value_name = "URL", global = true)]
    pub origin: Option<String>,

    /// Name of the current cache generation
    #[arg(long, value_name = "NAME", global = true)]
    pub cache_name: Option<String>,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Pre-populate the current cache generation
    Install,
    /// Delete stale cache generations
    Activate,
    /// Intercept a request: answer from cache, or from the network
    Fetch {
        /// Absolute URL or path relative to the origin
        target: String,
        /// HTTP method
        #[arg(long, default_value = "GET")]
        method: String,
        /// Request header, may be repeated
        #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
        headers: Vec<String>,
        /// Write the response body to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Deliver a control message, e.g. '{"action":"skipWaiting"}'
    Message {
        /// JSON payload
        payload: String,
    },
    /// Deliver a background sync event
    Sync {
        /// Sync tag
        tag: String,
    },
    /// List cache generations and their entry counts
    Caches,
}

/// Configuration derived from CLI arguments for worker startup
#[derive(Debug, Clone, PartialEq)]
pub struct StartupConfig {
    pub worker: WorkerConfig,
    /// Cache root override; `None` means the XDG cache directory
    pub cache_dir: Option<PathBuf>,
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    ///
    /// Values from `--config` are loaded first, then individual flags override them.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let mut worker = match &cli.config {
            Some(path) => WorkerConfig::from_file(path)?,
            None => WorkerConfig::default(),
        };

        if let Some(origin) = &cli.origin {
            worker.origin = parse_origin(origin)?;
        }
        if let Some(name) = &cli.cache_name {
            worker.cache_name = name.clone();
        }
        worker.validate()?;

        Ok(StartupConfig {
            worker,
            cache_dir: cli.cache_dir.clone(),
        })
    }
}

impl Command {
    /// Builds the worker event this command delivers
    ///
    /// Returns `None` for commands that only inspect the store.
    pub fn to_event(&self, config: &WorkerConfig) -> Result<Option<WorkerEvent>, CliError> {
        let event = match self {
            Command::Install => WorkerEvent::Install,
            Command::Activate => WorkerEvent::Activate,
            Command::Fetch {
                target,
                method,
                headers,
                ..
            } => WorkerEvent::Fetch(parse_request(config, target, method, headers)?),
            Command::Message { payload } => WorkerEvent::Message(parse_message(payload)?),
            Command::Sync { tag } => WorkerEvent::Sync { tag: tag.clone() },
            Command::Caches => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Builds a request from CLI arguments, resolving paths against the origin
pub fn parse_request(
    config: &WorkerConfig,
    target: &str,
    method: &str,
    headers: &[String],
) -> Result<Request, CliError> {
    let url = config
        .resolve(target)
        .map_err(|_| CliError::InvalidTarget(target.to_string()))?;
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(method.to_string()))?;

    let mut request = Request::new(method, url);
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| CliError::InvalidHeader(header.clone()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(CliError::InvalidHeader(header.clone()));
        }
        request = request.with_header(name, value.trim());
    }
    Ok(request)
}

/// Parses a message payload; anything JSON is accepted
pub fn parse_message(payload: &str) -> Result<Value, CliError> {
    Ok(serde_json::from_str(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cli_parse_install() {
        let cli = Cli::parse_from(["nutritrack-sw", "install"]);
        assert_eq!(cli.command, Command::Install);
        assert!(cli.config.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "nutritrack-sw",
            "activate",
            "--cache-name",
            "nutritrack-v2",
            "-vv",
        ]);
        assert_eq!(cli.command, Command::Activate);
        assert_eq!(cli.cache_name.as_deref(), Some("nutritrack-v2"));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_parse_fetch() {
        let cli = Cli::parse_from([
            "nutritrack-sw",
            "fetch",
            "/data.json",
            "-H",
            "accept: application/json",
            "--output",
            "out.json",
        ]);
        match cli.command {
            Command::Fetch {
                target,
                method,
                headers,
                output,
            } => {
                assert_eq!(target, "/data.json");
                assert_eq!(method, "GET");
                assert_eq!(headers, vec!["accept: application/json"]);
                assert_eq!(output, Some(PathBuf::from("out.json")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_startup_config_defaults() {
        let cli = Cli::parse_from(["nutritrack-sw", "caches"]);
        let startup = StartupConfig::from_cli(&cli).unwrap();
        assert_eq!(startup.worker, WorkerConfig::default());
        assert!(startup.cache_dir.is_none());
    }

    #[test]
    fn test_startup_config_overrides() {
        let cli = Cli::parse_from([
            "nutritrack-sw",
            "--origin",
            "https://nutritrack.example",
            "--cache-name",
            "v2",
            "--cache-dir",
            "/tmp/nt",
            "install",
        ]);
        let startup = StartupConfig::from_cli(&cli).unwrap();
        assert_eq!(startup.worker.origin.as_str(), "https://nutritrack.example/");
        assert_eq!(startup.worker.cache_name, "v2");
        assert_eq!(startup.cache_dir, Some(PathBuf::from("/tmp/nt")));
    }

    #[test]
    fn test_startup_config_invalid_origin() {
        let cli = Cli::parse_from(["nutritrack-sw", "--origin", "nowhere", "install"]);
        let err = StartupConfig::from_cli(&cli).unwrap_err();
        assert!(err.to_string().contains("Invalid origin"));
    }

    #[test]
    fn test_parse_request_resolves_path() {
        let config = WorkerConfig::default();
        let request = parse_request(&config, "/manifest.json", "get", &[]).unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.url.as_str(), "http://localhost:8080/manifest.json");
    }

    #[test]
    fn test_parse_request_absolute_url() {
        let config = WorkerConfig::default();
        let request = parse_request(&config, "https://cdn.example.com/lib.js", "GET", &[]).unwrap();
        assert_eq!(request.url.host_str(), Some("cdn.example.com"));
    }

    #[test]
    fn test_parse_request_headers() {
        let config = WorkerConfig::default();
        let request = parse_request(
            &config,
            "/",
            "POST",
            &["Content-Type: application/json".to_string()],
        )
        .unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.headers,
            vec![("Content-Type".to_string(), "application/json".to_string())]
        );

        let err = parse_request(&config, "/", "GET", &["no-colon".to_string()]).unwrap_err();
        assert!(matches!(err, CliError::InvalidHeader(_)));
    }

    #[test]
    fn test_parse_request_invalid_method() {
        let config = WorkerConfig::default();
        let err = parse_request(&config, "/", "GE T", &[]).unwrap_err();
        assert!(err.to_string().contains("Invalid method"));
    }

    #[test]
    fn test_parse_message() {
        assert_eq!(
            parse_message(r#"{"action":"skipWaiting"}"#).unwrap(),
            json!({"action": "skipWaiting"})
        );
        assert!(parse_message("{action}").is_err());
    }

    #[test]
    fn test_command_to_event() {
        let config = WorkerConfig::default();
        assert!(matches!(
            Command::Install.to_event(&config).unwrap(),
            Some(WorkerEvent::Install)
        ));
        assert!(Command::Caches.to_event(&config).unwrap().is_none());

        let sync = Command::Sync {
            tag: "sync-nutrition-data".to_string(),
        };
        assert!(matches!(
            sync.to_event(&config).unwrap(),
            Some(WorkerEvent::Sync { tag }) if tag == "sync-nutrition-data"
        ));
    }
}
