//! NutriTrack offline worker host
//!
//! Delivers a single lifecycle or fetch event to the cache interceptor per
//! invocation, using a cache store on disk and the real network.

use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nutritrack_offline::cache::{CacheStorage, DiskCacheStorage};
use nutritrack_offline::cli::{Cli, Command, StartupConfig};
use nutritrack_offline::fetch::{Fetcher, HttpFetcher};
use nutritrack_offline::worker::{
    CacheInterceptor, EventOutcome, FetchOutcome, MessageOutcome, SyncOutcome,
};

/// Initialize the tracing subscriber for logging
fn init_tracing(verbose: u8) {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// Prints every generation with its entry count, marking the current one
async fn list_caches<S: CacheStorage, F: Fetcher>(
    worker: &CacheInterceptor<S, F>,
) -> Result<(), Box<dyn std::error::Error>> {
    let current = &worker.config().cache_name;
    let names = worker.storage().keys().await?;
    if names.is_empty() {
        println!("no cache generations");
    }
    for name in names {
        let count = worker.storage().entries(&name).await?.len();
        let marker = if &name == current { " (current)" } else { "" };
        println!("{}{}: {} entries", name, marker, count);
    }
    Ok(())
}

/// Reports an event outcome; returns false when a fetch produced no response
fn report(outcome: EventOutcome, output: Option<&std::path::Path>) -> io::Result<bool> {
    match outcome {
        EventOutcome::Installed(report) => {
            println!("installed {}: {} resources", report.cache_name, report.stored.len());
            for key in report.stored {
                println!("  {}", key);
            }
        }
        EventOutcome::Activated(report) => {
            println!("activated {}", report.cache_name);
            for name in report.deleted {
                println!("  deleted {}", name);
            }
        }
        EventOutcome::Fetched(outcome) => {
            let source = match &outcome {
                FetchOutcome::Cached(_) => "cache",
                FetchOutcome::Network { stored: true, .. } => "network (stored)",
                FetchOutcome::Network { stored: false, .. } => "network",
                FetchOutcome::Unavailable => {
                    eprintln!("no response: network unavailable and nothing cached");
                    return Ok(false);
                }
            };
            let Some(response) = outcome.into_response() else {
                return Ok(false);
            };
            eprintln!("{} {:?} from {}", response.status, response.response_type, source);
            match output {
                Some(path) => std::fs::write(path, response.into_body())?,
                None => io::stdout().write_all(&response.into_body())?,
            }
        }
        EventOutcome::Message(MessageOutcome::SkippedWaiting) => println!("skip waiting"),
        EventOutcome::Message(MessageOutcome::Ignored) => println!("message ignored"),
        EventOutcome::Sync(SyncOutcome::Completed) => println!("sync completed"),
        EventOutcome::Sync(SyncOutcome::Ignored) => println!("sync ignored"),
    }
    Ok(true)
}

async fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let startup = StartupConfig::from_cli(&cli)?;
    let storage = match startup.cache_dir {
        Some(dir) => DiskCacheStorage::with_dir(dir),
        None => DiskCacheStorage::new().ok_or("could not determine a cache directory")?,
    };
    info!(cache_dir = %storage.cache_dir().display(), cache = %startup.worker.cache_name, "starting");

    let fetcher = HttpFetcher::new(startup.worker.origin.clone());
    let worker = CacheInterceptor::new(startup.worker, storage, fetcher);

    let Some(event) = cli.command.to_event(worker.config())? else {
        list_caches(&worker).await?;
        return Ok(true);
    };

    let output = match &cli.command {
        Command::Fetch { output, .. } => output.as_deref(),
        _ => None,
    };

    let outcome = worker.dispatch(event).await?;
    Ok(report(outcome, output)?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
