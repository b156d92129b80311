//! Cache interceptor: the offline worker itself
//!
//! The worker reacts to five kinds of events delivered by its host: install,
//! activate, fetch, message and sync. Each event is handled independently by
//! [`CacheInterceptor`]; [`CacheInterceptor::dispatch`] offers the same
//! handlers behind a single entry point taking a [`WorkerEvent`].

mod interceptor;
mod lifecycle;
mod sync;

pub use interceptor::CacheInterceptor;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use sync::{PlaceholderSync, SyncHandler};

use serde_json::Value;
use thiserror::Error;

use crate::cache::StoreError;
use crate::config::ConfigError;
use crate::fetch::{Request, RequestKey, Response};

/// Errors that fail an install, activate or sync event
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A pre-populate resource could not be fetched with an ok status
    #[error("Failed to precache {url}: {reason}")]
    Precache { url: String, reason: String },

    #[error("Background sync failed: {0}")]
    Sync(String),
}

/// An event delivered by the host
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    /// Control message from a page; only its `action` field is consulted
    Message(Value),
    Sync { tag: String },
}

/// Result of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Generation the resources were written to
    pub cache_name: String,
    /// Keys written, in pre-populate order
    pub stored: Vec<RequestKey>,
}

/// Result of a successful activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    /// Generation that stays current
    pub cache_name: String,
    /// Stale generations that were deleted
    pub deleted: Vec<String>,
}

/// How an intercepted request was answered
#[derive(Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Served from a cache generation; the network was not consulted
    Cached(Response),
    /// Served from the network
    Network {
        response: Response,
        /// Whether a copy was written to the current generation
        stored: bool,
    },
    /// Nothing could be produced (network failure while offline)
    Unavailable,
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Cached(response) | FetchOutcome::Network { response, .. } => Some(response),
            FetchOutcome::Unavailable => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Cached(response) | FetchOutcome::Network { response, .. } => Some(response),
            FetchOutcome::Unavailable => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, FetchOutcome::Cached(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The message asked the worker to skip waiting and it did
    SkippedWaiting,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The reserved tag fired and the sync task ran to completion
    Completed,
    Ignored,
}

/// Outcome of [`CacheInterceptor::dispatch`], one variant per event kind
#[derive(Debug, PartialEq, Eq)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetched(FetchOutcome),
    Message(MessageOutcome),
    Sync(SyncOutcome),
}
