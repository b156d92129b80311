//! Cache-first request interception and cache generation lifecycle

use futures::future::try_join_all;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{
    ActivateReport, EventOutcome, FetchOutcome, InstallReport, Lifecycle, LifecycleState,
    MessageOutcome, PlaceholderSync, SyncHandler, SyncOutcome, WorkerError, WorkerEvent,
};
use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::fetch::{Fetcher, Request};

/// Mediates requests between controlled pages, the cache and the network
///
/// The cache store is shared with every other in-flight event and with other
/// worker versions; no locking is done around it. Two concurrent misses for
/// the same key both fetch and both write, and the last write wins.
pub struct CacheInterceptor<S, F> {
    config: WorkerConfig,
    storage: S,
    fetcher: F,
    sync: Box<dyn SyncHandler>,
    lifecycle: RwLock<Lifecycle>,
}

impl<S: CacheStorage, F: Fetcher> CacheInterceptor<S, F> {
    pub fn new(config: WorkerConfig, storage: S, fetcher: F) -> Self {
        Self {
            config,
            storage,
            fetcher,
            sync: Box::new(PlaceholderSync),
            lifecycle: RwLock::new(Lifecycle::default()),
        }
    }

    /// Replaces the placeholder background sync task
    pub fn with_sync_handler(mut self, handler: impl SyncHandler + 'static) -> Self {
        self.sync = Box::new(handler);
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read().await
    }

    async fn set_state(&self, state: LifecycleState) {
        self.lifecycle.write().await.state = state;
    }

    /// Lets this worker activate without waiting for older versions to release their pages
    pub async fn skip_waiting(&self) {
        let mut lifecycle = self.lifecycle.write().await;
        if !lifecycle.skip_waiting {
            info!(cache = %self.config.cache_name, "skip waiting requested");
        }
        lifecycle.skip_waiting = true;
    }

    /// Handles any event by routing it to its handler
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, WorkerError> {
        Ok(match event {
            WorkerEvent::Install => EventOutcome::Installed(self.install().await?),
            WorkerEvent::Activate => EventOutcome::Activated(self.activate().await?),
            WorkerEvent::Fetch(request) => EventOutcome::Fetched(self.handle_fetch(request).await),
            WorkerEvent::Message(payload) => EventOutcome::Message(self.handle_message(&payload).await),
            WorkerEvent::Sync { tag } => EventOutcome::Sync(self.handle_sync(&tag).await?),
        })
    }

    /// Opens the current generation and writes every pre-populate resource into it
    ///
    /// Either every resource is fetched with an ok status and all of them are
    /// written, or the install fails and nothing is written. Skip-waiting is
    /// requested up front regardless of the outcome.
    pub async fn install(&self) -> Result<InstallReport, WorkerError> {
        self.skip_waiting().await;
        self.set_state(LifecycleState::Installing).await;

        match self.precache().await {
            Ok(report) => {
                self.set_state(LifecycleState::Installed).await;
                info!(
                    cache = %report.cache_name,
                    resources = report.stored.len(),
                    "install complete"
                );
                Ok(report)
            }
            Err(e) => {
                self.set_state(LifecycleState::Redundant).await;
                warn!(cache = %self.config.cache_name, "install failed: {}", e);
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<InstallReport, WorkerError> {
        let urls = self.config.precache_urls()?;
        let cache_name = &self.config.cache_name;

        self.storage.open(cache_name).await?;
        info!(cache = %cache_name, "cache opened");

        let fetches = urls.into_iter().map(|url| async move {
            let request = Request::get(url);
            let response = self
                .fetcher
                .fetch(&request)
                .await
                .map_err(|e| WorkerError::Precache {
                    url: request.url.to_string(),
                    reason: e.to_string(),
                })?;
            if !response.is_ok() {
                return Err(WorkerError::Precache {
                    url: request.url.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            Ok((request.key(), response))
        });
        let entries = try_join_all(fetches).await?;

        let stored = entries.iter().map(|(key, _)| key.clone()).collect();
        self.storage.put_all(cache_name, entries).await?;

        Ok(InstallReport {
            cache_name: cache_name.clone(),
            stored,
        })
    }

    /// Deletes every generation other than the current one, then takes control of open pages
    pub async fn activate(&self) -> Result<ActivateReport, WorkerError> {
        self.set_state(LifecycleState::Activating).await;
        let current = &self.config.cache_name;

        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != current)
            .collect();

        let deletions = stale.iter().map(|name| async move {
            info!(generation = %name, "deleting stale cache");
            self.storage.delete(name).await
        });
        try_join_all(deletions).await?;

        {
            let mut lifecycle = self.lifecycle.write().await;
            lifecycle.state = LifecycleState::Activated;
            lifecycle.clients_claimed = true;
        }
        info!(cache = %current, deleted = stale.len(), "activated, clients claimed");

        Ok(ActivateReport {
            cache_name: current.clone(),
            deleted: stale,
        })
    }

    /// Answers a request cache-first, falling back to the network
    ///
    /// Only plain 200 same-origin responses are copied into the current
    /// generation. A failed lookup or network error yields
    /// [`FetchOutcome::Unavailable`]; a failed cache write is logged and the
    /// network response is still returned.
    pub async fn handle_fetch(&self, request: Request) -> FetchOutcome {
        let key = request.key();

        match self.storage.match_any(&key).await {
            Ok(Some(response)) => {
                debug!(%key, "cache hit");
                return FetchOutcome::Cached(response);
            }
            Ok(None) => debug!(%key, "cache miss"),
            Err(e) => {
                warn!(%key, "cache lookup failed, offline mode: {}", e);
                return FetchOutcome::Unavailable;
            }
        }

        let response = match self.fetcher.fetch(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(%key, "network error, offline mode: {}", e);
                return FetchOutcome::Unavailable;
            }
        };

        if !response.is_cacheable() {
            debug!(
                %key,
                status = response.status,
                response_type = ?response.response_type,
                "passing response through uncached"
            );
            return FetchOutcome::Network {
                response,
                stored: false,
            };
        }

        let copy = response.duplicate();
        let stored = match self.storage.put(&self.config.cache_name, key.clone(), copy).await {
            Ok(()) => {
                debug!(%key, cache = %self.config.cache_name, "stored network response");
                true
            }
            Err(e) => {
                warn!(%key, "failed to store response: {}", e);
                false
            }
        };

        FetchOutcome::Network { response, stored }
    }

    /// Acts on a control message; only the `action` field is read
    pub async fn handle_message(&self, payload: &Value) -> MessageOutcome {
        let action = payload.get("action").and_then(Value::as_str);
        if action == Some(self.config.skip_waiting_action.as_str()) {
            self.skip_waiting().await;
            MessageOutcome::SkippedWaiting
        } else {
            debug!(?action, "ignoring message");
            MessageOutcome::Ignored
        }
    }

    /// Runs the sync task when the reserved tag fires
    pub async fn handle_sync(&self, tag: &str) -> Result<SyncOutcome, WorkerError> {
        if tag != self.config.sync_tag {
            debug!(tag, "ignoring sync event");
            return Ok(SyncOutcome::Ignored);
        }
        self.sync.sync(tag).await.map_err(WorkerError::Sync)?;
        Ok(SyncOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStorage;
    use crate::fetch::{FetchError, Response};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves 200 for every URL and counts calls
    #[derive(Default)]
    struct EchoFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for EchoFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response::basic(200, request.url.path().to_string()))
        }
    }

    struct CountingSync(Arc<AtomicUsize>);

    #[async_trait]
    impl SyncHandler for CountingSync {
        async fn sync(&self, _tag: &str) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSync;

    #[async_trait]
    impl SyncHandler for FailingSync {
        async fn sync(&self, _tag: &str) -> Result<(), String> {
            Err("server unreachable".to_string())
        }
    }

    fn interceptor() -> CacheInterceptor<MemoryCacheStorage, EchoFetcher> {
        CacheInterceptor::new(
            WorkerConfig::default(),
            MemoryCacheStorage::new(),
            EchoFetcher::default(),
        )
    }

    #[tokio::test]
    async fn test_install_requests_skip_waiting() {
        let worker = interceptor();
        worker.install().await.unwrap();

        let lifecycle = worker.lifecycle().await;
        assert_eq!(lifecycle.state, LifecycleState::Installed);
        assert!(lifecycle.skip_waiting);
        assert!(!lifecycle.is_waiting());
    }

    #[tokio::test]
    async fn test_activate_claims_clients() {
        let worker = interceptor();
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let lifecycle = worker.lifecycle().await;
        assert!(lifecycle.is_active());
        assert!(lifecycle.clients_claimed);
    }

    #[tokio::test]
    async fn test_skip_waiting_message() {
        let worker = interceptor();

        let outcome = worker.handle_message(&json!({"action": "skipWaiting"})).await;
        assert_eq!(outcome, MessageOutcome::SkippedWaiting);
        assert!(worker.lifecycle().await.skip_waiting);
    }

    #[tokio::test]
    async fn test_other_messages_ignored() {
        let worker = interceptor();

        assert_eq!(
            worker.handle_message(&json!({"action": "refresh"})).await,
            MessageOutcome::Ignored
        );
        assert_eq!(worker.handle_message(&json!({"type": "skipWaiting"})).await, MessageOutcome::Ignored);
        assert_eq!(worker.handle_message(&json!("skipWaiting")).await, MessageOutcome::Ignored);
        assert!(!worker.lifecycle().await.skip_waiting);
    }

    #[tokio::test]
    async fn test_sync_runs_handler_only_for_reserved_tag() {
        let counter = Arc::new(AtomicUsize::new(0));
        let worker = interceptor().with_sync_handler(CountingSync(counter.clone()));

        assert_eq!(worker.handle_sync("sync-nutrition-data").await.unwrap(), SyncOutcome::Completed);
        assert_eq!(worker.handle_sync("sync-other").await.unwrap(), SyncOutcome::Ignored);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sync_failure_propagates() {
        let worker = interceptor().with_sync_handler(FailingSync);

        let err = worker.handle_sync("sync-nutrition-data").await.unwrap_err();
        assert!(matches!(err, WorkerError::Sync(ref m) if m == "server unreachable"));
    }

    #[tokio::test]
    async fn test_dispatch_routes_events() {
        let worker = interceptor();

        let installed = worker.dispatch(WorkerEvent::Install).await.unwrap();
        assert!(matches!(installed, EventOutcome::Installed(ref r) if r.stored.len() == 3));

        let url = worker.config().resolve("/index.html").unwrap();
        let fetched = worker.dispatch(WorkerEvent::Fetch(Request::get(url))).await.unwrap();
        match fetched {
            EventOutcome::Fetched(outcome) => assert!(outcome.is_cached()),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(worker.fetcher.calls.load(Ordering::SeqCst), 3);

        let synced = worker
            .dispatch(WorkerEvent::Sync { tag: "sync-nutrition-data".to_string() })
            .await
            .unwrap();
        assert_eq!(synced, EventOutcome::Sync(SyncOutcome::Completed));
    }
}
