//! Cache module for named cache generations
//!
//! A cache generation is an independently addressable bucket of stored
//! request/response pairs, identified by name. This module defines the
//! [`CacheStorage`] seam the interceptor works against, plus two backends: an
//! in-process [`MemoryCacheStorage`] and a persistent [`DiskCacheStorage`].

mod manager;
mod memory;

pub use manager::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::fetch::{RequestKey, Response};

/// Errors raised by a cache store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A stored entry could not be encoded or decoded
    #[error("cache entry is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored entry does not have the expected layout
    #[error("corrupt cache entry: {0}")]
    Corrupt(String),

    /// Only GET requests can be stored
    #[error("cannot cache a {0} request")]
    UnsupportedMethod(String),
}

/// Storage for named cache generations
///
/// Every operation is addressed by generation name. Writing to a generation
/// that does not exist yet creates it.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens a generation, creating it if absent
    async fn open(&self, name: &str) -> Result<(), StoreError>;

    /// Names of all existing generations, oldest first
    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    async fn has(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.keys().await?.iter().any(|k| k == name))
    }

    /// Deletes a generation with all of its entries
    ///
    /// Returns `false` if no generation of that name existed.
    async fn delete(&self, name: &str) -> Result<bool, StoreError>;

    /// Looks a request up in one generation
    async fn match_in(&self, name: &str, key: &RequestKey)
        -> Result<Option<Response>, StoreError>;

    /// Looks a request up across every generation, oldest first
    async fn match_any(&self, key: &RequestKey) -> Result<Option<Response>, StoreError> {
        for name in self.keys().await? {
            if let Some(response) = self.match_in(&name, key).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Stores a response, replacing any previous entry for the same key
    async fn put(&self, name: &str, key: RequestKey, response: Response) -> Result<(), StoreError>;

    /// Stores a batch of responses
    ///
    /// The whole batch is rejected before anything is written if one of the
    /// keys is not a GET.
    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, Response)>,
    ) -> Result<(), StoreError> {
        if let Some((key, _)) = entries.iter().find(|(key, _)| !key.is_get()) {
            return Err(StoreError::UnsupportedMethod(key.method.clone()));
        }
        for (key, response) in entries {
            self.put(name, key, response).await?;
        }
        Ok(())
    }

    /// Keys stored in one generation
    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>, StoreError>;
}

#[async_trait]
impl<T: CacheStorage + ?Sized> CacheStorage for Arc<T> {
    async fn open(&self, name: &str) -> Result<(), StoreError> {
        (**self).open(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        (**self).keys().await
    }

    async fn has(&self, name: &str) -> Result<bool, StoreError> {
        (**self).has(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        (**self).delete(name).await
    }

    async fn match_in(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<Response>, StoreError> {
        (**self).match_in(name, key).await
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<Response>, StoreError> {
        (**self).match_any(key).await
    }

    async fn put(&self, name: &str, key: RequestKey, response: Response) -> Result<(), StoreError> {
        (**self).put(name, key, response).await
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, Response)>,
    ) -> Result<(), StoreError> {
        (**self).put_all(name, entries).await
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>, StoreError> {
        (**self).entries(name).await
    }
}

/// Rejects keys the platform cache would refuse to store
pub(crate) fn ensure_storable(key: &RequestKey) -> Result<(), StoreError> {
    if key.is_get() {
        Ok(())
    } else {
        Err(StoreError::UnsupportedMethod(key.method.clone()))
    }
}
