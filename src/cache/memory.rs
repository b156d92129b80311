//! In-process cache storage

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ensure_storable, CacheStorage, StoreError};
use crate::fetch::{RequestKey, Response};

#[derive(Debug)]
struct Generation {
    name: String,
    entries: HashMap<RequestKey, Response>,
}

impl Generation {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }
}

/// Cache generations held in memory, in creation order
///
/// Lookups hand out duplicates, so stored bodies are never consumed.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    generations: RwLock<Vec<Generation>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn position(generations: &[Generation], name: &str) -> Option<usize> {
    generations.iter().position(|g| g.name == name)
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<(), StoreError> {
        let mut generations = self.generations.write().await;
        if position(&generations, name).is_none() {
            generations.push(Generation::new(name));
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let generations = self.generations.read().await;
        Ok(generations.iter().map(|g| g.name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let mut generations = self.generations.write().await;
        match position(&generations, name) {
            Some(idx) => {
                generations.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn match_in(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<Response>, StoreError> {
        let generations = self.generations.read().await;
        Ok(generations
            .iter()
            .find(|g| g.name == name)
            .and_then(|g| g.entries.get(key))
            .map(Response::duplicate))
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<Response>, StoreError> {
        let generations = self.generations.read().await;
        Ok(generations
            .iter()
            .find_map(|g| g.entries.get(key))
            .map(Response::duplicate))
    }

    async fn put(&self, name: &str, key: RequestKey, response: Response) -> Result<(), StoreError> {
        ensure_storable(&key)?;
        let mut generations = self.generations.write().await;
        let idx = match position(&generations, name) {
            Some(idx) => idx,
            None => {
                generations.push(Generation::new(name));
                generations.len() - 1
            }
        };
        generations[idx].entries.insert(key, response);
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>, StoreError> {
        let generations = self.generations.read().await;
        let mut keys: Vec<RequestKey> = generations
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort_by(|a, b| a.url.cmp(&b.url).then_with(|| a.method.cmp(&b.method)));
        Ok(keys)
    }
}
