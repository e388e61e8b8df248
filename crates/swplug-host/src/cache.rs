//! In-memory cache storage.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use swplug_core::request::{Request, Response};
use swplug_core::scope::{Cache, CacheStorage};

use crate::lock;

/// One named cache. Entries keep insertion order; `put` replaces in place.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<Vec<(String, Response)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, url: &str) -> bool {
        lock(&self.entries).iter().any(|(u, _)| u == url)
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn match_url(&self, url: &str) -> anyhow::Result<Option<Response>> {
        Ok(lock(&self.entries)
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, r)| r.clone()))
    }

    async fn put(&self, request: &Request, response: Response) -> anyhow::Result<()> {
        let mut entries = lock(&self.entries);
        match entries.iter_mut().find(|(u, _)| *u == request.url) {
            Some(entry) => entry.1 = response,
            None => entries.push((request.url.clone(), response)),
        }
        Ok(())
    }

    async fn delete(&self, url: &str) -> anyhow::Result<bool> {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|(u, _)| u != url);
        Ok(entries.len() != before)
    }

    async fn keys(&self) -> anyhow::Result<Vec<String>> {
        Ok(lock(&self.entries).iter().map(|(u, _)| u.clone()).collect())
    }
}

/// Named caches of one origin.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: Mutex<Vec<(String, Arc<MemoryCache>)>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete handle to a cache, creating it if needed.
    pub fn cache(&self, name: &str) -> Arc<MemoryCache> {
        let mut caches = lock(&self.caches);
        if let Some((_, cache)) = caches.iter().find(|(n, _)| n == name) {
            return Arc::clone(cache);
        }
        debug!(cache = name, "Creating cache");
        let cache = Arc::new(MemoryCache::new());
        caches.push((name.to_string(), Arc::clone(&cache)));
        cache
    }

    pub fn has(&self, name: &str) -> bool {
        lock(&self.caches).iter().any(|(n, _)| n == name)
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> anyhow::Result<Arc<dyn Cache>> {
        Ok(self.cache(name))
    }

    async fn delete(&self, name: &str) -> anyhow::Result<bool> {
        let mut caches = lock(&self.caches);
        let before = caches.len();
        caches.retain(|(n, _)| n != name);
        Ok(caches.len() != before)
    }

    async fn keys(&self) -> anyhow::Result<Vec<String>> {
        Ok(lock(&self.caches).iter().map(|(n, _)| n.clone()).collect())
    }
}
