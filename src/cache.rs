//! # Response Cache Module
//!
//! Two tiers keyed by the SHA-256 of the normalised URL: a bounded map in
//! memory in front of the `cache_entries` table. Entries expire after a
//! fixed TTL. When the memory tier is full the entry accessed least often
//! goes first, the one untouched the longest among equals.

mod error;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use url::Url;

pub use error::CacheError;

use crate::index::{CacheEntry, Database, now};

/// Configuration for the response cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Entries kept in memory
    pub capacity: usize,

    /// Lifetime of an entry
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl CacheConfig {
    /// Create a new builder
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }
}

/// Builder for CacheConfig
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// Build the configuration; a zero TTL would make every entry stale on arrival
    pub fn build(self) -> Result<CacheConfig, CacheError> {
        if self.config.ttl.is_zero() {
            return Err(CacheError::Config("ttl must be positive".to_string()));
        }
        Ok(self.config)
    }
}

/// A response worth remembering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub body: String,
    /// Label of the delivery method that produced it
    pub method: String,
}

/// Hit and miss counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub memory_entries: usize,
    pub stored_entries: i64,
    pub hit_rate: f64,
}

/// Memory + SQLite response cache, cheap to clone
#[derive(Debug, Clone)]
pub struct ResponseCache {
    db: Database,
    config: CacheConfig,
    memory: Arc<Mutex<HashMap<String, CacheEntry>>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl ResponseCache {
    pub fn new(db: Database, config: CacheConfig) -> Self {
        Self {
            db,
            config,
            memory: Arc::new(Mutex::new(HashMap::new())),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.memory.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hex SHA-256 of the URL without its fragment
    pub fn key_for(url: &str) -> String {
        let normalized = match Url::parse(url.trim()) {
            Ok(mut parsed) => {
                parsed.set_fragment(None);
                parsed.to_string()
            }
            Err(_) => url.trim().to_string(),
        };
        hex::encode(Sha256::digest(normalized.as_bytes()))
    }

    /// Look `url` up in memory, then in SQLite
    #[instrument(skip(self))]
    pub async fn get(&self, url: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.get_at(url, now()).await
    }

    async fn get_at(&self, url: &str, at: i64) -> Result<Option<CacheEntry>, CacheError> {
        let key = Self::key_for(url);

        let in_memory = {
            let mut memory = self.lock();
            match memory.get(&key).map(|e| e.is_expired(at)) {
                Some(true) => {
                    memory.remove(&key);
                    Some(Err(()))
                }
                Some(false) => memory.get_mut(&key).map(|entry| {
                    entry.access_count += 1;
                    entry.last_access = at;
                    Ok(entry.clone())
                }),
                None => None,
            }
        };

        match in_memory {
            Some(Ok(entry)) => {
                self.db.cache_touch(&key, at).await?;
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Memory cache hit");
                return Ok(Some(entry));
            }
            Some(Err(())) => {
                self.db.cache_delete(&key).await?;
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            None => {}
        }

        match self.db.cache_get(&key).await? {
            Some(entry) if entry.is_expired(at) => {
                self.db.cache_delete(&key).await?;
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Some(mut entry) => {
                self.db.cache_touch(&key, at).await?;
                entry.access_count += 1;
                entry.last_access = at;
                self.remember(entry.clone());
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Stored cache hit");
                Ok(Some(entry))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Store a response for `url` in both tiers
    #[instrument(skip(self, response))]
    pub async fn put(&self, url: &str, response: CachedResponse) -> Result<CacheEntry, CacheError> {
        self.put_at(url, response, now()).await
    }

    async fn put_at(
        &self,
        url: &str,
        response: CachedResponse,
        at: i64,
    ) -> Result<CacheEntry, CacheError> {
        let ttl = i64::try_from(self.config.ttl.as_secs()).unwrap_or(i64::MAX);
        let entry = CacheEntry {
            url_hash: Self::key_for(url),
            url: url.to_string(),
            status: response.status,
            body: response.body,
            method: response.method,
            created_at: at,
            expires_at: at.saturating_add(ttl),
            access_count: 0,
            last_access: at,
        };
        self.db.cache_put(&entry).await?;
        self.remember(entry.clone());
        Ok(entry)
    }

    fn remember(&self, entry: CacheEntry) {
        if self.config.capacity == 0 {
            return;
        }
        let mut memory = self.lock();
        memory.insert(entry.url_hash.clone(), entry);
        while memory.len() > self.config.capacity {
            let victim = memory
                .values()
                .min_by_key(|e| (e.access_count, e.last_access))
                .map(|e| e.url_hash.clone());
            match victim {
                Some(key) => {
                    memory.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Drop `url` from both tiers, returning whether it was stored
    pub async fn invalidate(&self, url: &str) -> Result<bool, CacheError> {
        let key = Self::key_for(url);
        self.lock().remove(&key);
        Ok(self.db.cache_delete(&key).await?)
    }

    /// Remove expired entries from both tiers, returning how many rows went
    #[instrument(skip(self))]
    pub async fn prune(&self) -> Result<u64, CacheError> {
        self.prune_at(now()).await
    }

    async fn prune_at(&self, at: i64) -> Result<u64, CacheError> {
        self.lock().retain(|_, e| !e.is_expired(at));
        let removed = self.db.cache_evict_expired(at).await?;
        debug!(removed, "Pruned cache");
        Ok(removed)
    }

    /// Remove everything from both tiers
    pub async fn clear(&self) -> Result<u64, CacheError> {
        self.lock().clear();
        Ok(self.db.cache_clear().await?)
    }

    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let memory_entries = self.lock().len();
        Ok(CacheStats {
            hits,
            misses,
            memory_entries,
            stored_entries: self.db.cache_count().await?,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        })
    }

    #[cfg(test)]
    fn in_memory(&self, url: &str) -> bool {
        self.lock().contains_key(&Self::key_for(url))
    }
}
