//! In-memory TTL cache behind the `Cached` tier.
//!
//! Every successful remote read writes its decoded payload here; the cached
//! tier reads it back while the entry is younger than the TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    stored_at: Instant,
    expires_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    ttl: Duration,
}

/// A cache hit together with how old the entry is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBody {
    pub body: String,
    pub age: Duration,
}

/// Thread-safe TTL cache keyed by query.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<RwLock<CacheInner>>,
}

impl CacheStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                map: HashMap::new(),
                ttl,
            })),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub async fn ttl(&self) -> Duration {
        self.inner.read().await.ttl
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.get_with_age(key).await.map(|hit| hit.body)
    }

    /// Returns the entry and its age, or `None` if absent or expired.
    pub async fn get_with_age(&self, key: &str) -> Option<CachedBody> {
        let store = self.inner.read().await;
        let entry = store.map.get(key)?;
        let now = Instant::now();
        if now >= entry.expires_at {
            return None;
        }
        Some(CachedBody {
            body: entry.body.clone(),
            age: now.saturating_duration_since(entry.stored_at),
        })
    }

    /// Stores `body` under `key`, dropping entries that have expired. No-op
    /// when the cache is disabled.
    pub async fn put(&self, key: impl Into<String>, body: impl Into<String>) {
        let mut store = self.inner.write().await;
        if store.ttl.is_zero() {
            return;
        }

        let now = Instant::now();
        store.map.retain(|_, entry| entry.expires_at > now);
        let expires_at = now + store.ttl;
        let key = key.into();
        debug!(key = %key, "caching response");
        store.map.insert(
            key,
            CacheEntry {
                body: body.into(),
                stored_at: now,
                expires_at,
            },
        );
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let body = self.get(key).await?;
        match serde_json::from_str(&body) {
            Ok(value) => Some(value),
            Err(error) => {
                debug!(key, %error, "dropping undecodable cache entry");
                None
            }
        }
    }

    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let body = serde_json::to_string(value)?;
        self.put(key, body).await;
        Ok(())
    }

    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Number of entries, including expired ones not yet swept by a `put`.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
