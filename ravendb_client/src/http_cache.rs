//! Conditional-request cache for read responses.
//!
//! Entries are keyed by the full request url (query string included) and carry the change
//! vector the server returned with them. Clearing the cache bumps a generation counter instead
//! of touching the entries; an entry from an older generation is treated as absent and evicted
//! the next time somebody looks it up.
use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use dashmap::DashMap;

#[derive(Clone, Debug)]
pub struct CacheItem {
    pub change_vector: String,
    pub payload: Bytes,
    pub last_server_update: Instant,
    pub generation: u64,
}

/// What a lookup hands back: a copy of the entry detached from the map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedResponse {
    pub change_vector: String,
    pub payload: Bytes,
    /// Time since the server last confirmed this entry.
    pub age: Duration,
}

/// Shared handle to a cache. Cloning is cheap and all clones see the same entries.
#[derive(Clone, Debug, Default)]
pub struct HttpCache {
    inner: Arc<HttpCacheInner>,
}

#[derive(Debug, Default)]
struct HttpCacheInner {
    items: DashMap<String, CacheItem>,
    generation: AtomicU64,
    total_size: AtomicUsize,
}

impl HttpCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `url`. Entries written before the last [`clear`](HttpCache::clear) are misses.
    pub fn get(&self, url: &str) -> Option<CachedResponse> {
        let generation = self.generation();
        {
            let item = self.inner.items.get(url)?;
            if item.generation >= generation {
                return Some(CachedResponse {
                    change_vector: item.change_vector.clone(),
                    payload: item.payload.clone(),
                    age: item.last_server_update.elapsed(),
                });
            }
        }

        // Only drop the entry if nobody refreshed it in between.
        if let Some((_, item)) = self
            .inner
            .items
            .remove_if(url, |_, item| item.generation < generation)
        {
            self.inner
                .total_size
                .fetch_sub(item.payload.len(), Ordering::Relaxed);
            tracing::trace!("Evicted stale cache entry for `{}`", url);
        }
        None
    }

    pub fn set(&self, url: &str, change_vector: &str, payload: Bytes) {
        let size = payload.len();
        let item = CacheItem {
            change_vector: change_vector.to_string(),
            payload,
            last_server_update: Instant::now(),
            generation: self.generation(),
        };
        if let Some(previous) = self.inner.items.insert(url.to_string(), item) {
            self.inner
                .total_size
                .fetch_sub(previous.payload.len(), Ordering::Relaxed);
        }
        self.inner.total_size.fetch_add(size, Ordering::Relaxed);
    }

    /// Records that the server confirmed the entry for `url` is still current.
    pub fn set_not_modified(&self, url: &str) {
        let generation = self.generation();
        if let Some(mut item) = self.inner.items.get_mut(url) {
            if item.generation >= generation {
                item.last_server_update = Instant::now();
            }
        }
    }

    /// Drops the entry for `url`, for callers that know they changed the resource.
    pub fn remove(&self, url: &str) {
        if let Some((_, item)) = self.inner.items.remove(url) {
            self.inner
                .total_size
                .fetch_sub(item.payload.len(), Ordering::Relaxed);
        }
    }

    /// Logically clears every entry without visiting them.
    pub fn clear(&self) {
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!("Http cache cleared, now at generation {}", generation);
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Entries physically held, including ones a clear has already made invisible.
    pub fn number_of_items(&self) -> usize {
        self.inner.items.len()
    }

    pub fn total_size_in_bytes(&self) -> usize {
        self.inner.total_size.load(Ordering::Relaxed)
    }
}
