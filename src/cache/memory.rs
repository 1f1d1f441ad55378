//! In-process cache store.
//!
//! Entries live for the `max-age` found in their own `cache-control`
//! header. When the store is full, expired entries are purged first and
//! then the entry closest to expiry is evicted.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::key::CacheKey;
use crate::cache::store::{CacheError, CacheStore, CachedResponse};

struct Entry {
    response: CachedResponse,
    expires_at: Instant,
}

/// A concurrent, TTL-honouring, bounded in-memory store.
pub struct MemoryCacheStore {
    entries: DashMap<CacheKey, Entry>,
    max_entries: usize,
}

impl MemoryCacheStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Make room for one more entry.
    fn evict_for_insert(&self, incoming: &CacheKey) {
        if self.entries.len() < self.max_entries || self.entries.contains_key(incoming) {
            return;
        }

        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        if self.entries.len() < self.max_entries {
            return;
        }
        self.evict_soonest(incoming);
    }

    /// Concurrent puts can each pass `evict_for_insert` before any of them
    /// inserts; trim back to capacity once the insert has landed.
    fn trim_to_capacity(&self, keep: &CacheKey) {
        while self.entries.len() > self.max_entries {
            if !self.evict_soonest(keep) {
                break;
            }
        }
    }

    /// Remove the entry closest to expiry, never `keep`.
    fn evict_soonest(&self, keep: &CacheKey) -> bool {
        // Linear scan; bounded by max_entries and only hit when full.
        let victim = self
            .entries
            .iter()
            .filter(|entry| entry.key() != keep)
            .min_by_key(|entry| entry.value().expires_at)
            .map(|entry| entry.key().clone());

        match victim {
            Some(victim) => {
                tracing::debug!(key = %victim, "Evicting cache entry closest to expiry");
                self.entries.remove(&victim);
                true
            }
            None => false,
        }
    }
}

/// Freshness lifetime from a `cache-control` header.
///
/// `None` when the response must not be stored (`no-store`, `private`,
/// missing or zero `max-age`).
pub fn freshness_lifetime(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(header::CACHE_CONTROL)?.to_str().ok()?;

    let mut max_age = None;
    for directive in value.split(',') {
        let directive = directive.trim().to_ascii_lowercase();
        match directive.split_once('=') {
            Some(("max-age", secs)) => max_age = secs.trim().trim_matches('"').parse::<u64>().ok(),
            None if directive == "no-store" || directive == "private" => return None,
            _ => {}
        }
    }

    max_age.filter(|secs| *secs > 0).map(Duration::from_secs)
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn lookup(&self, key: &CacheKey) -> Option<CachedResponse> {
        let now = Instant::now();
        let found = self
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now).then(|| entry.response.clone()));

        match found {
            Some(Some(response)) => Some(response),
            Some(None) => {
                self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
                None
            }
            None => None,
        }
    }

    async fn put(&self, key: CacheKey, response: CachedResponse) -> Result<(), CacheError> {
        let ttl = freshness_lifetime(&response.headers)
            .ok_or(CacheError::NotCacheable("no positive max-age"))?;

        self.evict_for_insert(&key);
        self.entries.insert(
            key.clone(),
            Entry {
                response,
                expires_at: Instant::now() + ttl,
            },
        );
        self.trim_to_capacity(&key);
        Ok(())
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }
}
