//! Content-addressable cache with per-key single-flight.
//!
//! Memoizes expensive, idempotent computations (content generation, asset
//! fetches). Keys are stable hashes over the canonicalized request payload,
//! so semantically identical requests collide regardless of field order.
//! Concurrent callers with the same key await one in-flight computation
//! instead of duplicating work.

use deck_core::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;

/// Compute a stable cache key for a request payload.
///
/// The payload is converted to JSON with sorted object fields (serde_json's
/// default map ordering) and whitespace-normalized strings before hashing,
/// so field order and incidental spacing never split the cache.
pub fn cache_key<T: Serialize>(namespace: &str, payload: &T) -> Result<String> {
    let value = serde_json::to_value(payload)?;
    let canonical = serde_json::to_string(&normalize_value(value))?;
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Collapse whitespace inside every string of a JSON value.
fn normalize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.split_whitespace().collect::<Vec<_>>().join(" ")),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_value(v)))
                .collect(),
        ),
        other => other,
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }
}

/// In-memory cache layer.
///
/// Absence is always a valid state (a miss), never an error. Expiry is
/// advisory: [`Cache::get_stale`] serves expired entries for non-critical
/// paths; content-addressed entries are stored without TTL.
#[derive(Default)]
pub struct Cache {
    entries: StdMutex<HashMap<String, CacheEntry>>,
    inflight: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a fresh entry.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock().expect("cache mutex poisoned");
        entries.get(key).filter(|e| e.is_fresh()).map(|e| e.value.clone())
    }

    /// Look up an entry even if expired. Advisory-TTL paths only.
    pub fn get_stale(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock().expect("cache mutex poisoned");
        entries.get(key).map(|e| e.value.clone())
    }

    /// Insert a value with an optional TTL.
    pub fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let entry = CacheEntry {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.insert(key.to_string(), entry);
    }

    /// Drop expired entries. Callers may invoke this periodically; nothing
    /// depends on it for correctness.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        let before = entries.len();
        entries.retain(|_, e| e.is_fresh());
        before - entries.len()
    }

    /// Return the cached value for `key`, or run `compute` to fill it.
    ///
    /// Guarantees at-most-one concurrent computation per key: callers that
    /// race on the same key block on the single in-flight computation via a
    /// per-key guard, never on the cache as a whole. A failed computation
    /// caches nothing, so the next caller retries.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let guard = self.flight_guard(key);
        let held = guard.lock().await;

        // Another caller may have filled the entry while we waited.
        if let Some(hit) = self.get(key) {
            drop(held);
            self.release_flight(key, &guard);
            return Ok(hit);
        }

        let result = compute().await;
        if let Ok(value) = &result {
            self.put(key, value.clone(), ttl);
        }
        drop(held);
        self.release_flight(key, &guard);
        result
    }

    /// Typed wrapper over [`Cache::get_or_compute`] using JSON encoding.
    pub async fn get_or_compute_json<T, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let bytes = self
            .get_or_compute(key, ttl, || async move {
                let value = compute().await?;
                Ok(serde_json::to_vec(&value)?)
            })
            .await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn flight_guard(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut inflight = self.inflight.lock().expect("cache mutex poisoned");
        inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop the per-key guard once the last holder is done with it.
    ///
    /// A guard entry may only leave the map when no other caller holds a
    /// clone of it: removing it earlier would let a waiter recompute with
    /// the stale guard while a fresh caller computes under a new one. The
    /// count is read under the map lock, so no clone can appear between the
    /// check and the removal.
    fn release_flight(&self, key: &str, guard: &Arc<AsyncMutex<()>>) {
        let mut inflight = self.inflight.lock().expect("cache mutex poisoned");
        // Two references left: the map entry and `guard` itself.
        if Arc::strong_count(guard) == 2 {
            inflight.remove(key);
        }
    }
}
