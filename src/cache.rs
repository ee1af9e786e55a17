//! In-memory cache of encoded output images.
//!
//! Decoding, transforming and re-encoding dominate request cost, so the
//! outermost server layer keeps finished outputs in memory and serves repeat
//! requests without touching the pipeline.
//!
//! # Design
//!
//! ## Cache keys
//!
//! The cache is **content-addressed by request**: the key is
//! [`params_hash`], a SHA-256 of the canonical serialization of the full
//! parameter store (see [`Params::canonical_bytes`]). Two requests that
//! parse to the same store share an entry no matter how their query strings
//! were ordered or spelled. The same hash is sent as the response `ETag`.
//!
//! Source files are assumed immutable while the server runs; replacing a file
//! in place is not picked up until the entry is evicted or the process
//! restarts.
//!
//! ## Eviction
//!
//! The budget is in bytes of encoded output, not in entries. Inserting evicts
//! least-recently-used entries until the new one fits. An entry larger than
//! the whole budget is never stored.
//!
//! ## Concurrent misses
//!
//! When several requests miss on the same key at once, only the first runs
//! the pipeline. The others wait on a per-key lock and then find the entry
//! in the cache. The pipeline runs on its own task holding that lock, so a
//! client that disconnects mid-request still leaves its output cached.

use crate::error::ServerError;
use crate::params::Params;
use crate::server::Server;
use crate::types::Image;
use async_trait::async_trait;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

/// SHA-256 of the canonical parameter serialization, lowercase hex.
pub fn params_hash(params: &Params) -> String {
    format!("{:x}", Sha256::digest(params.canonical_bytes()))
}

/// Snapshot of cache counters. Hits and misses count lookups.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub bytes: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries ({} bytes), {} hits, {} misses",
            self.entries, self.bytes, self.hits, self.misses
        )?;
        if self.evictions > 0 {
            write!(f, ", {} evicted", self.evictions)?;
        }
        Ok(())
    }
}

struct Store {
    entries: LruCache<String, Image>,
    bytes: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Byte-budgeted LRU map from cache key to encoded image.
pub struct MemoryCache {
    budget: u64,
    store: Mutex<Store>,
}

impl MemoryCache {
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            store: Mutex::new(Store {
                entries: LruCache::unbounded(),
                bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Look up an entry, marking it most recently used.
    pub fn get(&self, key: &str) -> Option<Image> {
        let mut store = self.store.lock();
        let found = store.entries.get(key).cloned();
        if found.is_some() {
            store.hits += 1;
        } else {
            store.misses += 1;
        }
        found
    }

    /// Insert or replace an entry, evicting as needed. Returns `false` when
    /// the image alone exceeds the budget and was not stored.
    pub fn put(&self, key: String, image: Image) -> bool {
        let size = image.len() as u64;
        if size > self.budget {
            return false;
        }

        let mut store = self.store.lock();
        if let Some(old) = store.entries.pop(&key) {
            store.bytes -= old.len() as u64;
        }
        while store.bytes + size > self.budget {
            let Some((evicted, old)) = store.entries.pop_lru() else {
                break;
            };
            store.bytes -= old.len() as u64;
            store.evictions += 1;
            debug!(key = %evicted, bytes = old.len(), "cache evict");
        }
        store.entries.put(key, image);
        store.bytes += size;
        true
    }

    pub fn stats(&self) -> CacheStats {
        let store = self.store.lock();
        CacheStats {
            hits: store.hits,
            misses: store.misses,
            evictions: store.evictions,
            entries: store.entries.len(),
            bytes: store.bytes,
        }
    }
}

type Flights = DashMap<String, Arc<AsyncMutex<()>>>;

/// A request's claim on a key's in-flight lock. Dropping the last claim
/// removes the lock from the table, also when the request is cancelled.
struct FlightTicket {
    flights: Arc<Flights>,
    key: String,
    lock: Arc<AsyncMutex<()>>,
}

impl FlightTicket {
    fn take(flights: &Arc<Flights>, key: &str) -> Self {
        let lock = Arc::clone(&flights.entry(key.to_string()).or_default());
        Self {
            flights: Arc::clone(flights),
            key: key.to_string(),
            lock,
        }
    }
}

impl Drop for FlightTicket {
    fn drop(&mut self) {
        // Two owners left: the table and this ticket
        self.flights.remove_if(&self.key, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}

/// Caching layer in front of another [`Server`].
///
/// A miss is computed on its own task, so a request that goes away after
/// the pipeline started still leaves its result in the cache.
pub struct CacheServer<S> {
    inner: Arc<S>,
    cache: Arc<MemoryCache>,
    flights: Arc<Flights>,
}

impl<S> CacheServer<S> {
    pub fn new(inner: S, budget: u64) -> Self {
        Self {
            inner: Arc::new(inner),
            cache: Arc::new(MemoryCache::new(budget)),
            flights: Arc::new(DashMap::new()),
        }
    }

    pub fn cache(&self) -> &MemoryCache {
        &self.cache
    }
}

#[async_trait]
impl<S: Server + 'static> Server for CacheServer<S> {
    async fn get(&self, params: &Params) -> Result<Image, ServerError> {
        let key = params_hash(params);
        if let Some(hit) = self.cache.get(&key) {
            debug!(key = %key, stats = %self.cache.stats(), "cache hit");
            return Ok(hit);
        }

        let ticket = FlightTicket::take(&self.flights, &key);
        let guard = Arc::clone(&ticket.lock).lock_owned().await;
        // Whoever held the lock before us may have filled the entry
        if let Some(hit) = self.cache.get(&key) {
            debug!(key = %key, "cache hit after wait");
            return Ok(hit);
        }

        debug!(key = %key, stats = %self.cache.stats(), "cache miss");
        let inner = Arc::clone(&self.inner);
        let cache = Arc::clone(&self.cache);
        let params = params.clone();
        let fill = tokio::spawn(async move {
            let result = inner.get(&params).await;
            if let Ok(image) = &result {
                if !cache.put(key.clone(), image.clone()) {
                    debug!(
                        key = %key,
                        bytes = image.len(),
                        budget = cache.budget(),
                        "output larger than cache budget, not stored"
                    );
                }
            }
            // Release the lock before the ticket so the table entry can go
            drop(guard);
            drop(ticket);
            result
        });
        fill.await
            .map_err(|e| ServerError::Unexpected(format!("cache fill task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::CountingServer;
    use crate::types::Format;
    use std::time::Duration;

    fn image(bytes: usize) -> Image {
        Image::new(Format::Png, vec![0u8; bytes])
    }

    fn source_params(source: &str) -> Params {
        let mut p = Params::new();
        p.insert("source", source).unwrap();
        p
    }

    // =========================================================================
    // params_hash
    // =========================================================================

    #[test]
    fn params_hash_is_hex_sha256() {
        let hash = params_hash(&source_params("a.jpg"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn params_hash_deterministic() {
        assert_eq!(
            params_hash(&source_params("a.jpg")),
            params_hash(&source_params("a.jpg"))
        );
    }

    #[test]
    fn params_hash_varies_with_any_value() {
        let base = source_params("a.jpg");
        let mut wide = source_params("a.jpg");
        wide.insert("width", 100i64).unwrap();
        let mut wider = source_params("a.jpg");
        wider.insert("width", 101i64).unwrap();

        assert_ne!(params_hash(&base), params_hash(&wide));
        assert_ne!(params_hash(&wide), params_hash(&wider));
        assert_ne!(params_hash(&base), params_hash(&source_params("b.jpg")));
    }

    // =========================================================================
    // MemoryCache
    // =========================================================================

    #[test]
    fn get_returns_stored_entry() {
        let cache = MemoryCache::new(100);
        assert!(cache.put("a".into(), image(10)));
        assert_eq!(cache.get("a"), Some(image(10)));
        assert_eq!(cache.get("b"), None);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!((stats.entries, stats.bytes), (1, 10));
    }

    #[test]
    fn evicts_least_recently_used_first() {
        let cache = MemoryCache::new(30);
        cache.put("a".into(), image(10));
        cache.put("b".into(), image(10));
        cache.put("c".into(), image(10));
        // Touch "a" so "b" is now the oldest
        cache.get("a");
        cache.put("d".into(), image(10));

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn large_entry_evicts_several() {
        let cache = MemoryCache::new(30);
        cache.put("a".into(), image(10));
        cache.put("b".into(), image(10));
        cache.put("c".into(), image(10));
        cache.put("big".into(), image(25));

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.bytes, 25);
        assert_eq!(stats.evictions, 3);
    }

    #[test]
    fn oversize_entry_is_not_stored() {
        let cache = MemoryCache::new(30);
        cache.put("a".into(), image(10));
        assert!(!cache.put("huge".into(), image(31)));
        assert!(cache.get("huge").is_none());
        // Nothing was evicted to make room for it
        assert!(cache.get("a").is_some());
    }

    #[test]
    fn replacing_a_key_updates_byte_count() {
        let cache = MemoryCache::new(100);
        cache.put("a".into(), image(40));
        cache.put("a".into(), image(15));
        let stats = cache.stats();
        assert_eq!((stats.entries, stats.bytes), (1, 15));
        assert_eq!(cache.get("a"), Some(image(15)));
    }

    #[test]
    fn cache_stats_display() {
        let stats = CacheStats {
            hits: 5,
            misses: 2,
            evictions: 0,
            entries: 2,
            bytes: 2048,
        };
        assert_eq!(stats.to_string(), "2 entries (2048 bytes), 5 hits, 2 misses");

        let stats = CacheStats {
            evictions: 3,
            ..stats
        };
        assert_eq!(
            stats.to_string(),
            "2 entries (2048 bytes), 5 hits, 2 misses, 3 evicted"
        );
    }

    // =========================================================================
    // CacheServer
    // =========================================================================

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let server = CacheServer::new(CountingServer::new(image(10), Duration::ZERO), 1000);
        let params = source_params("a.jpg");

        let first = server.get(&params).await.unwrap();
        let second = server.get(&params).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(server.inner.calls(), 1);
        assert_eq!(server.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn budget_for_one_entry_evicts_the_previous() {
        let server = CacheServer::new(CountingServer::new(image(60), Duration::ZERO), 100);
        let a = source_params("a.jpg");
        let b = source_params("b.jpg");

        server.get(&a).await.unwrap();
        server.get(&b).await.unwrap();
        server.get(&a).await.unwrap();
        assert_eq!(server.inner.calls(), 3);
        assert_eq!(server.cache().stats().evictions, 2);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        struct Failing;

        #[async_trait]
        impl Server for Failing {
            async fn get(&self, _: &Params) -> Result<Image, ServerError> {
                Err(ServerError::NotFound("a.jpg".into()))
            }
        }

        let server = CacheServer::new(Failing, 1000);
        assert!(server.get(&source_params("a.jpg")).await.is_err());
        assert_eq!(server.cache().stats().entries, 0);
        assert!(server.flights.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_compute_once() {
        let server = Arc::new(CacheServer::new(
            CountingServer::new(image(10), Duration::from_millis(50)),
            1000,
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let server = Arc::clone(&server);
                tokio::spawn(async move { server.get(&source_params("same.jpg")).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), image(10));
        }

        assert_eq!(server.inner.calls(), 1);
        assert!(server.flights.is_empty());
    }

    #[tokio::test]
    async fn cancelled_request_still_fills_the_cache() {
        let server = Arc::new(CacheServer::new(
            CountingServer::new(image(10), Duration::from_millis(50)),
            1000,
        ));

        let request = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.get(&source_params("slow.jpg")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        request.abort();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(server.cache().stats().entries, 1);
        assert!(server.flights.is_empty());

        server.get(&source_params("slow.jpg")).await.unwrap();
        assert_eq!(server.inner.calls(), 1);
    }
}
