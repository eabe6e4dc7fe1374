//! Shared tile cache with single-flight fetch coordination.
//!
//! One [`TileCache`] instance is shared across all open sources; the
//! `source_id` component of [`TileKey`] keeps their entries apart. The cache
//! is bounded by a total byte budget and evicts least-recently-used entries,
//! with two carve-outs:
//!
//! - **Single-flight**: concurrent callers missing on the same key trigger
//!   exactly one fetch; every caller receives the same raster or the same
//!   failure. Failures are never stored, so the next request retries.
//! - **Pinning**: a [`TileHandle`] pins its entry while a stitch is reading
//!   it; pinned entries are exempt from eviction until the handle drops.
//!
//! The winning fetch runs on a spawned task, so a caller abandoning its read
//! mid-fetch cannot strand the other waiters.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::error::DecodeError;
use crate::pyramid::TileKey;
use crate::raster::Raster;

/// Default cache budget: 256MB of decoded pixels.
pub const DEFAULT_CACHE_BYTES: usize = 256 * 1024 * 1024;

type FetchResult = Option<Result<Raster, DecodeError>>;

// =============================================================================
// Cache State
// =============================================================================

struct Entry {
    raster: Raster,
    bytes: usize,
    pins: u32,
    /// Set when the owning source closed while this entry was pinned; the
    /// entry is invisible to lookups and dropped at the last unpin.
    stale: bool,
}

struct CacheState {
    /// Recency list; byte budget is enforced manually, so the LRU itself
    /// is unbounded.
    entries: LruCache<TileKey, Entry>,

    /// One watch channel per in-flight fetch; waiters subscribe, the
    /// winning task publishes the shared result.
    in_flight: HashMap<TileKey, watch::Receiver<FetchResult>>,

    /// Sum of `bytes` over all entries, stale and pinned included.
    total_bytes: usize,

    hits: u64,
    misses: u64,
    inserts: u64,
    evictions: u64,
}

/// Point-in-time counters and occupancy of a [`TileCache`].
///
/// Waiters joining an in-flight fetch count as misses; `inserts` counts
/// successful fetches stored, so `misses - inserts` over time approximates
/// failed or deduplicated fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub entries: usize,
    pub total_bytes: usize,
}

// =============================================================================
// Tile Cache
// =============================================================================

/// Byte-bounded LRU cache of decoded tile rasters.
///
/// Construct one explicitly and share it via `Arc`; sources receive it
/// through their open options rather than a global, so tests can run with
/// isolated caches.
pub struct TileCache {
    max_bytes: usize,
    state: Mutex<CacheState>,
}

impl TileCache {
    /// Create a cache with the default byte budget.
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_CACHE_BYTES)
    }

    /// Create a cache bounded by `max_bytes` of decoded pixel data.
    pub fn with_budget(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                in_flight: HashMap::new(),
                total_bytes: 0,
                hits: 0,
                misses: 0,
                inserts: 0,
                evictions: 0,
            }),
        }
    }

    /// The configured byte budget.
    pub fn budget(&self) -> usize {
        self.max_bytes
    }

    /// Number of resident entries (stale ones included).
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes of resident rasters.
    pub fn total_bytes(&self) -> usize {
        self.state.lock().total_bytes
    }

    /// Snapshot of counters and occupancy.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            inserts: state.inserts,
            evictions: state.evictions,
            entries: state.entries.len(),
            total_bytes: state.total_bytes,
        }
    }

    /// Whether a live (non-stale) entry exists, without touching recency.
    pub fn contains(&self, key: &TileKey) -> bool {
        let state = self.state.lock();
        state.entries.peek(key).is_some_and(|e| !e.stale)
    }

    /// Look up a tile, pinning it on a hit. Never fetches.
    pub fn get(self: &Arc<Self>, key: &TileKey) -> Option<TileHandle> {
        let mut state = self.state.lock();
        let raster = match state.entries.get_mut(key).filter(|e| !e.stale) {
            Some(entry) => {
                entry.pins += 1;
                entry.raster.clone()
            }
            None => {
                state.misses += 1;
                return None;
            }
        };
        state.hits += 1;
        Some(TileHandle {
            cache: Some(Arc::clone(self)),
            key: key.clone(),
            raster,
        })
    }

    /// Return the tile for `key`, fetching it via `fetch` on a miss.
    ///
    /// Misses are single-flight: while a fetch for `key` is in flight, every
    /// caller waits on it and shares its result. A successful raster is
    /// cached and returned pinned; a failure is delivered to all waiters and
    /// nothing is stored, so a later call retries.
    pub async fn get_or_fetch<F, Fut>(
        self: &Arc<Self>,
        key: &TileKey,
        fetch: F,
    ) -> Result<TileHandle, DecodeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Raster, DecodeError>> + Send + 'static,
    {
        enum Role {
            Hit(TileHandle),
            Waiter(watch::Receiver<FetchResult>),
            Leader(watch::Receiver<FetchResult>, watch::Sender<FetchResult>),
        }

        let role = {
            let mut state = self.state.lock();
            let mut fresh = None;
            if let Some(entry) = state.entries.get_mut(key) {
                if !entry.stale {
                    entry.pins += 1;
                    fresh = Some(entry.raster.clone());
                }
                // Stale pinned occupant: fetch fresh below, bypassing the slot
            }
            if let Some(raster) = fresh {
                trace!(%key, "tile cache hit");
                state.hits += 1;
                return Ok(TileHandle {
                    cache: Some(Arc::clone(self)),
                    key: key.clone(),
                    raster,
                });
            }
            state.misses += 1;
            if let Some(rx) = state.in_flight.get(key) {
                trace!(%key, "joining in-flight tile fetch");
                Role::Waiter(rx.clone())
            } else {
                trace!(%key, "tile cache miss, fetching");
                let (tx, rx) = watch::channel(None);
                state.in_flight.insert(key.clone(), rx.clone());
                Role::Leader(rx, tx)
            }
        };

        let mut rx = match role {
            Role::Hit(handle) => return Ok(handle),
            Role::Waiter(rx) => rx,
            Role::Leader(rx, tx) => {
                let cache = Arc::clone(self);
                let fetch_key = key.clone();
                let fut = fetch();
                // Detached so a cancelled caller cannot strand other waiters
                tokio::spawn(async move {
                    let result = fut.await;
                    cache.complete_fetch(&fetch_key, &result);
                    let _ = tx.send(Some(result));
                });
                rx
            }
        };

        let result = match rx.wait_for(|value| value.is_some()).await {
            Ok(value) => value.clone().unwrap_or_else(|| {
                Err(DecodeError::TaskFailed(
                    "fetch result missing after completion".to_string(),
                ))
            }),
            Err(_) => {
                // Sender dropped without a result: the fetch task died. Clear
                // the dead in-flight slot so the next request can retry.
                self.clear_dead_in_flight(key);
                Err(DecodeError::TaskFailed(
                    "tile fetch task stopped before producing a result".to_string(),
                ))
            }
        };

        let raster = result?;

        // Pin the freshly cached entry. It may already be gone (evicted under
        // pressure, or the slot is held by a stale pinned occupant); the
        // shared raster is then handed back unpinned, which is still correct
        // because handles own their raster.
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(key) {
            if !entry.stale {
                entry.pins += 1;
                return Ok(TileHandle {
                    cache: Some(Arc::clone(self)),
                    key: key.clone(),
                    raster: entry.raster.clone(),
                });
            }
        }
        Ok(TileHandle {
            cache: None,
            key: key.clone(),
            raster,
        })
    }

    /// Invalidate every entry belonging to `source_id`.
    ///
    /// Unpinned entries are removed immediately; pinned ones are marked stale
    /// and dropped when their last handle goes away. Returns the number of
    /// entries removed or marked.
    pub fn purge_source(&self, source_id: &str) -> usize {
        let mut state = self.state.lock();
        let matching: Vec<TileKey> = state
            .entries
            .iter()
            .filter(|(key, _)| &*key.source_id == source_id)
            .map(|(key, _)| key.clone())
            .collect();

        let mut purged = 0;
        for key in &matching {
            if let Some(entry) = state.entries.peek_mut(key) {
                if entry.pins > 0 {
                    entry.stale = true;
                    purged += 1;
                } else if let Some(entry) = state.entries.pop(key) {
                    state.total_bytes -= entry.bytes;
                    purged += 1;
                }
            }
        }
        debug!(
            source_id,
            purged,
            resident = state.entries.len(),
            "purged source from tile cache"
        );
        purged
    }

    fn complete_fetch(&self, key: &TileKey, result: &Result<Raster, DecodeError>) {
        let mut state = self.state.lock();
        state.in_flight.remove(key);
        if let Ok(raster) = result {
            // A stale pinned occupant keeps the slot; the fresh raster then
            // flows to callers uncached
            if state.entries.peek(key).is_none() {
                let bytes = raster.byte_len();
                state.entries.put(
                    key.clone(),
                    Entry {
                        raster: raster.clone(),
                        bytes,
                        pins: 0,
                        stale: false,
                    },
                );
                state.total_bytes += bytes;
                state.inserts += 1;
                self.evict_to_budget(&mut state);
            }
        }
    }

    /// Remove the in-flight slot for `key` if its fetch task died.
    fn clear_dead_in_flight(&self, key: &TileKey) {
        let mut state = self.state.lock();
        let dead = state
            .in_flight
            .get(key)
            .is_some_and(|rx| rx.has_changed().is_err());
        if dead {
            state.in_flight.remove(key);
        }
    }

    /// Pop LRU entries until within budget, skipping pinned ones.
    ///
    /// If every resident entry is pinned the cache transiently exceeds its
    /// budget instead of evicting in-use tiles.
    fn evict_to_budget(&self, state: &mut CacheState) {
        let mut pinned = Vec::new();
        let mut evicted = 0usize;
        while state.total_bytes > self.max_bytes {
            match state.entries.pop_lru() {
                Some((key, entry)) if entry.pins > 0 => pinned.push((key, entry)),
                Some((key, entry)) => {
                    state.total_bytes -= entry.bytes;
                    evicted += 1;
                    trace!(%key, bytes = entry.bytes, "evicted tile");
                }
                None => break,
            }
        }
        for (key, entry) in pinned {
            state.entries.put(key, entry);
        }
        state.evictions += evicted as u64;
        if evicted > 0 {
            debug!(
                evicted,
                total_bytes = state.total_bytes,
                budget = self.max_bytes,
                "tile cache eviction pass"
            );
        }
    }

    fn unpin(&self, key: &TileKey) {
        let mut state = self.state.lock();
        let drop_entry = match state.entries.peek_mut(key) {
            Some(entry) => {
                entry.pins = entry.pins.saturating_sub(1);
                entry.pins == 0 && entry.stale
            }
            None => false,
        };
        if drop_entry {
            if let Some(entry) = state.entries.pop(key) {
                state.total_bytes -= entry.bytes;
            }
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tile Handle
// =============================================================================

/// A pinned view of one cached tile.
///
/// While the handle lives, the entry it pins cannot be evicted; dropping the
/// handle releases the pin. Handles produced while their entry was already
/// gone simply own the raster without pinning anything.
pub struct TileHandle {
    cache: Option<Arc<TileCache>>,
    key: TileKey,
    raster: Raster,
}

impl TileHandle {
    pub fn key(&self) -> &TileKey {
        &self.key
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }
}

impl Drop for TileHandle {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.take() {
            cache.unpin(&self.key);
        }
    }
}

impl std::fmt::Debug for TileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileHandle")
            .field("key", &self.key)
            .field("pinned", &self.cache.is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
