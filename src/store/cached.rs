//! Read-through result cache around any [`FactStore`].
//!
//! Entries are keyed by the exact query text plus its bindings, so two
//! resolutions with the same filter parameters share one store round trip.
//!
//! Every successful insert bumps a generation counter, and an entry is only
//! served while its generation is current. A read that started before a write
//! can still finish and fill the cache, but its rows are never returned once
//! the write has completed. The history only grows, yet a new workflow can
//! change every plurality pick.
//!
//! The cache holds at most `capacity` entries; reaching the cap drops all of
//! them.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::{FactBatch, FactStore, ParameterizedQuery, Row, StoreResult};

/// Default maximum number of cached query results.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

struct Entry {
    generation: u64,
    rows: Vec<Row>,
}

/// Caching decorator for a [`FactStore`].
pub struct CachedStore<S> {
    inner: S,
    cache: DashMap<ParameterizedQuery, Entry>,
    generation: AtomicU64,
    capacity: usize,
}

impl<S: FactStore> CachedStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_CAPACITY)
    }

    /// A cache holding at most `capacity` results (at least one).
    pub fn with_capacity(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
            generation: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Number of cached query results.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: FactStore> FactStore for CachedStore<S> {
    fn select(&self, query: &ParameterizedQuery) -> StoreResult<Vec<Row>> {
        let generation = self.generation.load(Ordering::SeqCst);
        if let Some(hit) = self.cache.get(query) {
            if hit.generation == generation {
                tracing::trace!("query cache hit");
                return Ok(hit.rows.clone());
            }
        }

        let rows = self.inner.select(query)?;
        if self.cache.len() >= self.capacity {
            tracing::debug!(capacity = self.capacity, "query cache full, dropping entries");
            self.cache.clear();
        }
        self.cache.insert(
            query.clone(),
            Entry {
                generation,
                rows: rows.clone(),
            },
        );
        Ok(rows)
    }

    fn insert(&self, batch: &FactBatch) -> StoreResult<()> {
        self.inner.insert(batch)?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.clear();
        Ok(())
    }
}

impl<S> std::fmt::Debug for CachedStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedStore")
            .field("entries", &self.cache.len())
            .field("capacity", &self.capacity)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}
