use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::core::models::cost::Snapshot;

/// How usable a cached entry is, given its age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

/// Fresh while `age <= ttl`, stale until `ttl + max_stale`, expired after.
pub fn classify(age: Duration, ttl: Duration, max_stale: Duration) -> Freshness {
    if age <= ttl {
        Freshness::Fresh
    } else if age <= ttl.saturating_add(max_stale) {
        Freshness::Stale
    } else {
        Freshness::Expired
    }
}

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub enum CacheRead {
    Fresh(Arc<Snapshot>),
    Stale(Arc<Snapshot>),
    /// Never populated, or older than `ttl + max_stale`.
    Miss,
}

impl CacheRead {
    pub fn found(&self) -> bool {
        !matches!(self, Self::Miss)
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }

    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            Self::Fresh(s) | Self::Stale(s) => Some(s),
            Self::Miss => None,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    snapshot: Arc<Snapshot>,
    fetched_at: Instant,
}

/// In-memory holder of the last successfully fetched snapshot.
///
/// Expired entries stay in memory but are reported as misses; only `set`
/// replaces them.
#[derive(Debug)]
pub struct CostCache {
    entry: RwLock<Option<CacheEntry>>,
    ttl: Duration,
    max_stale: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CostCache {
    pub fn new(ttl: Duration, max_stale: Duration) -> Self {
        Self {
            entry: RwLock::new(None),
            ttl,
            max_stale,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Classify the current entry and count the read as a hit or miss.
    pub fn get(&self) -> CacheRead {
        let read = self.peek();
        let counter = if read.found() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        read
    }

    /// Like `get`, without touching the hit/miss counters.
    pub fn peek(&self) -> CacheRead {
        let guard = self.entry.read();
        let Some(entry) = guard.as_ref() else {
            return CacheRead::Miss;
        };

        match classify(entry.fetched_at.elapsed(), self.ttl, self.max_stale) {
            Freshness::Fresh => CacheRead::Fresh(Arc::clone(&entry.snapshot)),
            Freshness::Stale => CacheRead::Stale(Arc::clone(&entry.snapshot)),
            Freshness::Expired => CacheRead::Miss,
        }
    }

    /// Replace the entry and restart its freshness clock.
    pub fn set(&self, snapshot: Arc<Snapshot>) {
        *self.entry.write() = Some(CacheEntry {
            snapshot,
            fetched_at: Instant::now(),
        });
    }

    /// Age of the stored entry, zero when nothing was ever stored.
    pub fn age(&self) -> Duration {
        self.entry
            .read()
            .as_ref()
            .map(|e| e.fetched_at.elapsed())
            .unwrap_or_default()
    }

    /// Total (hits, misses) since startup.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Whether an entry was ever stored, regardless of its freshness.
    pub fn is_populated(&self) -> bool {
        self.entry.read().is_some()
    }
}
