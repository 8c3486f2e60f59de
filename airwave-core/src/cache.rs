//! In-memory artwork cache.
//!
//! Images live only as long as the resolver that owns the cache; nothing is
//! written to disk.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

const LOG_TARGET: &str = "airwave::cache";

/// Default number of images kept before the oldest is evicted
pub const DEFAULT_CAPACITY: usize = 32;

struct CacheInner {
    entries: HashMap<String, Arc<[u8]>>,
    order: VecDeque<String>,
}

/// URL-keyed image cache with insertion-order eviction
pub struct ArtworkCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl ArtworkCache {
    /// Create a cache holding at most `capacity` images
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Get cached bytes for a URL
    #[must_use]
    pub fn get(&self, url: &str) -> Option<Arc<[u8]>> {
        self.inner.lock().entries.get(url).cloned()
    }

    /// Store bytes for a URL, evicting the oldest entry when full
    pub fn store(&self, url: &str, bytes: Arc<[u8]>) {
        let mut inner = self.inner.lock();
        if inner.entries.insert(url.to_string(), bytes).is_some() {
            return;
        }
        inner.order.push_back(url.to_string());

        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.entries.remove(&evicted);
                debug!(target: LOG_TARGET, "Evicted artwork {}", evicted);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}

impl Default for ArtworkCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
