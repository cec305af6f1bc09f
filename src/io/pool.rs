//! Shared resource pool for chunk fetches.
//!
//! A [`FetchPool`] bounds how many chunk reads may be in flight at once and
//! holds a byte-bounded LRU cache of raw chunk payloads. Every backend handle
//! constructed with the same pool shares both limits, so several datasets
//! opened side by side compete for one fetch budget instead of each getting
//! its own.
//!
//! This layer only constructs and threads the pool; the chunk readers that
//! consume it live with the external array backend.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::{RwLock, Semaphore, SemaphorePermit};

use crate::error::IoError;

/// Default number of concurrent chunk fetches.
pub const DEFAULT_FETCH_WORKERS: usize = 16;

/// Default chunk cache capacity: 256MB
pub const DEFAULT_CHUNK_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

/// Upper bound on cache entries, independent of their size.
const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Cache key for one raw chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    /// Identifier of the array (store identifier plus dataset path)
    pub array: Arc<str>,

    /// Resolution level
    pub level: usize,

    /// Chunk position in the level's chunk grid
    pub grid_position: Vec<u64>,
}

impl ChunkKey {
    pub fn new(array: impl Into<Arc<str>>, level: usize, grid_position: Vec<u64>) -> Self {
        Self {
            array: array.into(),
            level,
            grid_position,
        }
    }
}

/// Bounded worker permits plus a shared chunk cache.
pub struct FetchPool {
    permits: Semaphore,
    workers: usize,
    cache: RwLock<LruCache<ChunkKey, Bytes>>,
    max_size: usize,
    current_size: RwLock<usize>,
}

impl FetchPool {
    /// Create a pool with default limits, ready to share.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::with_capacity(
            DEFAULT_FETCH_WORKERS,
            DEFAULT_CHUNK_CACHE_CAPACITY,
        ))
    }

    /// Create a pool with `workers` concurrent fetches and a cache of
    /// `cache_bytes` bytes. Zero values are raised to one.
    pub fn with_capacity(workers: usize, cache_bytes: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Semaphore::new(workers),
            workers,
            cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_MAX_ENTRIES).unwrap_or(NonZeroUsize::MIN),
            )),
            max_size: cache_bytes.max(1),
            current_size: RwLock::new(0),
        }
    }

    /// Wait for a fetch slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, IoError> {
        self.permits
            .acquire()
            .await
            .map_err(|_| IoError::Connection("fetch pool closed".to_string()))
    }

    /// Look up a cached chunk, marking it recently used.
    pub async fn get(&self, key: &ChunkKey) -> Option<Bytes> {
        let mut cache = self.cache.write().await;
        cache.get(key).cloned()
    }

    /// Cache a chunk, evicting least-recently-used chunks beyond capacity.
    pub async fn put(&self, key: ChunkKey, data: Bytes) {
        let data_size = data.len();
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        if let Some(old_data) = cache.peek(&key) {
            *current_size = current_size.saturating_sub(old_data.len());
        } else if cache.len() == cache.cap().get() {
            if let Some((_, evicted)) = cache.pop_lru() {
                *current_size = current_size.saturating_sub(evicted.len());
            }
        }

        cache.put(key, data);
        *current_size += data_size;

        while *current_size > self.max_size {
            match cache.pop_lru() {
                Some((_, evicted)) => {
                    *current_size = current_size.saturating_sub(evicted.len());
                }
                None => break,
            }
        }
    }

    /// Number of cached chunks.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Total bytes currently cached.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    /// Cache capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Maximum number of concurrent fetches.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fetch slots not currently held.
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }
}

impl fmt::Debug for FetchPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchPool")
            .field("workers", &self.workers)
            .field("capacity", &self.max_size)
            .finish_non_exhaustive()
    }
}
