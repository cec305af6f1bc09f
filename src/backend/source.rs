use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use crate::error::IoError;
use crate::io::{ChunkKey, FetchPool};

/// Reader of raw chunks for one array.
///
/// Implemented by the array backend that decodes chunk payloads; this crate
/// only addresses arrays and threads the shared [`FetchPool`] to them.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Read the raw chunk at `grid_position` of resolution `level`.
    async fn read_block(&self, level: usize, grid_position: &[u64]) -> Result<Bytes, IoError>;

    /// Chunk shape of resolution `level`, if known.
    fn block_shape(&self, level: usize) -> Option<Vec<u64>>;
}

/// Routes reads of an inner [`ChunkSource`] through a shared [`FetchPool`].
///
/// Cached chunks are served without taking a fetch slot. Misses wait for a
/// slot, read from the inner source and populate the cache.
pub struct PooledChunkSource<S> {
    inner: S,
    array: Arc<str>,
    pool: Arc<FetchPool>,
}

impl<S: ChunkSource> PooledChunkSource<S> {
    /// Wrap `inner`; `array` namespaces its chunks in the pool's cache.
    pub fn new(inner: S, array: impl Into<Arc<str>>, pool: Arc<FetchPool>) -> Self {
        Self {
            inner,
            array: array.into(),
            pool,
        }
    }

    pub fn pool(&self) -> &Arc<FetchPool> {
        &self.pool
    }
}

#[async_trait]
impl<S: ChunkSource + 'static> ChunkSource for PooledChunkSource<S> {
    async fn read_block(&self, level: usize, grid_position: &[u64]) -> Result<Bytes, IoError> {
        let key = ChunkKey::new(self.array.clone(), level, grid_position.to_vec());
        if let Some(data) = self.pool.get(&key).await {
            return Ok(data);
        }

        let data = {
            let _permit = self.pool.acquire().await?;
            self.inner.read_block(level, grid_position).await?
        };
        trace!(array = %self.array, level, bytes = data.len(), "Fetched chunk");

        self.pool.put(key, data.clone()).await;
        Ok(data)
    }

    fn block_shape(&self, level: usize) -> Option<Vec<u64>> {
        self.inner.block_shape(level)
    }
}
