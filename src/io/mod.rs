//! I/O layer: locations, transports and the shared fetch pool.

mod location;
#[cfg(test)]
pub(crate) mod mock;
mod pool;
mod s3;
mod transport;

pub use location::Location;
pub use pool::{ChunkKey, FetchPool, DEFAULT_CHUNK_CACHE_CAPACITY, DEFAULT_FETCH_WORKERS};
pub use s3::{create_s3_client, split_bucket_and_key, S3Address, S3Transport};
pub use transport::{IoRouter, LocalTransport, Transport};
