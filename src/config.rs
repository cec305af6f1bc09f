//! Configuration for the `spim-resolver` binary.
//!
//! Every option can be given on the command line or through an environment
//! variable with the `SPIM_` prefix:
//!
//! - `SPIM_LOCATION` - Descriptor or group location (path or URL)
//! - `SPIM_FORMAT` - Declared storage format, e.g. `bdv.n5.s3`
//! - `SPIM_S3_REGION` - Region for URLs that carry none (default: us-east-1)
//! - `SPIM_S3_ANONYMOUS` - Read public buckets without credentials
//! - `SPIM_SHARED_POOL` - Hand a shared fetch pool to pooled formats
//! - `SPIM_POOL_WORKERS` - Concurrent chunk fetches (default: 16)
//! - `SPIM_POOL_CACHE_BYTES` - Chunk cache size in bytes (default: 256MB)

use std::sync::Arc;

use clap::Parser;

use crate::io::{FetchPool, DEFAULT_CHUNK_CACHE_CAPACITY, DEFAULT_FETCH_WORKERS};
use crate::open::ImageDataFormat;

// =============================================================================
// Default Values
// =============================================================================

/// Default region for object-store URLs.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Largest accepted chunk cache: 64GB
const MAX_POOL_CACHE_BYTES: usize = 64 * 1024 * 1024 * 1024;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Resolve a BDV, OME-Zarr or N5 dataset and print its description as JSON.
#[derive(Parser, Debug, Clone)]
#[command(name = "spim-resolver")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Location of the descriptor or group: a filesystem path or a URL.
    #[arg(env = "SPIM_LOCATION")]
    pub location: String,

    /// Declared storage format of the dataset.
    #[arg(short, long, value_enum, env = "SPIM_FORMAT")]
    pub format: ImageDataFormat,

    // =========================================================================
    // S3 Configuration
    // =========================================================================
    /// Region used for object-store URLs that do not name one.
    #[arg(long, default_value = DEFAULT_REGION, env = "SPIM_S3_REGION")]
    pub s3_region: String,

    /// Read buckets without credentials.
    #[arg(long, default_value_t = false, env = "SPIM_S3_ANONYMOUS")]
    pub s3_anonymous: bool,

    // =========================================================================
    // Pool Configuration
    // =========================================================================
    /// Open the dataset with a shared fetch pool.
    ///
    /// Formats without pooled loaders ignore the pool with a warning.
    #[arg(long, default_value_t = false, env = "SPIM_SHARED_POOL")]
    pub shared_pool: bool,

    /// Maximum concurrent chunk fetches of the shared pool.
    #[arg(long, default_value_t = DEFAULT_FETCH_WORKERS, env = "SPIM_POOL_WORKERS")]
    pub pool_workers: usize,

    /// Chunk cache size of the shared pool in bytes.
    #[arg(long, default_value_t = DEFAULT_CHUNK_CACHE_CAPACITY, env = "SPIM_POOL_CACHE_BYTES")]
    pub pool_cache_bytes: usize,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.location.trim().is_empty() {
            return Err("A dataset location is required. Pass it as an argument or set SPIM_LOCATION".to_string());
        }

        if self.s3_region.trim().is_empty() {
            return Err("s3_region must not be empty".to_string());
        }

        if self.shared_pool {
            if self.pool_workers == 0 {
                return Err("pool_workers must be greater than 0".to_string());
            }
            if self.pool_cache_bytes == 0 || self.pool_cache_bytes > MAX_POOL_CACHE_BYTES {
                return Err("pool_cache_bytes must be between 1 byte and 64GB".to_string());
            }
        }

        Ok(())
    }

    /// The shared pool requested by `--shared-pool`, if any.
    pub fn build_pool(&self) -> Option<Arc<FetchPool>> {
        self.shared_pool.then(|| {
            Arc::new(FetchPool::with_capacity(
                self.pool_workers,
                self.pool_cache_bytes,
            ))
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
