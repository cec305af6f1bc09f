use std::io::ErrorKind;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::{Location, S3Transport};
use crate::error::IoError;

/// Reads whole metadata documents from a location.
///
/// This abstraction lets the parsers and resolvers work identically on local
/// files and remote objects. Implementations must be thread-safe; one
/// transport is shared by every open call of a
/// [`SpimDataOpener`](crate::open::SpimDataOpener).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read the complete document at `location`.
    async fn read(&self, location: &Location) -> Result<Bytes, IoError>;

    /// Check whether `location` exists.
    ///
    /// A location this transport cannot serve reports `false` rather than an
    /// error, so callers can fall through to another backend.
    async fn exists(&self, location: &Location) -> Result<bool, IoError>;
}

// =============================================================================
// Local filesystem
// =============================================================================

/// Filesystem-backed transport for [`Location::Path`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransport;

#[async_trait]
impl Transport for LocalTransport {
    async fn read(&self, location: &Location) -> Result<Bytes, IoError> {
        let path = location
            .as_path()
            .ok_or_else(|| IoError::InvalidLocation(format!("not a local path: {}", location)))?;

        let data = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                IoError::NotFound(path.display().to_string())
            } else {
                IoError::Local {
                    path: path.display().to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        debug!(path = %path.display(), bytes = data.len(), "Read local document");
        Ok(Bytes::from(data))
    }

    async fn exists(&self, location: &Location) -> Result<bool, IoError> {
        match location.as_path() {
            Some(path) => tokio::fs::try_exists(path)
                .await
                .map_err(|e| IoError::Local {
                    path: path.display().to_string(),
                    message: e.to_string(),
                }),
            None => Ok(false),
        }
    }
}

// =============================================================================
// Router
// =============================================================================

/// Default transport: local paths go to the filesystem, URLs go to S3.
pub struct IoRouter {
    local: LocalTransport,
    remote: S3Transport,
}

impl IoRouter {
    pub fn new(remote: S3Transport) -> Self {
        Self {
            local: LocalTransport,
            remote,
        }
    }
}

#[async_trait]
impl Transport for IoRouter {
    async fn read(&self, location: &Location) -> Result<Bytes, IoError> {
        match location {
            Location::Path(_) => self.local.read(location).await,
            Location::Url(_) | Location::Object(_) => self.remote.read(location).await,
        }
    }

    async fn exists(&self, location: &Location) -> Result<bool, IoError> {
        match location {
            Location::Path(_) => self.local.exists(location).await,
            Location::Url(_) | Location::Object(_) => self.remote.exists(location).await,
        }
    }
}
