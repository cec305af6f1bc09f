//! Built-in [`DatasetOpener`] strategies.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::compose::open_composed;
use super::group::open_group;
use super::DatasetOpener;
use crate::backend::{resolve_backend, ResolveContext, Store};
use crate::descriptor::{parse_scene_descriptor, SceneDescriptor};
use crate::error::{BackendError, IoError, OpenError};
use crate::io::{FetchPool, Location, S3Address};
use crate::metadata::GroupLayout;
use crate::model::{Dataset, SequenceDescription};

/// Base path of a descriptor read from `location`.
///
/// `<BasePath type="relative">` is anchored at the descriptor's directory; an
/// absent element means the descriptor's directory itself.
pub(crate) fn base_location(
    descriptor: &SceneDescriptor,
    location: &Location,
) -> Result<Option<Location>, IoError> {
    let field = match &descriptor.base_path {
        Some(field) => field,
        None => return location.parent().map(Some),
    };

    let text = field.text.trim();
    let base = if field.is_relative() {
        if text.is_empty() || text == "." {
            location.parent()?
        } else {
            location.sibling(text)?
        }
    } else {
        Location::parse(text)?
    };
    Ok(Some(base))
}

// =============================================================================
// DescriptorOpener
// =============================================================================

/// Opens a BDV descriptor whose `<ImageLoader>` names an N5 or HDF5 backend.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorOpener {
    pooled: bool,
}

impl DescriptorOpener {
    pub fn new(pooled: bool) -> Self {
        Self { pooled }
    }
}

#[async_trait]
impl DatasetOpener for DescriptorOpener {
    fn supports_shared_pool(&self) -> bool {
        self.pooled
    }

    async fn open(
        &self,
        location: &Location,
        context: &ResolveContext,
        pool: Option<Arc<FetchPool>>,
    ) -> Result<Dataset, OpenError> {
        let bytes = context.transport.read(location).await?;
        let descriptor = parse_scene_descriptor(&bytes)?;
        let base_path = base_location(&descriptor, location)?;

        let element = descriptor
            .image_loader
            .as_ref()
            .ok_or(BackendError::IncompleteBackendDescriptor("ImageLoader"))?;
        let loader = resolve_backend(element, location, context, pool).await?;

        let SceneDescriptor {
            shell,
            registrations,
            ..
        } = descriptor;
        debug!(
            setups = shell.setups.len(),
            registrations = registrations.len(),
            "Opened scene descriptor"
        );
        let sequence = SequenceDescription::new(shell, loader);
        Ok(Dataset::from_validated(base_path, sequence, registrations))
    }
}

// =============================================================================
// GroupOpener
// =============================================================================

/// Opens a multiscale group directly, without a scene descriptor.
#[derive(Debug, Clone, Copy)]
pub struct GroupOpener {
    layout: GroupLayout,
    remote: bool,
    pooled: bool,
}

impl GroupOpener {
    /// OME-Zarr group, local or in object storage.
    pub fn ome_zarr(remote: bool) -> Self {
        Self {
            layout: GroupLayout::OmeZarr,
            remote,
            pooled: true,
        }
    }

    /// OpenOrganelle N5 group in object storage.
    pub fn open_organelle() -> Self {
        Self {
            layout: GroupLayout::N5Multiscale,
            remote: true,
            pooled: false,
        }
    }

    fn store(&self, location: &Location, context: &ResolveContext) -> Result<Store, IoError> {
        match (self.remote, location) {
            (true, Location::Url(url)) => Ok(Store::RemoteObject {
                address: S3Address::from_url(url, &context.default_region)?,
            }),
            (true, Location::Object(address)) => Ok(Store::RemoteObject {
                address: address.clone(),
            }),
            (false, Location::Path(root)) => Ok(Store::LocalArray { root: root.clone() }),
            (true, Location::Path(_)) => Err(IoError::InvalidLocation(format!(
                "expected an object-store URL, got {}",
                location
            ))),
            (false, Location::Url(_) | Location::Object(_)) => {
                Err(IoError::InvalidLocation(format!(
                    "expected a local path, got {}",
                    location
                )))
            }
        }
    }
}

#[async_trait]
impl DatasetOpener for GroupOpener {
    fn supports_shared_pool(&self) -> bool {
        self.pooled
    }

    async fn open(
        &self,
        location: &Location,
        context: &ResolveContext,
        pool: Option<Arc<FetchPool>>,
    ) -> Result<Dataset, OpenError> {
        let store = self.store(location, context)?;
        Ok(open_group(context, store, self.layout, pool).await?)
    }
}

// =============================================================================
// ComposedOpener
// =============================================================================

/// Opens a BDV descriptor composed with an OME-Zarr group.
#[derive(Debug, Clone, Copy)]
pub struct ComposedOpener {
    remote: bool,
}

impl ComposedOpener {
    pub fn new(remote: bool) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl DatasetOpener for ComposedOpener {
    fn supports_shared_pool(&self) -> bool {
        true
    }

    async fn open(
        &self,
        location: &Location,
        context: &ResolveContext,
        pool: Option<Arc<FetchPool>>,
    ) -> Result<Dataset, OpenError> {
        open_composed(location, context, pool, self.remote).await
    }
}
