//! `<ImageLoader>` element → [`ImageLoader`].
//!
//! Remote loaders name their object store with four mandatory fields:
//!
//! ```xml
//! <ImageLoader format="bdv.n5.s3">
//!   <ServiceEndpoint>https://s3.embl.de</ServiceEndpoint>
//!   <SigningRegion>us-west-2</SigningRegion>
//!   <BucketName>i2k-2020</BucketName>
//!   <Key>platy-raw.n5</Key>
//! </ImageLoader>
//! ```
//!
//! Local loaders name a path element (`<n5>`, `<hdf5>`, `<ome.zarr>`),
//! optionally `type="relative"` to the descriptor's directory. When a local
//! path does not exist the resolver falls through to the remote fields, so
//! one descriptor can serve both a local checkout and its published copy.

use std::sync::Arc;

use tracing::{debug, info};

use super::{ArrayLayout, ImageLoader, Store};
use crate::descriptor::LoaderElement;
use crate::error::{BackendError, IoError};
use crate::io::{FetchPool, Location, S3Address, Transport};

pub const SERVICE_ENDPOINT: &str = "ServiceEndpoint";
pub const SIGNING_REGION: &str = "SigningRegion";
pub const BUCKET_NAME: &str = "BucketName";
pub const KEY: &str = "Key";

/// Local BDV N5 container
pub const BDV_N5: &str = "bdv.n5";
/// BDV N5 container in object storage
pub const BDV_N5_S3: &str = "bdv.n5.s3";
/// Legacy single-file BDV container
pub const BDV_HDF5: &str = "bdv.hdf5";
/// OME-Zarr group referenced from a BDV descriptor
pub const BDV_OME_ZARR: &str = "bdv.ome.zarr";
/// OME-Zarr group in object storage referenced from a BDV descriptor
pub const BDV_OME_ZARR_S3: &str = "bdv.ome.zarr.s3";

const N5_PATH: &str = "n5";
const HDF5_PATH: &str = "hdf5";

/// Collaborators shared by every resolution of one open call.
#[derive(Clone)]
pub struct ResolveContext {
    pub transport: Arc<dyn Transport>,
    /// Region used for URLs that carry none
    pub default_region: String,
}

impl ResolveContext {
    pub fn new(transport: Arc<dyn Transport>, default_region: impl Into<String>) -> Self {
        Self {
            transport,
            default_region: default_region.into(),
        }
    }
}

/// Build the backend described by `loader`.
///
/// `descriptor` is the location of the document `loader` came from; relative
/// path elements are resolved against its directory. `pool` is attached to
/// the constructed loader unchanged.
pub async fn resolve_backend(
    loader: &LoaderElement,
    descriptor: &Location,
    context: &ResolveContext,
    pool: Option<Arc<FetchPool>>,
) -> Result<ImageLoader, BackendError> {
    let (store, layout) = match loader.format.as_str() {
        BDV_N5 => (
            resolve_store(loader, N5_PATH, descriptor, context).await?,
            ArrayLayout::BdvN5,
        ),
        BDV_N5_S3 => (
            Store::RemoteObject {
                address: remote_address(loader)?,
            },
            ArrayLayout::BdvN5,
        ),
        BDV_HDF5 => {
            let file = match loader_path(loader, HDF5_PATH, descriptor)? {
                Some(Location::Path(file)) => file,
                Some(remote) => {
                    return Err(IoError::InvalidLocation(format!(
                        "single-file containers must be local: {}",
                        remote
                    ))
                    .into())
                }
                None => return Err(BackendError::IncompleteBackendDescriptor("hdf5")),
            };
            (Store::MonolithicFile { file }, ArrayLayout::BdvHdf5)
        }
        other => return Err(BackendError::UnsupportedLoader(other.to_string())),
    };

    debug!(
        format = %loader.format,
        store = %store.identifier(),
        pooled = pool.is_some(),
        "Resolved image loader"
    );
    Ok(ImageLoader::new(store, layout).with_pool(pool))
}

/// Resolve the store named by path element `path_field`, falling through to
/// the remote fields.
///
/// - local path that exists → [`Store::LocalArray`]
/// - path element that is itself a URL → [`Store::RemoteObject`] from the URL
/// - otherwise → [`Store::RemoteObject`] from the four remote fields
pub async fn resolve_store(
    loader: &LoaderElement,
    path_field: &str,
    descriptor: &Location,
    context: &ResolveContext,
) -> Result<Store, BackendError> {
    match loader_path(loader, path_field, descriptor)? {
        Some(Location::Path(root)) => {
            if context.transport.exists(&Location::Path(root.clone())).await? {
                return Ok(Store::LocalArray { root });
            }
            info!(
                path = %root.display(),
                "Local store not found, falling back to remote fields"
            );
        }
        Some(Location::Url(url)) => {
            let address = S3Address::from_url(&url, &context.default_region)?;
            return Ok(Store::RemoteObject { address });
        }
        Some(Location::Object(address)) => return Ok(Store::RemoteObject { address }),
        None => {}
    }

    Ok(Store::RemoteObject {
        address: remote_address(loader)?,
    })
}

/// Object-store address from the four remote fields.
pub fn remote_address(loader: &LoaderElement) -> Result<S3Address, BackendError> {
    let field = |name: &'static str| {
        loader
            .text(name)
            .ok_or(BackendError::IncompleteBackendDescriptor(name))
    };
    let endpoint = field(SERVICE_ENDPOINT)?;
    let region = field(SIGNING_REGION)?;
    let bucket = field(BUCKET_NAME)?;
    let key = field(KEY)?;

    Ok(S3Address::new(
        Some(endpoint.to_string()),
        region,
        bucket,
        key,
    ))
}

/// Location of path element `name`, anchored at `descriptor` when relative.
pub fn loader_path(
    loader: &LoaderElement,
    name: &str,
    descriptor: &Location,
) -> Result<Option<Location>, BackendError> {
    let field = match loader.field(name) {
        Some(field) if !field.text.trim().is_empty() => field,
        _ => return Ok(None),
    };
    let text = field.text.trim();

    let location = if field.is_relative() {
        descriptor.sibling(text)?
    } else {
        Location::parse(text)?
    };
    Ok(Some(location))
}
